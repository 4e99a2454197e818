// In crates/api-client/src/lib.rs

use app_config::BrokerSettings;
use async_trait::async_trait;
use core_types::{Candle, Instrument};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub mod error;
pub mod types;

// Re-export public types
pub use error::{Error, Result};
pub use types::{extract_trade_id, OpenTrade, OrderFill, OrderFillTransaction, TradeRef};

use types::{
    CandlesResponse, MarketOrder, MarketOrderBody, OpenTradesResponse, OrderResponse,
    PriceTrigger, TradeCloseBody,
};

/// Read access to market data (candles).
///
/// Separated from [`TradeGateway`] because paper-mode deployments still fetch
/// candles but must never place orders.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Fetches the `count` most recent candles for an instrument, oldest first.
    async fn candles(
        &self,
        instrument: &Instrument,
        granularity: &str,
        count: u32,
    ) -> Result<Vec<Candle>>;
}

/// Order placement and account-state access against the broker.
#[async_trait]
pub trait TradeGateway: Send + Sync {
    /// Places a market order for signed `units`, with optional take-profit
    /// and stop-loss prices attached on fill.
    async fn place_market_order(
        &self,
        instrument: &Instrument,
        units: Decimal,
        tp_price: Option<Decimal>,
        sl_price: Option<Decimal>,
    ) -> Result<OrderFill>;

    /// Fully closes an open trade by its broker identifier.
    async fn close_trade(&self, trade_id: &str) -> Result<OrderFill>;

    /// Lists the trades the broker currently reports as open.
    async fn open_trades(&self) -> Result<Vec<OpenTrade>>;
}

/// The client for the broker's v3 REST API.
#[derive(Debug, Clone)]
pub struct BrokerClient {
    http_client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
    account_id: Option<String>,
}

impl BrokerClient {
    /// Constructs a new client from [`BrokerSettings`].
    pub fn new(settings: &BrokerSettings) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            base_url: settings.rest_base_url.trim_end_matches('/').to_string(),
            api_token: settings.api_token.clone().filter(|t| !t.is_empty()),
            account_id: settings.account_id.clone().filter(|a| !a.is_empty()),
        }
    }

    /// Whether this client is allowed to place orders.
    pub fn has_credentials(&self) -> bool {
        self.api_token.is_some() && self.account_id.is_some()
    }

    fn account_id(&self) -> Result<&str> {
        self.account_id.as_deref().ok_or(Error::MissingCredentials)
    }

    /// Attaches the bearer token when one is configured.
    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Sends a request and decodes the response body, mapping broker error
    /// bodies (`{"errorMessage": ...}`) to a typed error first.
    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| {
                    v.get("errorMessage").and_then(Value::as_str).map(str::to_string)
                })
                .unwrap_or_else(|| body.clone());
            return Err(Error::ApiError { status: status.as_u16(), message });
        }

        serde_json::from_str(&body).map_err(Error::DeserializationFailed)
    }
}

#[async_trait]
impl MarketData for BrokerClient {
    async fn candles(
        &self,
        instrument: &Instrument,
        granularity: &str,
        count: u32,
    ) -> Result<Vec<Candle>> {
        let url = format!("{}/v3/instruments/{}/candles", self.base_url, instrument);
        let count = count.to_string();
        let request = self.http_client.get(&url).query(&[
            ("granularity", granularity),
            ("count", count.as_str()),
            ("price", "M"),
        ]);

        let response: CandlesResponse = self.send(request).await?;
        Ok(response.candles.into_iter().map(Candle::from).collect())
    }
}

#[async_trait]
impl TradeGateway for BrokerClient {
    async fn place_market_order(
        &self,
        instrument: &Instrument,
        units: Decimal,
        tp_price: Option<Decimal>,
        sl_price: Option<Decimal>,
    ) -> Result<OrderFill> {
        let account = self.account_id()?;
        let url = format!("{}/v3/accounts/{}/orders", self.base_url, account);

        let body = MarketOrderBody {
            order: MarketOrder {
                kind: "MARKET",
                instrument: instrument.0.clone(),
                units: units.normalize().to_string(),
                time_in_force: "FOK",
                position_fill: "DEFAULT",
                take_profit_on_fill: tp_price.map(price_trigger),
                stop_loss_on_fill: sl_price.map(price_trigger),
            },
        };

        tracing::debug!(instrument = %instrument, %units, "Placing market order.");
        let response: OrderResponse = self.send(self.http_client.post(&url).json(&body)).await?;
        into_fill(response)
    }

    async fn close_trade(&self, trade_id: &str) -> Result<OrderFill> {
        let account = self.account_id()?;
        let url = format!("{}/v3/accounts/{}/trades/{}/close", self.base_url, account, trade_id);

        tracing::debug!(trade_id, "Requesting full trade close.");
        let body = TradeCloseBody { units: "ALL" };
        let response: OrderResponse = self.send(self.http_client.put(&url).json(&body)).await?;
        into_fill(response)
    }

    async fn open_trades(&self) -> Result<Vec<OpenTrade>> {
        let account = self.account_id()?;
        let url = format!("{}/v3/accounts/{}/openTrades", self.base_url, account);

        let response: OpenTradesResponse = self.send(self.http_client.get(&url)).await?;
        Ok(response.trades)
    }
}

/// Prices on the wire are decimal strings with bounded precision.
fn price_trigger(price: Decimal) -> PriceTrigger {
    PriceTrigger { price: price.round_dp(5).normalize().to_string() }
}

fn into_fill(response: OrderResponse) -> Result<OrderFill> {
    match response.order_fill_transaction {
        Some(fill) => Ok(fill.into()),
        None => {
            let reason = response
                .order_cancel_transaction
                .and_then(|cancel| cancel.reason)
                .unwrap_or_else(|| "no fill transaction in response".to_string());
            Err(Error::OrderNotFilled { reason })
        }
    }
}
