// In crates/api-client/src/types.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The distilled result of a filled market order or trade close.
///
/// `realized_pl` is only meaningful for fills that reduced or closed an
/// existing trade; `trade_id` is the identifier of whichever trade the fill
/// touched, extracted via [`extract_trade_id`].
#[derive(Debug, Clone, PartialEq)]
pub struct OrderFill {
    pub price: Decimal,
    pub realized_pl: Option<Decimal>,
    pub trade_id: Option<String>,
}

/// A currently open trade as reported by the broker.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenTrade {
    pub id: String,
    pub instrument: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub current_units: Decimal,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenTradesResponse {
    pub trades: Vec<OpenTrade>,
}

// --- Candle endpoint wire types ---

#[derive(Debug, Deserialize)]
pub(crate) struct CandlesResponse {
    pub candles: Vec<RawCandle>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawCandle {
    pub complete: bool,
    pub time: DateTime<Utc>,
    pub mid: RawCandleMid,
}

/// Mid prices arrive as decimal strings (e.g., `"1.08753"`).
#[derive(Debug, Deserialize)]
pub(crate) struct RawCandleMid {
    #[serde(with = "rust_decimal::serde::str")]
    pub o: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub h: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub l: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub c: Decimal,
}

impl From<RawCandle> for core_types::Candle {
    fn from(raw: RawCandle) -> Self {
        core_types::Candle {
            complete: raw.complete,
            time: raw.time,
            open: raw.mid.o,
            high: raw.mid.h,
            low: raw.mid.l,
            close: raw.mid.c,
        }
    }
}

// --- Order endpoint wire types ---

#[derive(Debug, Serialize)]
pub(crate) struct MarketOrderBody {
    pub order: MarketOrder,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MarketOrder {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub instrument: String,
    /// Signed units as a string, per the broker's wire format.
    pub units: String,
    pub time_in_force: &'static str,
    pub position_fill: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub take_profit_on_fill: Option<PriceTrigger>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_loss_on_fill: Option<PriceTrigger>,
}

#[derive(Debug, Serialize)]
pub(crate) struct PriceTrigger {
    pub price: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct TradeCloseBody {
    pub units: &'static str,
}

/// Response to an order create or trade close request.
///
/// A filled request carries `orderFillTransaction`; a rejected one (e.g.,
/// FOK miss) carries only `orderCancelTransaction`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OrderResponse {
    pub order_fill_transaction: Option<OrderFillTransaction>,
    pub order_cancel_transaction: Option<OrderCancelTransaction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OrderCancelTransaction {
    pub reason: Option<String>,
}

/// The broker's fill transaction.
///
/// Which of the four trade fields is populated depends on what the fill did
/// to the account: opened a fresh trade, opened several, reduced one, or
/// closed one or more.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderFillTransaction {
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub pl: Option<Decimal>,
    pub trade_opened: Option<TradeRef>,
    pub trades_opened: Option<Vec<TradeRef>>,
    pub trade_reduced: Option<TradeRef>,
    pub trades_closed: Option<Vec<TradeRef>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradeRef {
    #[serde(rename = "tradeID")]
    pub trade_id: String,
}

/// Extracts the affected trade identifier from a fill transaction, checking
/// the four possible locations in order and taking the first applicable.
pub fn extract_trade_id(fill: &OrderFillTransaction) -> Option<String> {
    if let Some(opened) = &fill.trade_opened {
        return Some(opened.trade_id.clone());
    }
    if let Some(first) = fill.trades_opened.as_ref().and_then(|list| list.first()) {
        return Some(first.trade_id.clone());
    }
    if let Some(reduced) = &fill.trade_reduced {
        return Some(reduced.trade_id.clone());
    }
    if let Some(first) = fill.trades_closed.as_ref().and_then(|list| list.first()) {
        return Some(first.trade_id.clone());
    }
    None
}

impl From<OrderFillTransaction> for OrderFill {
    fn from(fill: OrderFillTransaction) -> Self {
        let trade_id = extract_trade_id(&fill);
        OrderFill { price: fill.price, realized_pl: fill.pl, trade_id }
    }
}
