// In crates/engine/src/executor.rs

use crate::journal::Journal;
use anyhow::Context;
use api_client::TradeGateway;
use chrono::Utc;
use core_types::{
    CloseReason, Direction, LogLevel, NewPosition, Position, PositionClose, Session,
};
use database::Store;
use events::{TradeAction, WsMessage, WsTradeEvent};
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;

/// Opens and closes positions for a session.
///
/// With a [`TradeGateway`] the executor submits real orders and takes the
/// broker's fill as the source of truth; without one it runs the identical
/// lifecycle purely on local records (paper trading) and never touches the
/// network. Paper mode is a deliberate operating mode, not a degraded path.
pub struct OrderExecutor {
    store: Arc<dyn Store>,
    trading: Option<Arc<dyn TradeGateway>>,
    journal: Journal,
}

impl OrderExecutor {
    pub fn new(
        store: Arc<dyn Store>,
        trading: Option<Arc<dyn TradeGateway>>,
        journal: Journal,
    ) -> Self {
        Self { store, trading, journal }
    }

    pub fn is_paper(&self) -> bool {
        self.trading.is_none()
    }

    /// Opens a position at roughly `price`, with take-profit and stop-loss
    /// targets derived from the session's multipliers.
    ///
    /// The broker order (if any) is placed before anything is recorded, so a
    /// failed submission leaves no partially-recorded position behind.
    pub async fn open(
        &self,
        session: &Session,
        direction: Direction,
        price: Decimal,
    ) -> anyhow::Result<Position> {
        let cfg = &session.config;
        let units = cfg.units * direction.sign();
        let (tp_price, sl_price) = target_prices(direction, price, cfg.tp_multiplier, cfg.sl_multiplier);

        let (entry_price, broker_trade_id) = match &self.trading {
            Some(gateway) => {
                let fill = gateway
                    .place_market_order(&cfg.instrument, units, Some(tp_price), Some(sl_price))
                    .await
                    .context("market order submission failed")?;
                (fill.price, fill.trade_id)
            }
            None => (price, None),
        };

        let position = self
            .store
            .insert_position(&NewPosition {
                session_id: session.id,
                direction,
                units,
                entry_price,
                tp_price: Some(tp_price),
                sl_price: Some(sl_price),
                broker_trade_id,
            })
            .await?;

        tracing::info!(
            session_id = session.id,
            position_id = position.id,
            direction = direction.as_str(),
            %entry_price,
            paper = position.is_paper(),
            "Opened position."
        );

        self.journal
            .append(
                session.id,
                LogLevel::Trade,
                format!("Opened {} position: {} {} @ {}", direction.as_str(), units, cfg.instrument, entry_price),
                Some(json!({
                    "position_id": position.id,
                    "units": units,
                    "entry_price": entry_price,
                    "tp_price": tp_price,
                    "sl_price": sl_price,
                    "broker_trade_id": position.broker_trade_id,
                    "paper": position.is_paper(),
                })),
            )
            .await?;

        self.journal.publish(WsMessage::Trade(WsTradeEvent {
            session_id: session.id,
            position_id: position.id,
            action: TradeAction::Opened,
            instrument: cfg.instrument.0.clone(),
            direction,
            units,
            price: entry_price,
            realized_pl: None,
            reason: None,
            timestamp: position.opened_at,
        }));

        Ok(position)
    }

    /// Closes an open position in full.
    ///
    /// Live positions are closed at the broker first, and the broker's fill
    /// price and realized P&L are authoritative. Paper positions (and
    /// positions the broker no longer knows) use the supplied market price
    /// with no computed P&L.
    pub async fn close(
        &self,
        session: &Session,
        position: &Position,
        price: Decimal,
        reason: CloseReason,
    ) -> anyhow::Result<()> {
        let (exit_price, realized_pl) = match (&self.trading, &position.broker_trade_id) {
            (Some(gateway), Some(trade_id)) => {
                let fill = gateway
                    .close_trade(trade_id)
                    .await
                    .with_context(|| format!("broker close of trade {trade_id} failed"))?;
                (fill.price, fill.realized_pl)
            }
            _ => (price, None),
        };

        let closed_at = Utc::now();
        self.store
            .close_position(
                position.id,
                &PositionClose { exit_price: Some(exit_price), realized_pl, reason },
                closed_at,
            )
            .await?;

        tracing::info!(
            session_id = session.id,
            position_id = position.id,
            reason = reason.as_str(),
            %exit_price,
            "Closed position."
        );

        self.journal
            .append(
                session.id,
                LogLevel::Trade,
                format!(
                    "Closed {} position @ {} ({})",
                    position.direction.as_str(),
                    exit_price,
                    reason.as_str()
                ),
                Some(json!({
                    "position_id": position.id,
                    "exit_price": exit_price,
                    "realized_pl": realized_pl,
                    "reason": reason.as_str(),
                })),
            )
            .await?;

        self.journal.publish(WsMessage::Trade(WsTradeEvent {
            session_id: session.id,
            position_id: position.id,
            action: TradeAction::Closed,
            instrument: session.config.instrument.0.clone(),
            direction: position.direction,
            units: position.units,
            price: exit_price,
            realized_pl,
            reason: Some(reason),
            timestamp: closed_at,
        }));

        Ok(())
    }
}

/// Take-profit and stop-loss targets sit on opposite sides of the entry
/// price depending on direction.
fn target_prices(
    direction: Direction,
    price: Decimal,
    tp_multiplier: Decimal,
    sl_multiplier: Decimal,
) -> (Decimal, Decimal) {
    match direction {
        Direction::Long => {
            (price * (Decimal::ONE + tp_multiplier), price * (Decimal::ONE - sl_multiplier))
        }
        Direction::Short => {
            (price * (Decimal::ONE - tp_multiplier), price * (Decimal::ONE + sl_multiplier))
        }
    }
}
