// In crates/engine/src/reconciler.rs

use crate::journal::Journal;
use api_client::TradeGateway;
use chrono::Utc;
use core_types::{CloseReason, LogLevel, Position, PositionClose, Session};
use database::Store;
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

/// Aligns locally recorded open positions with broker-reported truth before
/// the engine makes a new decision.
///
/// A local position whose broker trade id is no longer in the broker's open
/// set (typically because a take-profit or stop-loss fired server-side) is
/// marked closed with reason `broker-closed`. The realized P&L is not
/// knowable from this path and is left unset.
pub struct Reconciler {
    store: Arc<dyn Store>,
    trading: Option<Arc<dyn TradeGateway>>,
    journal: Journal,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn Store>,
        trading: Option<Arc<dyn TradeGateway>>,
        journal: Journal,
    ) -> Self {
        Self { store, trading, journal }
    }

    /// Returns the positions that are still open after reconciliation.
    ///
    /// Best-effort per tick: a failed broker query is logged as a warning
    /// and the stale local view is returned unchanged. Paper positions are
    /// never touched. Store failures do propagate; they are tick failures.
    pub async fn reconcile(
        &self,
        session: &Session,
        open_positions: Vec<Position>,
        latest_price: Decimal,
    ) -> anyhow::Result<Vec<Position>> {
        let Some(gateway) = &self.trading else {
            return Ok(open_positions);
        };
        if open_positions.iter().all(Position::is_paper) {
            return Ok(open_positions);
        }

        let broker_open: HashSet<String> = match gateway.open_trades().await {
            Ok(trades) => trades.into_iter().map(|t| t.id).collect(),
            Err(e) => {
                tracing::warn!(session_id = session.id, error = %e, "Open-trades query failed; keeping local view for this tick.");
                self.journal
                    .append(
                        session.id,
                        LogLevel::Warn,
                        "Could not verify open trades with the broker; using local view",
                        Some(json!({ "error": e.to_string() })),
                    )
                    .await?;
                return Ok(open_positions);
            }
        };

        let mut survivors = Vec::with_capacity(open_positions.len());
        for position in open_positions {
            let Some(trade_id) = &position.broker_trade_id else {
                survivors.push(position);
                continue;
            };
            if broker_open.contains(trade_id) {
                survivors.push(position);
                continue;
            }

            tracing::info!(
                session_id = session.id,
                position_id = position.id,
                trade_id,
                "Broker no longer holds trade; closing local record."
            );
            self.store
                .close_position(
                    position.id,
                    &PositionClose {
                        exit_price: Some(latest_price),
                        realized_pl: None,
                        reason: CloseReason::BrokerClosed,
                    },
                    Utc::now(),
                )
                .await?;
            self.journal
                .append(
                    session.id,
                    LogLevel::Info,
                    format!("Position {} closed on the broker side", position.id),
                    Some(json!({
                        "position_id": position.id,
                        "broker_trade_id": trade_id,
                        "exit_price": latest_price,
                    })),
                )
                .await?;
        }

        Ok(survivors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{session_fixture, MockGateway, MockStore};
    use core_types::{Direction, PositionStatus};
    use rust_decimal_macros::dec;
    use tokio::sync::broadcast;

    fn reconciler(store: Arc<MockStore>, trading: Option<Arc<dyn TradeGateway>>) -> Reconciler {
        let (tx, _) = broadcast::channel(16);
        let journal = Journal::new(store.clone(), tx);
        Reconciler::new(store, trading, journal)
    }

    #[tokio::test]
    async fn broker_abandoned_positions_are_closed_locally() {
        let store = Arc::new(MockStore::new());
        let session = store.add_session(session_fixture()).await;
        let position = store
            .add_open_position(session.id, Direction::Long, dec!(100), dec!(1.10), Some("7"))
            .await;
        // Broker reports no open trades at all.
        let gateway = Arc::new(MockGateway::new());
        let reconciler = reconciler(store.clone(), Some(gateway));

        let survivors =
            reconciler.reconcile(&session, vec![position], dec!(1.0950)).await.unwrap();

        assert!(survivors.is_empty());
        let stored = store.positions().await;
        assert_eq!(stored[0].status, PositionStatus::Closed);
        assert_eq!(stored[0].close_reason.as_deref(), Some("broker-closed"));
        assert_eq!(stored[0].exit_price, Some(dec!(1.0950)));
        assert_eq!(stored[0].realized_pl, None);
    }

    #[tokio::test]
    async fn positions_the_broker_still_holds_survive() {
        let store = Arc::new(MockStore::new());
        let session = store.add_session(session_fixture()).await;
        let position = store
            .add_open_position(session.id, Direction::Long, dec!(100), dec!(1.10), Some("7"))
            .await;
        let gateway = Arc::new(MockGateway::new().with_open_trade("7", "EUR_USD"));
        let reconciler = reconciler(store.clone(), Some(gateway));

        let survivors =
            reconciler.reconcile(&session, vec![position], dec!(1.0950)).await.unwrap();

        assert_eq!(survivors.len(), 1);
        assert_eq!(store.positions().await[0].status, PositionStatus::Open);
    }

    #[tokio::test]
    async fn paper_positions_are_never_touched() {
        let store = Arc::new(MockStore::new());
        let session = store.add_session(session_fixture()).await;
        let position = store
            .add_open_position(session.id, Direction::Long, dec!(100), dec!(1.10), None)
            .await;
        let gateway = Arc::new(MockGateway::new());
        let reconciler = reconciler(store.clone(), Some(gateway.clone()));

        let survivors =
            reconciler.reconcile(&session, vec![position], dec!(1.0950)).await.unwrap();

        assert_eq!(survivors.len(), 1);
        // All-paper inputs short-circuit before any broker query.
        assert_eq!(gateway.open_trades_queries(), 0);
    }

    #[tokio::test]
    async fn broker_query_failure_keeps_the_stale_view_and_warns() {
        let store = Arc::new(MockStore::new());
        let session = store.add_session(session_fixture()).await;
        let position = store
            .add_open_position(session.id, Direction::Long, dec!(100), dec!(1.10), Some("7"))
            .await;
        let gateway = Arc::new(MockGateway::new().failing_open_trades());
        let reconciler = reconciler(store.clone(), Some(gateway));

        let survivors =
            reconciler.reconcile(&session, vec![position], dec!(1.0950)).await.unwrap();

        assert_eq!(survivors.len(), 1);
        assert_eq!(store.positions().await[0].status, PositionStatus::Open);
        let logs = store.logs().await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].level, LogLevel::Warn);
    }
}
