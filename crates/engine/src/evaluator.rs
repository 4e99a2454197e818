// In crates/engine/src/evaluator.rs

use crate::error::{Error, Result};
use crate::executor::OrderExecutor;
use crate::journal::Journal;
use crate::reconciler::Reconciler;
use crate::signal;
use anyhow::Context;
use api_client::{MarketData, TradeGateway};
use chrono::Utc;
use core_types::{
    CloseReason, LogLevel, Session, SessionAnalytics, SessionStatus,
};
use database::Store;
use events::WsMessage;
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

/// The per-session state machine and tick pipeline.
///
/// One evaluator instance serves every session. Ticks for the same session
/// are serialized through a per-session async lock, so an overlapping manual
/// and scheduled tick cannot interleave; distinct sessions evaluate
/// concurrently.
pub struct SessionEvaluator {
    store: Arc<dyn Store>,
    market: Arc<dyn MarketData>,
    executor: OrderExecutor,
    reconciler: Reconciler,
    journal: Journal,
    locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl SessionEvaluator {
    /// Wires the evaluator and its collaborators.
    ///
    /// `trading = None` selects paper mode: the executor and reconciler will
    /// never make a network call, and positions live purely on local records.
    pub fn new(
        store: Arc<dyn Store>,
        market: Arc<dyn MarketData>,
        trading: Option<Arc<dyn TradeGateway>>,
        events: broadcast::Sender<WsMessage>,
    ) -> Self {
        let journal = Journal::new(store.clone(), events);
        let executor = OrderExecutor::new(store.clone(), trading.clone(), journal.clone());
        let reconciler = Reconciler::new(store.clone(), trading, journal.clone());
        Self {
            store,
            market,
            executor,
            reconciler,
            journal,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn session_lock(&self, session_id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(session_id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Sessions the periodic sweep should tick.
    pub async fn running_sessions(&self) -> Result<Vec<Session>> {
        Ok(self.store.list_running_sessions().await?)
    }

    /// Moves a session to `running`, clears any prior error, and evaluates
    /// it once immediately.
    pub async fn start(&self, session_id: i64) -> Result<Session> {
        let session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or(Error::SessionNotFound(session_id))?;

        tracing::info!(session_id, "Starting session.");
        self.store.set_session_status(session_id, SessionStatus::Running, None).await?;
        self.journal
            .append(session_id, LogLevel::Info, format!("Session '{}' started", session.name), None)
            .await?;

        self.evaluate(session_id).await?;

        self.store
            .get_session(session_id)
            .await?
            .ok_or(Error::SessionNotFound(session_id))
    }

    /// Moves a session to `stopped`. With `flatten`, best-effort closes every
    /// open position first; a failed close never blocks the stop itself.
    ///
    /// Stopping only prevents future ticks. A tick already in flight runs to
    /// completion; its own status guard makes the race harmless.
    pub async fn stop(&self, session_id: i64, flatten: bool) -> Result<Session> {
        let session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or(Error::SessionNotFound(session_id))?;

        tracing::info!(session_id, flatten, "Stopping session.");
        // The last error message stays visible until the next start.
        self.store
            .set_session_status(session_id, SessionStatus::Stopped, session.error_message.as_deref())
            .await?;
        self.journal
            .append(session_id, LogLevel::Info, format!("Session '{}' stopped", session.name), None)
            .await?;

        if flatten {
            if let Err(e) = self.close_all_positions(session_id, CloseReason::SessionStopped).await
            {
                tracing::warn!(session_id, error = %e, "Flattening positions on stop failed.");
            }
        }

        self.store
            .get_session(session_id)
            .await?
            .ok_or(Error::SessionNotFound(session_id))
    }

    /// Closes every open position of a session, returning how many closed.
    pub async fn close_all_positions(
        &self,
        session_id: i64,
        reason: CloseReason,
    ) -> Result<usize> {
        let lock = self.session_lock(session_id).await;
        let _guard = lock.lock().await;

        let session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or(Error::SessionNotFound(session_id))?;
        let open = self.store.open_positions(session_id).await?;

        let mut closed = 0usize;
        for position in &open {
            // Without a fresher quote, fall back to the last observed price.
            let price = session.last_price.unwrap_or(position.entry_price);
            self.executor.close(&session, position, price, reason).await?;
            closed += 1;
        }
        Ok(closed)
    }

    /// Runs one evaluation tick for a session.
    ///
    /// A tick fully owns its failure: any error inside the pipeline is
    /// recorded on the session (status `error` + log entry) and `Ok` is
    /// returned, since the scheduler that fired the tick has no return
    /// channel. Only an unknown session id is reported to the caller.
    pub async fn evaluate(&self, session_id: i64) -> Result<()> {
        let lock = self.session_lock(session_id).await;
        let _guard = lock.lock().await;

        let session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or(Error::SessionNotFound(session_id))?;

        // Guards against a stop that landed before a scheduled tick fired.
        if session.status != SessionStatus::Running {
            tracing::debug!(session_id, status = session.status.as_str(), "Skipping tick.");
            return Ok(());
        }

        if let Err(e) = self.run_tick(&session).await {
            let message = format!("{e:#}");
            tracing::error!(session_id, error = %message, "Evaluation tick failed.");

            if let Err(log_err) = self
                .journal
                .append(
                    session_id,
                    LogLevel::Error,
                    format!("Evaluation failed: {message}"),
                    None,
                )
                .await
            {
                tracing::error!(session_id, error = %log_err, "Could not record failure log.");
            }
            if let Err(status_err) = self
                .store
                .set_session_status(session_id, SessionStatus::Error, Some(&message))
                .await
            {
                tracing::error!(session_id, error = %status_err, "Could not record error status.");
            }
        }

        Ok(())
    }

    /// The tick pipeline proper. Steps run strictly in order; the first
    /// error aborts the tick and is handled by [`Self::evaluate`].
    async fn run_tick(&self, session: &Session) -> anyhow::Result<()> {
        let cfg = &session.config;
        let open_positions = self.store.open_positions(session.id).await?;

        let candles = self
            .market
            .candles(&cfg.instrument, &cfg.granularity, cfg.candle_count())
            .await
            .context("candle fetch failed")?;
        let closes: Vec<Decimal> =
            candles.iter().filter(|c| c.complete).map(|c| c.close).collect();

        if closes.len() < cfg.long_window as usize {
            tracing::warn!(
                session_id = session.id,
                got = closes.len(),
                need = cfg.long_window,
                "Not enough completed candles; skipping evaluation."
            );
            self.journal
                .append(
                    session.id,
                    LogLevel::Warn,
                    format!(
                        "Insufficient data: {} completed candles, need {}",
                        closes.len(),
                        cfg.long_window
                    ),
                    None,
                )
                .await?;
            return Ok(());
        }

        let latest_price = *closes.last().context("close series empty after guard")?;
        let reading =
            signal::evaluate(&closes, cfg.short_window, cfg.long_window, cfg.neutral_threshold);
        let previous_signal = session.last_signal;

        // Analytics are persisted before any trading decision, so the session
        // record reflects this tick even if a later step fails.
        let analytics = SessionAnalytics {
            session_id: session.id,
            signal: reading.signal,
            short_ma: reading.short_ma,
            long_ma: reading.long_ma,
            last_price: latest_price,
            evaluated_at: Utc::now(),
        };
        self.store.record_analytics(&analytics).await?;
        self.journal.publish(WsMessage::Analytics(analytics));
        self.journal
            .append(
                session.id,
                LogLevel::Analysis,
                format!(
                    "Signal {} (short MA {}, long MA {}, price {})",
                    reading.signal.as_str(),
                    reading.short_ma,
                    reading.long_ma,
                    latest_price
                ),
                Some(json!({
                    "signal": reading.signal.as_str(),
                    "previous_signal": previous_signal.map(|s| s.as_str()),
                    "short_ma": reading.short_ma,
                    "long_ma": reading.long_ma,
                    "price": latest_price,
                    "completed_candles": closes.len(),
                })),
            )
            .await?;

        let mut open_positions =
            self.reconciler.reconcile(session, open_positions, latest_price).await?;

        if let Some(position) = open_positions.first() {
            if reading.signal.direction() != Some(position.direction) {
                let reason = if reading.signal.is_neutral() {
                    CloseReason::NeutralSignal
                } else {
                    CloseReason::SignalFlip
                };
                self.executor.close(session, position, latest_price, reason).await?;
                open_positions = self.store.open_positions(session.id).await?;
            }
        }

        // Re-entry is gated on a signal change so a sustained signal produces
        // at most one open/close pair per transition instead of churning.
        if open_positions.is_empty() {
            if let Some(direction) = reading.signal.direction() {
                if previous_signal != Some(reading.signal) {
                    self.executor.open(session, direction, latest_price).await?;
                }
            }
        }

        Ok(())
    }
}
