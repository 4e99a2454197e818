// In crates/engine/src/sweep.rs

use crate::evaluator::SessionEvaluator;
use app_config::SchedulerSettings;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

/// The periodic sweep: every interval, list the running sessions and fire
/// one evaluation tick per session as an independent task.
///
/// Ticks are fire-and-forget: each one owns its failure and records it on
/// its session, so the sweep only logs and keeps going. Per-session
/// serialization inside the evaluator keeps an overlapping manual tick from
/// interleaving with a swept one.
pub async fn run(evaluator: Arc<SessionEvaluator>, settings: SchedulerSettings) {
    let mut ticker = interval(Duration::from_secs(settings.sweep_interval_secs.max(1)));
    tracing::info!(interval_secs = settings.sweep_interval_secs, "Evaluation sweep started.");

    loop {
        ticker.tick().await;

        let sessions = match evaluator.running_sessions().await {
            Ok(sessions) => sessions,
            Err(e) => {
                tracing::error!(error = %e, "Could not list running sessions; skipping sweep.");
                continue;
            }
        };

        tracing::debug!(count = sessions.len(), "Sweeping running sessions.");
        for session in sessions {
            let evaluator = evaluator.clone();
            tokio::spawn(async move {
                if let Err(e) = evaluator.evaluate(session.id).await {
                    tracing::error!(session_id = session.id, error = %e, "Scheduled tick failed to dispatch.");
                }
            });
        }
    }
}
