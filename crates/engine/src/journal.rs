// In crates/engine/src/journal.rs

use database::Store;
use core_types::LogLevel;
use events::{WsLogMessage, WsMessage};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Writes session audit-log entries and mirrors them onto the live event
/// feed. The log is append-only; the engine never mutates or deletes
/// entries.
#[derive(Clone)]
pub struct Journal {
    store: Arc<dyn Store>,
    events: broadcast::Sender<WsMessage>,
}

impl Journal {
    pub fn new(store: Arc<dyn Store>, events: broadcast::Sender<WsMessage>) -> Self {
        Self { store, events }
    }

    /// Appends one entry to the session's audit log and broadcasts it.
    /// Broadcasting is best-effort; a feed without subscribers is normal.
    pub async fn append(
        &self,
        session_id: i64,
        level: LogLevel,
        message: impl Into<String>,
        detail: Option<serde_json::Value>,
    ) -> database::Result<()> {
        let message = message.into();
        let record = self.store.append_log(session_id, level, &message, detail).await?;

        let _ = self.events.send(WsMessage::Log(WsLogMessage {
            session_id: record.session_id,
            level: record.level,
            message: record.message,
            detail: record.detail,
            timestamp: record.created_at,
        }));

        Ok(())
    }

    /// Publishes a non-log event (analytics, trades) to the feed.
    pub fn publish(&self, message: WsMessage) {
        let _ = self.events.send(message);
    }
}
