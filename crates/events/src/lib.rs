// In crates/events/src/lib.rs

use chrono::{DateTime, Utc};
use core_types::{CloseReason, Direction, LogLevel, SessionAnalytics};
use rust_decimal::Decimal;
use serde::Serialize;

/// A log entry event mirrored to the UI feed as it is appended to the store.
#[derive(Debug, Clone, Serialize)]
pub struct WsLogMessage {
    pub session_id: i64,
    pub level: LogLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

/// A position lifecycle event (open or close) for the UI feed.
#[derive(Debug, Clone, Serialize)]
pub struct WsTradeEvent {
    pub session_id: i64,
    pub position_id: i64,
    pub action: TradeAction,
    pub instrument: String,
    pub direction: Direction,
    pub units: Decimal,
    pub price: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realized_pl: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<CloseReason>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Opened,
    Closed,
}

/// The top-level WebSocket message enum.
/// `tag` and `content` are used by serde for clean JSON representation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum WsMessage {
    Log(WsLogMessage),
    Analytics(SessionAnalytics),
    Trade(WsTradeEvent),
}
