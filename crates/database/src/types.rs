// In crates/database/src/types.rs

use crate::error::Result;
use chrono::{DateTime, Utc};
use core_types::{
    Instrument, LogLevel, LogRecord, Position, Session, StrategyConfig,
};
use rust_decimal::Decimal;
use sqlx::FromRow;

/// Raw `sessions` row; enums are stored as text and parsed on the way out.
#[derive(Debug, FromRow)]
pub(crate) struct SessionRow {
    pub id: i64,
    pub name: String,
    pub instrument: String,
    pub granularity: String,
    pub short_window: i32,
    pub long_window: i32,
    pub units: Decimal,
    pub tp_multiplier: Decimal,
    pub sl_multiplier: Decimal,
    pub neutral_threshold: Decimal,
    pub status: String,
    pub last_signal: Option<String>,
    pub last_short_ma: Option<Decimal>,
    pub last_long_ma: Option<Decimal>,
    pub last_price: Option<Decimal>,
    pub last_evaluated_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionRow {
    pub(crate) fn into_session(self) -> Result<Session> {
        Ok(Session {
            id: self.id,
            name: self.name,
            config: StrategyConfig {
                instrument: Instrument(self.instrument),
                granularity: self.granularity,
                short_window: self.short_window as u32,
                long_window: self.long_window as u32,
                units: self.units,
                tp_multiplier: self.tp_multiplier,
                sl_multiplier: self.sl_multiplier,
                neutral_threshold: self.neutral_threshold,
            },
            status: self.status.parse()?,
            last_signal: self.last_signal.map(|s| s.parse()).transpose()?,
            last_short_ma: self.last_short_ma,
            last_long_ma: self.last_long_ma,
            last_price: self.last_price,
            last_evaluated_at: self.last_evaluated_at,
            error_message: self.error_message,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct PositionRow {
    pub id: i64,
    pub session_id: i64,
    pub direction: String,
    pub units: Decimal,
    pub entry_price: Decimal,
    pub tp_price: Option<Decimal>,
    pub sl_price: Option<Decimal>,
    pub status: String,
    pub broker_trade_id: Option<String>,
    pub exit_price: Option<Decimal>,
    pub realized_pl: Option<Decimal>,
    pub close_reason: Option<String>,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl PositionRow {
    pub(crate) fn into_position(self) -> Result<Position> {
        Ok(Position {
            id: self.id,
            session_id: self.session_id,
            direction: self.direction.parse()?,
            units: self.units,
            entry_price: self.entry_price,
            tp_price: self.tp_price,
            sl_price: self.sl_price,
            status: self.status.parse()?,
            broker_trade_id: self.broker_trade_id,
            exit_price: self.exit_price,
            realized_pl: self.realized_pl,
            close_reason: self.close_reason,
            opened_at: self.opened_at,
            closed_at: self.closed_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct LogRow {
    pub id: i64,
    pub session_id: i64,
    pub level: String,
    pub message: String,
    pub detail: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl LogRow {
    pub(crate) fn into_record(self) -> Result<LogRecord> {
        Ok(LogRecord {
            id: self.id,
            session_id: self.session_id,
            level: self.level.parse::<LogLevel>()?,
            message: self.message,
            detail: self.detail,
            created_at: self.created_at,
        })
    }
}
