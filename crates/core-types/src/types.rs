// In crates/core-types/src/types.rs

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A broker instrument identifier (e.g., "EUR_USD").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instrument(pub String);

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// The sign applied to unit sizes for this direction.
    pub fn sign(&self) -> Decimal {
        match self {
            Direction::Long => Decimal::ONE,
            Direction::Short => -Decimal::ONE,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "long",
            Direction::Short => "short",
        }
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "long" => Ok(Direction::Long),
            "short" => Ok(Direction::Short),
            other => Err(Error::UnknownVariant { kind: "direction", value: other.to_string() }),
        }
    }
}

/// The output of the signal calculator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Long,
    Short,
    Neutral,
}

impl Signal {
    pub fn is_neutral(&self) -> bool {
        matches!(self, Signal::Neutral)
    }

    /// The position direction this signal calls for, if any.
    pub fn direction(&self) -> Option<Direction> {
        match self {
            Signal::Long => Some(Direction::Long),
            Signal::Short => Some(Direction::Short),
            Signal::Neutral => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Long => "long",
            Signal::Short => "short",
            Signal::Neutral => "neutral",
        }
    }
}

impl FromStr for Signal {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "long" => Ok(Signal::Long),
            "short" => Ok(Signal::Short),
            "neutral" => Ok(Signal::Neutral),
            other => Err(Error::UnknownVariant { kind: "signal", value: other.to_string() }),
        }
    }
}

/// Lifecycle state of a trading session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Stopped,
    Running,
    Error,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Stopped => "stopped",
            SessionStatus::Running => "running",
            SessionStatus::Error => "error",
        }
    }
}

impl FromStr for SessionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "stopped" => Ok(SessionStatus::Stopped),
            "running" => Ok(SessionStatus::Running),
            "error" => Ok(SessionStatus::Error),
            other => Err(Error::UnknownVariant { kind: "session status", value: other.to_string() }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Open,
    Closed,
}

impl PositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionStatus::Open => "open",
            PositionStatus::Closed => "closed",
        }
    }
}

impl FromStr for PositionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "open" => Ok(PositionStatus::Open),
            "closed" => Ok(PositionStatus::Closed),
            other => {
                Err(Error::UnknownVariant { kind: "position status", value: other.to_string() })
            }
        }
    }
}

/// Severity of an audit-log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Trade,
    Analysis,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Trade => "trade",
            LogLevel::Analysis => "analysis",
        }
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "trade" => Ok(LogLevel::Trade),
            "analysis" => Ok(LogLevel::Analysis),
            other => Err(Error::UnknownVariant { kind: "log level", value: other.to_string() }),
        }
    }
}

/// Why a position record was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CloseReason {
    /// The broker no longer reports the trade as open.
    BrokerClosed,
    /// The signal dropped back into the neutral band.
    NeutralSignal,
    /// The signal flipped to the opposite direction.
    SignalFlip,
    /// The session was stopped with position flattening requested.
    SessionStopped,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::BrokerClosed => "broker-closed",
            CloseReason::NeutralSignal => "neutral-signal",
            CloseReason::SignalFlip => "signal-flip",
            CloseReason::SessionStopped => "session-stopped",
        }
    }
}

/// The per-session strategy parameters.
///
/// Validated at the edge (session create/update); the engine assumes a
/// stored configuration is well-formed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub instrument: Instrument,
    /// Candle granularity in broker notation (e.g., "M5", "H1").
    pub granularity: String,
    pub short_window: u32,
    pub long_window: u32,
    /// Unsigned trade size; the executor signs it by direction.
    pub units: Decimal,
    /// Take-profit distance as a fraction of the entry price.
    pub tp_multiplier: Decimal,
    /// Stop-loss distance as a fraction of the entry price.
    pub sl_multiplier: Decimal,
    /// Relative MA divergence below which the signal is neutral.
    pub neutral_threshold: Decimal,
}

impl StrategyConfig {
    /// Checks the configuration invariants, returning the first violation.
    pub fn validate(&self) -> Result<()> {
        if self.instrument.0.trim().is_empty() {
            return Err(Error::InvalidConfig("instrument must not be empty".into()));
        }
        if self.granularity.trim().is_empty() {
            return Err(Error::InvalidConfig("granularity must not be empty".into()));
        }
        if self.short_window == 0 {
            return Err(Error::InvalidConfig("short_window must be at least 1".into()));
        }
        if self.long_window <= self.short_window {
            return Err(Error::InvalidConfig(format!(
                "long_window ({}) must be greater than short_window ({})",
                self.long_window, self.short_window
            )));
        }
        if self.units <= Decimal::ZERO {
            return Err(Error::InvalidConfig("units must be positive".into()));
        }
        if self.tp_multiplier <= Decimal::ZERO {
            return Err(Error::InvalidConfig("tp_multiplier must be positive".into()));
        }
        if self.sl_multiplier <= Decimal::ZERO {
            return Err(Error::InvalidConfig("sl_multiplier must be positive".into()));
        }
        if self.neutral_threshold < Decimal::ZERO {
            return Err(Error::InvalidConfig("neutral_threshold must not be negative".into()));
        }
        Ok(())
    }

    /// How many candles a tick requests so the long SMA always has a margin
    /// of completed candles to draw from.
    pub fn candle_count(&self) -> u32 {
        (2 * self.long_window).max(self.long_window + 5)
    }
}

/// A user-defined trading session and its last evaluation analytics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub name: String,
    #[serde(flatten)]
    pub config: StrategyConfig,
    pub status: SessionStatus,
    pub last_signal: Option<Signal>,
    pub last_short_ma: Option<Decimal>,
    pub last_long_ma: Option<Decimal>,
    pub last_price: Option<Decimal>,
    pub last_evaluated_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for creating a session. Always created stopped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSession {
    pub name: String,
    pub config: StrategyConfig,
}

/// A position opened (and possibly closed) by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: i64,
    pub session_id: i64,
    pub direction: Direction,
    /// Signed units: positive for long, negative for short.
    pub units: Decimal,
    pub entry_price: Decimal,
    pub tp_price: Option<Decimal>,
    pub sl_price: Option<Decimal>,
    pub status: PositionStatus,
    /// Absent for paper positions.
    pub broker_trade_id: Option<String>,
    pub exit_price: Option<Decimal>,
    pub realized_pl: Option<Decimal>,
    pub close_reason: Option<String>,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Position {
    pub fn is_paper(&self) -> bool {
        self.broker_trade_id.is_none()
    }
}

/// Payload for recording a freshly opened position.
#[derive(Debug, Clone)]
pub struct NewPosition {
    pub session_id: i64,
    pub direction: Direction,
    pub units: Decimal,
    pub entry_price: Decimal,
    pub tp_price: Option<Decimal>,
    pub sl_price: Option<Decimal>,
    pub broker_trade_id: Option<String>,
}

/// Payload for closing a position record. Closing is terminal.
#[derive(Debug, Clone)]
pub struct PositionClose {
    pub exit_price: Option<Decimal>,
    pub realized_pl: Option<Decimal>,
    pub reason: CloseReason,
}

/// An append-only audit-log entry owned by a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: i64,
    pub session_id: i64,
    pub level: LogLevel,
    pub message: String,
    pub detail: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// The analytics snapshot persisted on every successful evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionAnalytics {
    pub session_id: i64,
    pub signal: Signal,
    pub short_ma: Decimal,
    pub long_ma: Decimal,
    pub last_price: Decimal,
    pub evaluated_at: DateTime<Utc>,
}

/// A completed or in-progress market candle as the engine sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub complete: bool,
    pub time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn config() -> StrategyConfig {
        StrategyConfig {
            instrument: Instrument("EUR_USD".to_string()),
            granularity: "M5".to_string(),
            short_window: 5,
            long_window: 20,
            units: dec!(100),
            tp_multiplier: dec!(0.02),
            sl_multiplier: dec!(0.01),
            neutral_threshold: dec!(0.001),
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn long_window_must_exceed_short_window() {
        let mut cfg = config();
        cfg.long_window = cfg.short_window;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn units_must_be_positive() {
        let mut cfg = config();
        cfg.units = Decimal::ZERO;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn multipliers_must_be_positive() {
        let mut cfg = config();
        cfg.tp_multiplier = Decimal::ZERO;
        assert!(cfg.validate().is_err());

        let mut cfg = config();
        cfg.sl_multiplier = dec!(-0.01);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn neutral_threshold_may_be_zero_but_not_negative() {
        let mut cfg = config();
        cfg.neutral_threshold = Decimal::ZERO;
        assert!(cfg.validate().is_ok());

        cfg.neutral_threshold = dec!(-0.001);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn candle_count_covers_the_long_window_with_margin() {
        let mut cfg = config();
        assert_eq!(cfg.candle_count(), 40); // 2 * 20

        cfg.short_window = 2;
        cfg.long_window = 3;
        assert_eq!(cfg.candle_count(), 8); // 3 + 5
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [SessionStatus::Stopped, SessionStatus::Running, SessionStatus::Error] {
            assert_eq!(status.as_str().parse::<SessionStatus>().unwrap(), status);
        }
    }
}
