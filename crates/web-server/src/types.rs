// In crates/web-server/src/types.rs

use core_types::{Instrument, NewSession, PositionStatus, StrategyConfig};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The request body for creating or updating a session's configuration.
#[derive(Debug, Deserialize)]
pub struct SessionRequest {
    pub name: String,
    pub instrument: String,
    pub granularity: String,
    pub short_window: u32,
    pub long_window: u32,
    pub units: Decimal,
    pub tp_multiplier: Decimal,
    pub sl_multiplier: Decimal,
    pub neutral_threshold: Decimal,
}

impl SessionRequest {
    pub fn into_new_session(self) -> NewSession {
        NewSession {
            name: self.name,
            config: StrategyConfig {
                instrument: Instrument(self.instrument),
                granularity: self.granularity,
                short_window: self.short_window,
                long_window: self.long_window,
                units: self.units,
                tp_multiplier: self.tp_multiplier,
                sl_multiplier: self.sl_multiplier,
                neutral_threshold: self.neutral_threshold,
            },
        }
    }
}

/// Query parameters for the stop endpoint (`?flatten=true` closes all open
/// positions as a side effect).
#[derive(Debug, Deserialize)]
pub struct StopParams {
    #[serde(default)]
    pub flatten: bool,
}

/// Query parameters for position listing.
#[derive(Debug, Deserialize)]
pub struct PositionParams {
    pub status: Option<PositionStatus>,
}

/// Represents a paginated list of items.
#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total_items: i64,
    pub page: u32,
    pub page_size: u32,
}

/// Represents the pagination query parameters from the URL (e.g., ?page=1&page_size=50).
#[derive(Debug, Deserialize)]
pub struct PaginationParams {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

// Helper functions for serde defaults.
fn default_page() -> u32 {
    1
}
fn default_page_size() -> u32 {
    50
}
