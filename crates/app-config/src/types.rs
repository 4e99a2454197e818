// In crates/app-config/src/types.rs

use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct Settings {
    /// The application's general settings.
    pub app: AppSettings,
    /// Settings for the broker REST API.
    pub broker: BrokerSettings,
    /// Settings for the database connection.
    pub database: DatabaseSettings,
    /// Settings for the HTTP API server.
    pub server: ServerSettings,
    /// Settings for the periodic evaluation sweep.
    #[serde(default)]
    pub scheduler: SchedulerSettings,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AppSettings {
    /// The environment the application is running in (e.g., "development", "production").
    pub environment: String,
    /// The log level for the application.
    pub log_level: String,
}

/// Broker connection settings.
///
/// Credentials are optional: a deployment without `api_token`/`account_id`
/// runs in paper mode, where positions are tracked purely on local records
/// and no order is ever sent to the broker.
#[derive(Deserialize, Debug, Clone)]
pub struct BrokerSettings {
    /// The REST API base URL (e.g., "https://api-fxpractice.oanda.com").
    pub rest_base_url: String,
    /// The bearer token for the broker API.
    pub api_token: Option<String>,
    /// The broker account identifier trades are placed against.
    pub account_id: Option<String>,
}

impl BrokerSettings {
    /// Whether this deployment can place real orders.
    pub fn has_credentials(&self) -> bool {
        self.api_token.as_deref().is_some_and(|t| !t.is_empty())
            && self.account_id.as_deref().is_some_and(|a| !a.is_empty())
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct DatabaseSettings {
    /// The connection URL for the PostgreSQL database.
    pub url: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Debug, Clone)]
pub struct SchedulerSettings {
    /// Seconds between sweeps over the running sessions.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self { sweep_interval_secs: default_sweep_interval_secs() }
    }
}

fn default_sweep_interval_secs() -> u64 {
    60
}
