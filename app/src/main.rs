// In app/src/main.rs

use anyhow::Result;
use api_client::{BrokerClient, MarketData, TradeGateway};
use clap::{Parser, Subcommand};
use database::Store;
use engine::SessionEvaluator;
use events::WsMessage;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing_subscriber::prelude::*;

// --- Command-Line Interface Definition ---

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = "A session-based moving-average crossover trading service.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Runs the evaluation sweep and the HTTP API.
    Run,

    /// Runs a single evaluation tick for one session, then exits.
    Tick {
        /// The session id to evaluate.
        #[arg(short, long)]
        session: i64,
    },
}

// --- Main Application Entry Point ---

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from a .env file, if it exists.
    dotenvy::dotenv().ok();

    let settings = app_config::load_settings()?;

    // --- Tracing Setup ---
    let default_level = tracing::Level::from_str(&settings.app.log_level)
        .unwrap_or(tracing::Level::INFO);
    let fmt_layer = tracing_subscriber::fmt::layer().with_filter(
        tracing_subscriber::filter::Targets::new()
            .with_target("sqlx::query", tracing::Level::WARN) // Disable sqlx query debug logs
            .with_default(default_level),
    );
    tracing_subscriber::registry().with(fmt_layer).init();

    let cli = Cli::parse();

    tracing::info!(environment = %settings.app.environment, "Starting Meridian application");

    // --- Shared components ---
    let db = database::connect(&settings.database).await?;
    let store: Arc<dyn Store> = Arc::new(db);

    let broker = BrokerClient::new(&settings.broker);
    let market: Arc<dyn MarketData> = Arc::new(broker.clone());
    let trading: Option<Arc<dyn TradeGateway>> = if broker.has_credentials() {
        Some(Arc::new(broker))
    } else {
        tracing::warn!("No broker credentials configured; running in paper mode.");
        None
    };

    let (ws_tx, _) = broadcast::channel::<WsMessage>(1024);
    let evaluator =
        Arc::new(SessionEvaluator::new(store.clone(), market, trading, ws_tx.clone()));

    match cli.command {
        Commands::Run => {
            // The sweep and the API server run side by side for the lifetime
            // of the process.
            let sweep = {
                let evaluator = evaluator.clone();
                let scheduler = settings.scheduler.clone();
                tokio::spawn(async move {
                    engine::sweep::run(evaluator, scheduler).await;
                })
            };

            web_server::run(settings.server, store, evaluator, ws_tx).await?;
            sweep.abort();
        }
        Commands::Tick { session } => {
            evaluator.evaluate(session).await?;
            tracing::info!(session_id = session, "Tick complete.");
        }
    }

    Ok(())
}
