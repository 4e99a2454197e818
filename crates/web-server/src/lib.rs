// In crates/web-server/src/lib.rs

use app_config::ServerSettings;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use core_types::{LogRecord, Position, Session};
use database::Store;
use engine::SessionEvaluator;
use events::WsMessage;
use futures::{sink::SinkExt, stream::StreamExt};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use types::{
    PaginatedResponse, PaginationParams, PositionParams, SessionRequest, StopParams,
};

pub mod error;
pub mod types;

// Re-export our custom error type for convenience.
pub use error::{Error, Result};

// WebSocket message replay cache type
type WsCache = Arc<Mutex<VecDeque<WsMessage>>>;

const WS_CACHE_SIZE: usize = 200; // The maximum number of messages to keep in the replay cache.

/// The shared application state that is available to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub evaluator: Arc<SessionEvaluator>,
    pub ws_tx: broadcast::Sender<WsMessage>, // For broadcasting live messages
    pub ws_cache: WsCache,                   // For replaying recent messages
}

/// Creates the main application router with all routes and middleware.
pub fn create_router(app_state: AppState) -> Router {
    // In a production environment, restrict the origin to the actual frontend domain.
    let cors = tower_http::cors::CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any);

    let api_router = Router::new()
        .route("/sessions", post(create_session_handler).get(list_sessions_handler))
        .route("/sessions/{id}", get(get_session_handler).put(update_session_handler))
        .route("/sessions/{id}/start", post(start_session_handler))
        .route("/sessions/{id}/stop", post(stop_session_handler))
        .route("/sessions/{id}/evaluate", post(evaluate_session_handler))
        .route("/sessions/{id}/positions", get(list_positions_handler))
        .route("/sessions/{id}/logs", get(list_logs_handler));

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_check_handler))
        .nest("/api", api_router)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// A simple health check handler.
async fn health_check_handler() -> &'static str {
    "OK"
}

/// Handler for `POST /api/sessions`.
/// Validates the strategy invariants before anything reaches the store.
async fn create_session_handler(
    State(state): State<AppState>,
    Json(request): Json<SessionRequest>,
) -> Result<(StatusCode, Json<Session>)> {
    let new_session = request.into_new_session();
    new_session.config.validate()?;

    let session = state.store.create_session(&new_session).await?;
    tracing::info!(session_id = session.id, name = %session.name, "Session created.");
    Ok((StatusCode::CREATED, Json(session)))
}

/// Handler for `GET /api/sessions`.
async fn list_sessions_handler(State(state): State<AppState>) -> Result<Json<Vec<Session>>> {
    Ok(Json(state.store.list_sessions().await?))
}

/// Handler for `GET /api/sessions/:id`.
async fn get_session_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Session>> {
    match state.store.get_session(id).await? {
        Some(session) => Ok(Json(session)),
        None => Err(Error::NotFound(format!("Session {id} not found"))),
    }
}

/// Handler for `PUT /api/sessions/:id`.
///
/// Configuration edits are last-write-wins; a session mid-evaluation picks
/// the new configuration up on its next tick.
async fn update_session_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<SessionRequest>,
) -> Result<Json<Session>> {
    let updated = request.into_new_session();
    updated.config.validate()?;

    match state.store.update_session(id, &updated.name, &updated.config).await? {
        Some(session) => Ok(Json(session)),
        None => Err(Error::NotFound(format!("Session {id} not found"))),
    }
}

/// Handler for `POST /api/sessions/:id/start`.
async fn start_session_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Session>> {
    let session = state.evaluator.start(id).await?;
    Ok(Json(session))
}

/// Handler for `POST /api/sessions/:id/stop`.
async fn stop_session_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<StopParams>,
) -> Result<Json<Session>> {
    let session = state.evaluator.stop(id, params.flatten).await?;
    Ok(Json(session))
}

/// Handler for `POST /api/sessions/:id/evaluate`.
///
/// Fires one tick and returns immediately; the tick reports its outcome
/// through the session record and the audit log, not this response.
async fn evaluate_session_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    // Surface an unknown id synchronously; everything else is async.
    if state.store.get_session(id).await?.is_none() {
        return Err(Error::NotFound(format!("Session {id} not found")));
    }

    let evaluator = state.evaluator.clone();
    tokio::spawn(async move {
        if let Err(e) = evaluator.evaluate(id).await {
            tracing::error!(session_id = id, error = %e, "Manual tick failed to dispatch.");
        }
    });

    Ok(StatusCode::ACCEPTED)
}

/// Handler for `GET /api/sessions/:id/positions`.
async fn list_positions_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<PositionParams>,
) -> Result<Json<Vec<Position>>> {
    if state.store.get_session(id).await?.is_none() {
        return Err(Error::NotFound(format!("Session {id} not found")));
    }
    Ok(Json(state.store.list_positions(id, params.status).await?))
}

/// Handler for `GET /api/sessions/:id/logs`.
/// Newest entries first.
async fn list_logs_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<PaginatedResponse<LogRecord>>> {
    if state.store.get_session(id).await?.is_none() {
        return Err(Error::NotFound(format!("Session {id} not found")));
    }

    let (items, total_items) = state.store.list_logs(id, params.page, params.page_size).await?;

    Ok(Json(PaginatedResponse {
        items,
        total_items,
        page: params.page,
        page_size: params.page_size,
    }))
}

/// The handler for `GET /ws`.
/// Upgrades the connection to a WebSocket and handles the real-time communication.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// The actual WebSocket handling logic after the connection is upgraded.
async fn handle_socket(socket: WebSocket, state: AppState) {
    tracing::info!("New WebSocket client connected.");
    let (mut sender, mut receiver) = socket.split();

    // --- 1. The "Replay" ---
    // Get a lock on the cache and clone all historical messages to a local vector.
    let replay_msgs: Vec<WsMessage> = {
        let cache = state.ws_cache.lock().expect("ws cache poisoned");
        cache.iter().cloned().collect()
    };
    for msg in replay_msgs {
        let Ok(json_msg) = serde_json::to_string(&msg) else { continue };
        if sender.send(Message::Text(json_msg.into())).await.is_err() {
            tracing::info!("WebSocket client disconnected during replay.");
            return;
        }
    }

    // --- 2. "Going Live" ---
    // Subscribe to the broadcast channel to receive new, live messages.
    let mut rx = state.ws_tx.subscribe();

    loop {
        tokio::select! {
            // Await a new message from the broadcast channel.
            Ok(msg) = rx.recv() => {
                let Ok(json_msg) = serde_json::to_string(&msg) else { continue };
                if sender.send(Message::Text(json_msg.into())).await.is_err() {
                    tracing::info!("WebSocket client disconnected.");
                    break;
                }
            }
            // Await a message from the client (e.g., a ping or a close frame).
            Some(Ok(msg)) = receiver.next() => {
                if let Message::Close(_) = msg {
                    tracing::info!("WebSocket client sent close frame.");
                    break;
                }
            }
            else => {
                break;
            }
        }
    }
    tracing::info!("WebSocket client connection closed.");
}

/// The main entry point for running the web server.
///
/// Spawns the replay-cache maintainer and serves the application router
/// until the process is terminated.
pub async fn run(
    settings: ServerSettings,
    store: Arc<dyn Store>,
    evaluator: Arc<SessionEvaluator>,
    ws_tx: broadcast::Sender<WsMessage>,
) -> Result<()> {
    let ws_cache: WsCache = Arc::new(Mutex::new(VecDeque::with_capacity(WS_CACHE_SIZE)));

    // Keep the replay cache fed with the most recent messages.
    {
        let ws_cache = ws_cache.clone();
        let mut rx = ws_tx.subscribe();
        tokio::spawn(async move {
            while let Ok(msg) = rx.recv().await {
                let mut cache = ws_cache.lock().expect("ws cache poisoned");
                if cache.len() == WS_CACHE_SIZE {
                    cache.pop_front();
                }
                cache.push_back(msg);
            }
        });
    }

    let app_state = AppState { store, evaluator, ws_tx, ws_cache };
    let app = create_router(app_state);

    let address = format!("{}:{}", settings.host, settings.port);
    tracing::info!("Web server listening on {}", address);

    let listener = TcpListener::bind(&address).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
