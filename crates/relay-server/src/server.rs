use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use relay_core::ids::ConnectionId;
use relay_core::otp::OtpMatcher;
use relay_core::platform::PlatformConnector;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::client::{self, ClientRegistry};
use crate::config::ServerConfig;
use crate::handlers::{self, HandlerState};
use crate::intake;
use crate::relay::EventRelay;
use crate::sessions::{SessionConfig, SessionManager};
use crate::shutdown::{ShutdownCoordinator, ShutdownReport};

const INDEX_HTML: &str = include_str!("../assets/index.html");

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub handler_state: Arc<HandlerState>,
    pub client_registry: Arc<ClientRegistry>,
    pub message_tx: mpsc::Sender<(ConnectionId, String)>,
    pub heartbeat_interval: Duration,
    pub shutdown: CancellationToken,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/save-credentials", post(intake::save_credentials))
        .route("/ws", get(ws_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind the listener and start serving. Returns a handle to shut it down.
pub async fn start(
    config: ServerConfig,
    connector: Arc<dyn PlatformConnector>,
) -> Result<ServerHandle, std::io::Error> {
    let coordinator = ShutdownCoordinator::new();
    let client_registry = Arc::new(ClientRegistry::new(
        config.max_send_queue,
        config.client_timeout(),
    ));
    let relay = EventRelay::new(Arc::clone(&client_registry));
    let sessions = Arc::new(SessionManager::new(
        connector,
        relay.clone(),
        OtpMatcher::default(),
        SessionConfig {
            teardown_timeout: config.teardown_timeout(),
        },
    ));
    let handler_state = Arc::new(HandlerState::new(Arc::clone(&sessions), relay));

    let cleanup = client::start_cleanup_task(
        Arc::clone(&client_registry),
        config.cleanup_interval(),
        coordinator.token(),
    );

    let (msg_tx, msg_rx) = mpsc::channel::<(ConnectionId, String)>(1024);
    let events = tokio::spawn(process_client_events(
        msg_rx,
        Arc::clone(&handler_state),
        coordinator.token(),
    ));

    let app_state = AppState {
        handler_state,
        client_registry: Arc::clone(&client_registry),
        message_tx: msg_tx,
        heartbeat_interval: config.heartbeat_interval(),
        shutdown: coordinator.token(),
    };

    let router = build_router(app_state);
    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(host = %config.host, port = local_addr.port(), "OTP relay server started");

    let token = coordinator.token();
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(token.cancelled_owned())
            .await
        {
            tracing::error!(error = %e, "HTTP server stopped with error");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        sessions,
        client_registry,
        coordinator,
        tasks: vec![server, cleanup, events],
    })
}

/// Handle returned by `start()`; owns the background tasks.
pub struct ServerHandle {
    pub port: u16,
    sessions: Arc<SessionManager>,
    client_registry: Arc<ClientRegistry>,
    coordinator: ShutdownCoordinator,
    tasks: Vec<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn client_registry(&self) -> &Arc<ClientRegistry> {
        &self.client_registry
    }

    /// Stop accepting connections, close every session, then drain tasks.
    pub async fn shutdown(self) -> ShutdownReport {
        self.coordinator.run(&self.sessions, self.tasks, None).await
    }
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "connections": state.client_registry.count(),
        "sessions": state.handler_state.sessions.len(),
        "platform": state.handler_state.sessions.platform(),
    }))
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Run one browser connection from open to close.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (connection_id, rx) = state.client_registry.register();
    tracing::info!(connection_id = %connection_id, "WebSocket client connected");
    let _ = handlers::on_connect(&state.handler_state, &connection_id);

    client::handle_ws_connection(
        socket,
        connection_id.clone(),
        rx,
        Arc::clone(&state.client_registry),
        state.message_tx.clone(),
        state.heartbeat_interval,
        state.shutdown.clone(),
    )
    .await;

    let _ = handlers::on_disconnect(&state.handler_state, &connection_id).await;
}

/// Process incoming frames from WebSocket clients.
async fn process_client_events(
    mut rx: mpsc::Receiver<(ConnectionId, String)>,
    state: Arc<HandlerState>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            msg = rx.recv() => match msg {
                Some((connection_id, raw)) => handlers::dispatch(&state, &connection_id, &raw),
                None => break,
            },
            () = shutdown.cancelled() => break,
        }
    }
}
