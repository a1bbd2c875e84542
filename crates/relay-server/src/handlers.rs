//! Duplex-channel lifecycle hooks and client event dispatch.

use std::sync::Arc;

use rand::Rng;
use relay_core::events::ClientEvent;
use relay_core::ids::ConnectionId;

use crate::relay::EventRelay;
use crate::sessions::SessionManager;

pub const STATUS_RECONNECTED: &str = "Reconnected. Your Telegram session is active and listening for OTPs.";

/// Shared state for the HTTP and WebSocket handlers.
pub struct HandlerState {
    pub sessions: Arc<SessionManager>,
    pub relay: EventRelay,
}

impl HandlerState {
    pub fn new(sessions: Arc<SessionManager>, relay: EventRelay) -> Self {
        Self { sessions, relay }
    }
}

/// Browser connection opened: tell it where it stands.
pub fn on_connect(state: &HandlerState, connection_id: &ConnectionId) -> bool {
    let message = if state.sessions.is_active(connection_id) {
        STATUS_RECONNECTED.to_string()
    } else {
        format!("Connected to backend! Your session ID is {connection_id}")
    };
    state.relay.status(connection_id, message)
}

/// Browser connection closed: tear down its platform session, if any.
pub async fn on_disconnect(state: &HandlerState, connection_id: &ConnectionId) -> bool {
    let closed = state.sessions.close(connection_id).await;
    tracing::info!(connection_id = %connection_id, session_closed = closed, "Client disconnected");
    closed
}

/// Handle one text frame from a browser.
pub fn dispatch(state: &HandlerState, connection_id: &ConnectionId, raw: &str) {
    match ClientEvent::parse(raw) {
        Ok(ClientEvent::RequestOtpSimulation) => {
            tracing::info!(connection_id = %connection_id, "Received request for OTP simulation");
            let _ = simulate_otp(state, connection_id);
        }
        Ok(ClientEvent::Unknown(name)) => {
            tracing::warn!(connection_id = %connection_id, event = %name, "Ignoring unknown client event");
        }
        Err(e) => {
            tracing::warn!(connection_id = %connection_id, error = %e, "Ignoring malformed client frame");
        }
    }
}

/// Send a synthetic OTP to the requesting connection only.
pub fn simulate_otp(state: &HandlerState, connection_id: &ConnectionId) -> bool {
    let otp = simulated_otp();
    tracing::debug!(connection_id = %connection_id, otp = %otp, "Emitting simulated OTP");
    state.relay.otp(connection_id, otp)
}

pub fn simulated_otp() -> String {
    let mut bytes = [0u8; 3];
    rand::thread_rng().fill(&mut bytes);
    let code: String = bytes.iter().map(|b| format!("{b:02X}")).collect();
    format!("SIMULATED OTP: {code} (from backend)")
}
