//! `POST /save-credentials`: credential intake.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use relay_core::ids::ConnectionId;
use relay_core::security::Credentials;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RelayError;
use crate::handlers::HandlerState;
use crate::server::AppState;

pub const CREDENTIALS_ACCEPTED: &str =
    "Credentials received. Backend is now listening for OTPs for your session.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiStatus {
    Success,
    Error,
}

/// Response body for the HTTP API.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: ApiStatus,
    pub message: String,
}

impl ApiResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: ApiStatus::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ApiStatus::Error,
            message: message.into(),
        }
    }
}

/// A validated intake request.
#[derive(Debug)]
pub struct CredentialSubmission {
    pub connection_id: ConnectionId,
    pub credentials: Credentials,
}

impl CredentialSubmission {
    /// Validate `{api_id, api_hash, session_string, socket_id}`.
    ///
    /// Absent, null, empty and zero values all count as missing.
    pub fn from_json(body: &Value) -> Result<Self, RelayError> {
        let api_id = require_api_id(body)?;
        let api_hash = require_str(body, "api_hash")?;
        let session_string = require_str(body, "session_string")?;
        let socket_id = require_str(body, "socket_id")?;
        Ok(Self {
            connection_id: ConnectionId::from_raw(socket_id),
            credentials: Credentials::new(api_id, api_hash, session_string),
        })
    }
}

fn require_api_id(body: &Value) -> Result<i64, RelayError> {
    let parsed = match body.get("api_id") {
        None | Some(Value::Null) => return Err(RelayError::MissingField("api_id")),
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) if s.trim().is_empty() => {
            return Err(RelayError::MissingField("api_id"));
        }
        Some(Value::String(s)) => s.trim().parse().ok(),
        Some(_) => None,
    };
    match parsed {
        Some(0) => Err(RelayError::MissingField("api_id")),
        Some(id) => Ok(id),
        None => Err(RelayError::InvalidBody("api_id must be an integer".into())),
    }
}

fn require_str(body: &Value, key: &'static str) -> Result<String, RelayError> {
    match body.get(key) {
        None | Some(Value::Null) => Err(RelayError::MissingField(key)),
        Some(Value::String(s)) if s.is_empty() => Err(RelayError::MissingField(key)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(RelayError::InvalidBody(format!("{key} must be a string"))),
    }
}

pub async fn save_credentials(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<ApiResponse>, RelayError> {
    let Json(body) = body.map_err(|e| RelayError::InvalidBody(e.body_text()))?;
    let submission = CredentialSubmission::from_json(&body).inspect_err(|e| {
        tracing::warn!(error = %e, "Rejected credential submission");
    })?;
    accept(&state.handler_state, submission).await.map(Json)
}

/// Register the submission and acknowledge immediately.
pub async fn accept(
    state: &HandlerState,
    submission: CredentialSubmission,
) -> Result<ApiResponse, RelayError> {
    let CredentialSubmission {
        connection_id,
        credentials,
    } = submission;
    tracing::info!(
        connection_id = %connection_id,
        api_id = credentials.api_id,
        api_hash = %credentials.api_hash_hint(),
        session_string = %credentials.session_hint(),
        "Received credentials"
    );
    let _ = state.sessions.submit(connection_id, credentials).await?;
    Ok(ApiResponse::success(CREDENTIALS_ACCEPTED))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use relay_core::otp::OtpMatcher;
    use relay_platform::mock::MockConnector;
    use serde_json::json;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use crate::client::ClientRegistry;
    use crate::relay::EventRelay;
    use crate::sessions::{SessionConfig, SessionManager};

    fn app_state(connector: Arc<MockConnector>) -> (Arc<ClientRegistry>, AppState) {
        let registry = Arc::new(ClientRegistry::new(32, Duration::from_secs(90)));
        let relay = EventRelay::new(Arc::clone(&registry));
        let sessions = Arc::new(SessionManager::new(
            connector,
            relay.clone(),
            OtpMatcher::default(),
            SessionConfig::default(),
        ));
        let (message_tx, _) = mpsc::channel(8);
        let state = AppState {
            handler_state: Arc::new(HandlerState::new(sessions, relay)),
            client_registry: Arc::clone(&registry),
            message_tx,
            heartbeat_interval: Duration::from_secs(30),
            shutdown: CancellationToken::new(),
        };
        (registry, state)
    }

    fn full() -> Value {
        json!({
            "api_id": 123,
            "api_hash": "abcd1234",
            "session_string": "xyz...",
            "socket_id": "S1"
        })
    }

    #[test]
    fn parses_complete_payload() {
        let sub = CredentialSubmission::from_json(&full()).unwrap();
        assert_eq!(sub.connection_id.as_str(), "S1");
        assert_eq!(sub.credentials.api_id, 123);
        assert_eq!(sub.credentials.api_hash_hint(), "abcd...");
    }

    #[test]
    fn api_id_accepts_numeric_string() {
        let mut body = full();
        body["api_id"] = json!(" 456 ");
        let sub = CredentialSubmission::from_json(&body).unwrap();
        assert_eq!(sub.credentials.api_id, 456);
    }

    #[test]
    fn each_missing_field_is_reported() {
        for key in ["api_id", "api_hash", "session_string", "socket_id"] {
            let mut body = full();
            let _ = body.as_object_mut().unwrap().remove(key);
            let err = CredentialSubmission::from_json(&body).unwrap_err();
            assert!(
                matches!(err, RelayError::MissingField(k) if k == key),
                "{key}: got {err:?}"
            );
        }
    }

    #[test]
    fn empty_null_and_zero_count_as_missing() {
        for (key, value) in [
            ("api_id", json!(0)),
            ("api_id", json!("")),
            ("api_hash", json!("")),
            ("session_string", Value::Null),
            ("socket_id", json!("")),
        ] {
            let mut body = full();
            body[key] = value;
            let err = CredentialSubmission::from_json(&body).unwrap_err();
            assert!(matches!(err, RelayError::MissingField(_)), "{key}: got {err:?}");
        }
    }

    #[test]
    fn wrong_types_are_invalid_body() {
        let mut body = full();
        body["api_id"] = json!("abc");
        assert!(matches!(
            CredentialSubmission::from_json(&body),
            Err(RelayError::InvalidBody(_))
        ));

        let mut body = full();
        body["api_hash"] = json!(42);
        assert!(matches!(
            CredentialSubmission::from_json(&body),
            Err(RelayError::InvalidBody(_))
        ));
    }

    #[test]
    fn non_object_body_is_missing_fields() {
        assert!(matches!(
            CredentialSubmission::from_json(&json!([1, 2])),
            Err(RelayError::MissingField("api_id"))
        ));
    }

    #[tokio::test]
    async fn invalid_resubmission_leaves_existing_session_untouched() {
        let connector = Arc::new(MockConnector::default());
        let (registry, state) = app_state(Arc::clone(&connector));
        let (cid, _rx) = registry.register();
        let mut body = full();
        body["socket_id"] = json!(cid.as_str());

        let Json(accepted) = save_credentials(State(state.clone()), Ok(Json(body.clone())))
            .await
            .unwrap();
        assert_eq!(accepted.status, ApiStatus::Success);
        let before = state.handler_state.sessions.get(&cid).unwrap();

        body["api_hash"] = json!("");
        let err = save_credentials(State(state.clone()), Ok(Json(body)))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::MissingField("api_hash")));

        let after = state.handler_state.sessions.get(&cid).unwrap();
        assert_eq!(after.id, before.id);
        assert_eq!(state.handler_state.sessions.len(), 1);
        assert_eq!(connector.build_count(), 1);
        assert_eq!(connector.last_client().unwrap().disconnect_count(), 0);
    }

    #[tokio::test]
    async fn credentials_for_unknown_socket_are_rejected() {
        let connector = Arc::new(MockConnector::default());
        let (_registry, state) = app_state(Arc::clone(&connector));

        let err = save_credentials(State(state.clone()), Ok(Json(full())))
            .await
            .unwrap_err();

        assert!(matches!(err, RelayError::UnknownConnection(_)));
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
        assert!(state.handler_state.sessions.is_empty());
        assert_eq!(connector.build_count(), 0);
    }

    #[test]
    fn response_wire_form() {
        let json = serde_json::to_value(ApiResponse::success("ok")).unwrap();
        assert_eq!(json, json!({"status": "success", "message": "ok"}));
        let json = serde_json::to_value(ApiResponse::error("bad")).unwrap();
        assert_eq!(json["status"], "error");
    }
}
