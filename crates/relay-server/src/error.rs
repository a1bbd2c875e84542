use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use relay_core::errors::PlatformError;
use relay_core::ids::ConnectionId;

use crate::intake::ApiResponse;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Missing credentials: {0}")]
    MissingField(&'static str),

    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("No open connection with socket_id {0}")]
    UnknownConnection(ConnectionId),

    #[error("Failed to initialize Telegram client: {0}")]
    ExternalSetup(String),

    #[error("teardown failed: {0}")]
    Teardown(String),

    #[error("Telegram session is not authorized: {0}")]
    Authorization(String),

    #[error("Telegram connection failed: {0}")]
    Platform(PlatformError),
}

impl From<PlatformError> for RelayError {
    fn from(e: PlatformError) -> Self {
        if e.needs_reauthorization() {
            Self::Authorization(e.to_string())
        } else {
            Self::Platform(e)
        }
    }
}

impl RelayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingField(_) | Self::InvalidBody(_) | Self::UnknownConnection(_) => {
                StatusCode::BAD_REQUEST
            }
            // Only intake failures reach HTTP; the rest are reported as events.
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::MissingField(_) => "missing_field",
            Self::InvalidBody(_) => "invalid_body",
            Self::UnknownConnection(_) => "unknown_connection",
            Self::ExternalSetup(_) => "external_setup",
            Self::Teardown(_) => "teardown",
            Self::Authorization(_) => "authorization",
            Self::Platform(_) => "platform",
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(ApiResponse::error(self.to_string()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_map_to_400() {
        assert_eq!(RelayError::MissingField("api_id").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            RelayError::InvalidBody("not json".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn setup_failure_maps_to_500_with_message() {
        let err = RelayError::ExternalSetup("invalid credentials: bad hash".into());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            err.to_string(),
            "Failed to initialize Telegram client: invalid credentials: bad hash"
        );
    }

    #[test]
    fn platform_errors_split_on_reauthorization() {
        let err: RelayError = PlatformError::Unauthorized.into();
        assert!(matches!(err, RelayError::Authorization(_)));

        let err: RelayError = PlatformError::Connection("refused".into()).into();
        assert!(matches!(err, RelayError::Platform(_)));
        assert_eq!(err.to_string(), "Telegram connection failed: connection failed: refused");
    }

    #[test]
    fn missing_field_names_the_field() {
        assert_eq!(
            RelayError::MissingField("session_string").to_string(),
            "Missing credentials: session_string"
        );
        assert_eq!(RelayError::MissingField("api_id").error_kind(), "missing_field");
    }
}
