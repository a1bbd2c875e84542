/// Failures reported by a messaging-platform client.
#[derive(Clone, Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("session not authorized")]
    Unauthorized,
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("connection closed")]
    Closed,
}

impl PlatformError {
    /// Whether the account needs a fresh session string before retrying.
    pub fn needs_reauthorization(&self) -> bool {
        matches!(self, Self::Unauthorized | Self::InvalidCredentials(_))
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::InvalidCredentials(_) => "invalid_credentials",
            Self::Connection(_) => "connection",
            Self::Unauthorized => "unauthorized",
            Self::Protocol(_) => "protocol",
            Self::Closed => "closed",
        }
    }
}
