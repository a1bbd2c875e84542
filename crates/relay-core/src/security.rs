use secrecy::{ExposeSecret, SecretString};

/// Messaging-platform credentials submitted by a browser session.
///
/// `api_hash` and `session_string` stay wrapped in `SecretString` (zeroized on
/// drop); `Debug` never prints them.
#[derive(Clone)]
pub struct Credentials {
    pub api_id: i64,
    pub api_hash: SecretString,
    pub session_string: SecretString,
}

impl Credentials {
    pub fn new(api_id: i64, api_hash: impl Into<String>, session_string: impl Into<String>) -> Self {
        Self {
            api_id,
            api_hash: SecretString::from(api_hash.into()),
            session_string: SecretString::from(session_string.into()),
        }
    }

    /// Short prefix of the api hash, safe for logs.
    pub fn api_hash_hint(&self) -> String {
        redact_prefix(self.api_hash.expose_secret(), 4)
    }

    /// Short prefix of the session string, safe for logs.
    pub fn session_hint(&self) -> String {
        redact_prefix(self.session_string.expose_secret(), 10)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_id", &self.api_id)
            .field("api_hash", &"[REDACTED]")
            .field("session_string", &"[REDACTED]")
            .finish()
    }
}

/// Keep the first `keep` characters and mark the rest as elided.
pub fn redact_prefix(value: &str, keep: usize) -> String {
    let prefix: String = value.chars().take(keep).collect();
    format!("{prefix}...")
}
