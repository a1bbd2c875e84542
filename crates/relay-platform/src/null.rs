use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream;
use relay_core::errors::PlatformError;
use relay_core::platform::{MessageStream, PlatformClient, PlatformConnector};
use relay_core::security::Credentials;
use secrecy::ExposeSecret;

/// Placeholder backend: accepts credentials and connects to nothing.
///
/// Its clients report `delivers_messages() == false`, so sessions tell the
/// browser that no OTPs will be relayed. A session string that is blank after trimming is treated as unauthorized.
#[derive(Clone, Debug, Default)]
pub struct NullConnector;

impl PlatformConnector for NullConnector {
    fn name(&self) -> &str {
        "null"
    }

    fn build(&self, credentials: &Credentials) -> Result<Arc<dyn PlatformClient>, PlatformError> {
        if credentials.api_id <= 0 {
            return Err(PlatformError::InvalidCredentials(format!(
                "api_id must be positive, got {}",
                credentials.api_id
            )));
        }
        let authorized = !credentials.session_string.expose_secret().trim().is_empty();
        Ok(Arc::new(NullClient::new(authorized)))
    }
}

pub struct NullClient {
    authorized: bool,
    connected: AtomicBool,
}

impl NullClient {
    pub fn new(authorized: bool) -> Self {
        Self {
            authorized,
            connected: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl PlatformClient for NullClient {
    fn name(&self) -> &str {
        "null"
    }

    async fn connect(&self) -> Result<(), PlatformError> {
        self.connected.store(true, Ordering::Relaxed);
        tracing::debug!("null platform client connected");
        Ok(())
    }

    async fn is_authorized(&self) -> Result<bool, PlatformError> {
        Ok(self.authorized)
    }

    async fn messages(&self) -> Result<MessageStream, PlatformError> {
        if !self.connected.load(Ordering::Relaxed) {
            return Err(PlatformError::Closed);
        }
        Ok(Box::pin(stream::pending()))
    }

    async fn disconnect(&self) -> Result<(), PlatformError> {
        self.connected.store(false, Ordering::Relaxed);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn delivers_messages(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use futures::StreamExt;

    #[tokio::test]
    async fn connects_and_reports_authorized() {
        let client = NullConnector.build(&Credentials::new(123, "abcd1234", "xyz")).unwrap();
        assert!(!client.is_connected());
        client.connect().await.unwrap();
        assert!(client.is_connected());
        assert!(client.is_authorized().await.unwrap());
    }

    #[tokio::test]
    async fn blank_session_is_unauthorized() {
        let client = NullConnector.build(&Credentials::new(123, "abcd1234", "   ")).unwrap();
        client.connect().await.unwrap();
        assert!(!client.is_authorized().await.unwrap());
    }

    #[test]
    fn rejects_non_positive_api_id() {
        let err = NullConnector
            .build(&Credentials::new(-5, "abcd1234", "xyz"))
            .err()
            .unwrap();
        assert!(matches!(err, PlatformError::InvalidCredentials(_)));
    }

    #[tokio::test]
    async fn message_stream_stays_pending() {
        let client = NullClient::new(true);
        assert!(matches!(client.messages().await, Err(PlatformError::Closed)));

        client.connect().await.unwrap();
        let mut messages = client.messages().await.unwrap();
        assert!(messages.next().now_or_never().is_none());
    }

    #[test]
    fn advertises_itself_as_placeholder() {
        assert_eq!(NullConnector.name(), "null");
        let client = NullConnector.build(&Credentials::new(1, "hash", "xyz")).unwrap();
        assert!(!client.delivers_messages());
    }

    #[tokio::test]
    async fn disconnect_clears_flag() {
        let client = NullClient::new(true);
        client.connect().await.unwrap();
        client.disconnect().await.unwrap();
        assert!(!client.is_connected());
    }
}
