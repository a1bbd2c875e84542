use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;

use crate::errors::PlatformError;
use crate::security::Credentials;

/// A message delivered to the connected account.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IncomingMessage {
    pub chat_id: i64,
    pub text: Option<String>,
    /// Sent by the account itself rather than received.
    pub outgoing: bool,
}

impl IncomingMessage {
    pub fn text(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: Some(text.into()),
            outgoing: false,
        }
    }
}

pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// A live connection to the messaging platform for one account.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    fn name(&self) -> &str;

    /// Open the transport and resume the session.
    async fn connect(&self) -> Result<(), PlatformError>;

    /// Whether the resumed session belongs to a logged-in account.
    async fn is_authorized(&self) -> Result<bool, PlatformError>;

    /// Incoming messages until the connection ends.
    async fn messages(&self) -> Result<MessageStream, PlatformError>;

    async fn disconnect(&self) -> Result<(), PlatformError>;

    fn is_connected(&self) -> bool;

    /// False for placeholder backends that never produce messages.
    fn delivers_messages(&self) -> bool {
        true
    }
}

/// Builds platform clients from submitted credentials.
///
/// `build` must not touch the network; connecting happens later in the
/// session's background task.
pub trait PlatformConnector: Send + Sync {
    fn name(&self) -> &str;

    fn build(&self, credentials: &Credentials) -> Result<Arc<dyn PlatformClient>, PlatformError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_message_is_incoming() {
        let msg = IncomingMessage::text(777000, "Login code: 12345");
        assert_eq!(msg.chat_id, 777000);
        assert_eq!(msg.text.as_deref(), Some("Login code: 12345"));
        assert!(!msg.outgoing);
    }

    #[test]
    fn default_message_has_no_text() {
        let msg = IncomingMessage::default();
        assert!(msg.text.is_none());
    }
}
