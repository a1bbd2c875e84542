use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use relay_core::errors::PlatformError;
use relay_core::platform::{IncomingMessage, MessageStream, PlatformClient, PlatformConnector};
use relay_core::security::Credentials;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Pre-programmed behavior for clients built by a [`MockConnector`].
#[derive(Clone, Debug, Default)]
pub enum MockBehavior {
    /// Connect, report authorized, deliver whatever tests push.
    #[default]
    Authorized,
    /// Connect, report the session as not logged in.
    Unauthorized,
    /// Fail in `build()` with this message.
    BuildFails(String),
    /// Fail in `connect()` with this message.
    ConnectFails(String),
    /// Fail in `disconnect()`; teardown must tolerate it.
    DisconnectFails,
    /// `disconnect()` never completes.
    DisconnectHangs,
    /// `connect()` never completes.
    Hang,
}

/// Connector that records every client it builds so tests can drive them.
#[derive(Default)]
pub struct MockConnector {
    behavior: Mutex<MockBehavior>,
    clients: Mutex<Vec<Arc<MockClient>>>,
}

impl MockConnector {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            clients: Mutex::new(Vec::new()),
        }
    }

    /// Behavior for clients built from now on.
    pub fn set_behavior(&self, behavior: MockBehavior) {
        *self.behavior.lock() = behavior;
    }

    pub fn clients(&self) -> Vec<Arc<MockClient>> {
        self.clients.lock().clone()
    }

    pub fn last_client(&self) -> Option<Arc<MockClient>> {
        self.clients.lock().last().cloned()
    }

    pub fn build_count(&self) -> usize {
        self.clients.lock().len()
    }
}

impl PlatformConnector for MockConnector {
    fn name(&self) -> &str {
        "mock"
    }

    fn build(&self, credentials: &Credentials) -> Result<Arc<dyn PlatformClient>, PlatformError> {
        let behavior = self.behavior.lock().clone();
        if let MockBehavior::BuildFails(msg) = &behavior {
            return Err(PlatformError::InvalidCredentials(msg.clone()));
        }
        let client = Arc::new(MockClient::new(credentials.api_id, behavior));
        self.clients.lock().push(Arc::clone(&client));
        Ok(client)
    }
}

pub struct MockClient {
    api_id: i64,
    behavior: MockBehavior,
    inbox_tx: mpsc::UnboundedSender<IncomingMessage>,
    inbox_rx: Mutex<Option<mpsc::UnboundedReceiver<IncomingMessage>>>,
    connected: AtomicBool,
    connect_calls: AtomicUsize,
    disconnect_calls: AtomicUsize,
}

impl MockClient {
    fn new(api_id: i64, behavior: MockBehavior) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        Self {
            api_id,
            behavior,
            inbox_tx,
            inbox_rx: Mutex::new(Some(inbox_rx)),
            connected: AtomicBool::new(false),
            connect_calls: AtomicUsize::new(0),
            disconnect_calls: AtomicUsize::new(0),
        }
    }

    pub fn api_id(&self) -> i64 {
        self.api_id
    }

    /// Push a message as if the platform had delivered it.
    pub fn deliver(&self, message: IncomingMessage) -> bool {
        self.inbox_tx.send(message).is_ok()
    }

    pub fn deliver_text(&self, text: &str) -> bool {
        self.deliver(IncomingMessage::text(777000, text))
    }

    pub fn connect_count(&self) -> usize {
        self.connect_calls.load(Ordering::Relaxed)
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnect_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl PlatformClient for MockClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn connect(&self) -> Result<(), PlatformError> {
        let _ = self.connect_calls.fetch_add(1, Ordering::Relaxed);
        match &self.behavior {
            MockBehavior::ConnectFails(msg) => Err(PlatformError::Connection(msg.clone())),
            MockBehavior::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
            _ => {
                self.connected.store(true, Ordering::Relaxed);
                Ok(())
            }
        }
    }

    async fn is_authorized(&self) -> Result<bool, PlatformError> {
        Ok(!matches!(self.behavior, MockBehavior::Unauthorized))
    }

    async fn messages(&self) -> Result<MessageStream, PlatformError> {
        let rx = self
            .inbox_rx
            .lock()
            .take()
            .ok_or_else(|| PlatformError::Protocol("message stream already taken".into()))?;
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    async fn disconnect(&self) -> Result<(), PlatformError> {
        let _ = self.disconnect_calls.fetch_add(1, Ordering::Relaxed);
        self.connected.store(false, Ordering::Relaxed);
        match self.behavior {
            MockBehavior::DisconnectFails => {
                Err(PlatformError::Connection("socket already closed".into()))
            }
            MockBehavior::DisconnectHangs => {
                std::future::pending::<()>().await;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}
