//! Session registry: one supervised platform connection per browser connection.
//!
//! Each [`SessionEntry`] owns the platform client built from the submitted
//! credentials and the task that connects it, checks authorization and
//! watches its messages for OTPs. Intake and teardown for one connection id
//! are serialized by that id's lock, so an id never has two live platform
//! clients and a slow teardown only holds up its own connection. Lookups go
//! straight to the map.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::StreamExt;
use parking_lot::Mutex;
use relay_core::ids::{ConnectionId, SessionId};
use relay_core::otp::OtpMatcher;
use relay_core::platform::{PlatformClient, PlatformConnector};
use relay_core::security::Credentials;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::RelayError;
use crate::relay::EventRelay;

pub const STATUS_CONNECTING: &str = "Credentials received. Connecting to Telegram...";
pub const STATUS_LISTENING: &str = "Telegram client connected. Listening for OTPs.";
pub const STATUS_NEEDS_REAUTH: &str =
    "Telegram session is not authorized. Please re-authorize and submit a new session string.";
pub const STATUS_CLOSED: &str = "Telegram connection closed.";
pub const STATUS_NO_BACKEND: &str =
    "Credentials accepted, but this server has no Telegram backend configured. OTPs will not be relayed.";

/// The task driving one platform client.
struct SessionTask {
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SessionTask {
    fn is_finished(&self) -> bool {
        self.handle.lock().as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Request cancellation and wait for the task to end, aborting it after `timeout`.
    async fn stop(&self, timeout: Duration) -> bool {
        self.cancel.cancel();
        let handle = self.handle.lock().take();
        let Some(mut handle) = handle else {
            return true;
        };
        if tokio::time::timeout(timeout, &mut handle).await.is_ok() {
            true
        } else {
            handle.abort();
            false
        }
    }
}

pub struct SessionEntry {
    pub id: SessionId,
    pub connection_id: ConnectionId,
    pub credentials: Credentials,
    pub client: Arc<dyn PlatformClient>,
    pub created_at: DateTime<Utc>,
    task: SessionTask,
}

impl SessionEntry {
    /// Whether the platform client reports a live connection.
    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl std::fmt::Debug for SessionEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEntry")
            .field("id", &self.id)
            .field("connection_id", &self.connection_id)
            .field("credentials", &self.credentials)
            .field("client", &self.client.name())
            .field("created_at", &self.created_at)
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub teardown_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            teardown_timeout: Duration::from_secs(5),
        }
    }
}

pub struct SessionManager {
    connector: Arc<dyn PlatformConnector>,
    relay: EventRelay,
    matcher: Arc<OtpMatcher>,
    config: SessionConfig,
    entries: DashMap<ConnectionId, Arc<SessionEntry>>,
    locks: DashMap<ConnectionId, Arc<tokio::sync::Mutex<()>>>,
}

impl SessionManager {
    pub fn new(
        connector: Arc<dyn PlatformConnector>,
        relay: EventRelay,
        matcher: OtpMatcher,
        config: SessionConfig,
    ) -> Self {
        Self {
            connector,
            relay,
            matcher: Arc::new(matcher),
            config,
            entries: DashMap::new(),
            locks: DashMap::new(),
        }
    }

    /// Name of the platform backend sessions are built with.
    pub fn platform(&self) -> &str {
        self.connector.name()
    }

    fn key_lock(&self, connection_id: &ConnectionId) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(self.locks.entry(connection_id.clone()).or_default().value())
    }

    /// Drop the id's lock once nobody else holds or waits on it.
    fn release_key_lock(&self, connection_id: &ConnectionId) {
        let _ = self
            .locks
            .remove_if(connection_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Replace whatever session `connection_id` had with one for `credentials`.
    ///
    /// Returns once the new client is built and its task spawned; the
    /// connect/authorize outcome is reported to the connection as status events.
    /// Fails with `UnknownConnection` unless `connection_id` is an open browser
    /// connection, since only its disconnect hook ever removes the entry.
    pub async fn submit(
        &self,
        connection_id: ConnectionId,
        credentials: Credentials,
    ) -> Result<SessionId, RelayError> {
        let lock = self.key_lock(&connection_id);
        let result = {
            let _guard = lock.lock().await;
            self.submit_locked(connection_id.clone(), credentials).await
        };
        drop(lock);
        self.release_key_lock(&connection_id);
        result
    }

    async fn submit_locked(
        &self,
        connection_id: ConnectionId,
        credentials: Credentials,
    ) -> Result<SessionId, RelayError> {
        if !self.relay.is_connected(&connection_id) {
            tracing::warn!(connection_id = %connection_id, "Credentials for unknown or closed connection");
            return Err(RelayError::UnknownConnection(connection_id));
        }

        if let Some(previous) = self.get(&connection_id) {
            tracing::info!(
                connection_id = %connection_id,
                session_id = %previous.id,
                "Replacing existing session"
            );
            self.teardown(&previous).await;
            let _ = self
                .entries
                .remove_if(&connection_id, |_, e| e.id == previous.id);
        }

        let client = self.connector.build(&credentials).map_err(|e| {
            tracing::error!(connection_id = %connection_id, error = %e, "Error initializing Telegram client");
            RelayError::ExternalSetup(e.to_string())
        })?;

        let id = SessionId::new();
        let cancel = CancellationToken::new();

        let _ = self.relay.status(&connection_id, STATUS_CONNECTING);
        let handle = tokio::spawn(run_session(
            Arc::clone(&client),
            connection_id.clone(),
            self.relay.clone(),
            Arc::clone(&self.matcher),
            cancel.clone(),
        ));

        let entry = SessionEntry {
            id: id.clone(),
            connection_id: connection_id.clone(),
            credentials,
            client,
            created_at: Utc::now(),
            task: SessionTask {
                cancel,
                handle: Mutex::new(Some(handle)),
            },
        };
        tracing::info!(
            connection_id = %connection_id,
            session_id = %id,
            api_id = entry.credentials.api_id,
            "Session started"
        );
        let _ = self.entries.insert(connection_id, Arc::new(entry));
        Ok(id)
    }

    /// Tear down and remove the session for `connection_id`, if any.
    pub async fn close(&self, connection_id: &ConnectionId) -> bool {
        let lock = self.key_lock(connection_id);
        let removed = {
            let _guard = lock.lock().await;
            self.close_locked(connection_id).await
        };
        drop(lock);
        self.release_key_lock(connection_id);
        removed
    }

    async fn close_locked(&self, connection_id: &ConnectionId) -> bool {
        let Some(entry) = self.get(connection_id) else {
            return false;
        };
        self.teardown(&entry).await;
        let removed = self
            .entries
            .remove_if(connection_id, |_, e| e.id == entry.id)
            .is_some();
        tracing::info!(connection_id = %connection_id, session_id = %entry.id, "Session closed");
        removed
    }

    /// Close every session concurrently. Used on process shutdown.
    pub async fn close_all(&self) -> usize {
        let ids: Vec<ConnectionId> = self.entries.iter().map(|e| e.key().clone()).collect();
        futures::future::join_all(ids.iter().map(|id| self.close(id)))
            .await
            .into_iter()
            .filter(|closed| *closed)
            .count()
    }

    pub fn get(&self, connection_id: &ConnectionId) -> Option<Arc<SessionEntry>> {
        self.entries.get(connection_id).map(|e| Arc::clone(e.value()))
    }

    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.entries.contains_key(connection_id)
    }

    /// An entry exists and its platform client is connected to a backend
    /// that delivers messages.
    pub fn is_active(&self, connection_id: &ConnectionId) -> bool {
        self.get(connection_id)
            .is_some_and(|e| e.is_connected() && e.client.delivers_messages())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Best-effort: disconnect errors are logged, never returned.
    async fn teardown(&self, entry: &SessionEntry) {
        let timeout = self.config.teardown_timeout;
        let outcome = match tokio::time::timeout(timeout, entry.client.disconnect()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(RelayError::Teardown(e.to_string())),
            Err(_) => Err(RelayError::Teardown(format!("disconnect timed out after {timeout:?}"))),
        };
        if let Err(e) = outcome {
            tracing::warn!(
                connection_id = %entry.connection_id,
                session_id = %entry.id,
                error = %e,
                "Error disconnecting Telegram client"
            );
        }

        if !entry.task.stop(timeout).await {
            tracing::warn!(
                connection_id = %entry.connection_id,
                session_id = %entry.id,
                "Session task did not stop in time, aborted"
            );
        }
    }
}

async fn run_session(
    client: Arc<dyn PlatformClient>,
    target: ConnectionId,
    relay: EventRelay,
    matcher: Arc<OtpMatcher>,
    cancel: CancellationToken,
) {
    tokio::select! {
        () = cancel.cancelled() => {
            tracing::debug!(connection_id = %target, "Session task cancelled");
        }
        outcome = watch(client.as_ref(), &target, &relay, &matcher) => {
            let message = match outcome {
                Ok(()) => STATUS_CLOSED.to_string(),
                Err(RelayError::Authorization(detail)) => {
                    tracing::warn!(connection_id = %target, detail = %detail, "Telegram session not authorized");
                    STATUS_NEEDS_REAUTH.to_string()
                }
                Err(e) => {
                    tracing::warn!(connection_id = %target, error = %e, kind = e.error_kind(), "Session ended with error");
                    e.to_string()
                }
            };
            let _ = relay.status(&target, message);
        }
    }
}

/// Connect, verify authorization, then forward every incoming OTP message.
async fn watch(
    client: &dyn PlatformClient,
    target: &ConnectionId,
    relay: &EventRelay,
    matcher: &OtpMatcher,
) -> Result<(), RelayError> {
    client.connect().await?;
    if !client.is_authorized().await? {
        return Err(RelayError::Authorization("session string is not logged in".into()));
    }

    if client.delivers_messages() {
        tracing::info!(connection_id = %target, client = client.name(), "Listening for OTPs");
        let _ = relay.status(target, STATUS_LISTENING);
    } else {
        tracing::warn!(connection_id = %target, client = client.name(), "No platform backend, OTPs will not be relayed");
        let _ = relay.status(target, STATUS_NO_BACKEND);
    }

    let mut messages = client.messages().await?;
    while let Some(message) = messages.next().await {
        if let Some(otp) = matcher.extract(&message) {
            tracing::info!(connection_id = %target, chat_id = message.chat_id, "Detected potential OTP");
            let _ = relay.otp(target, otp);
        }
    }
    Ok(())
}
