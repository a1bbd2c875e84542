//! Process shutdown: stop intake, close every platform session, then drain
//! the server's background tasks.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::sessions::SessionManager;

const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// What a shutdown actually did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub sessions_closed: usize,
    pub tasks_drained: usize,
    pub tasks_aborted: usize,
}

/// Owns the root cancellation token shared by the listener, socket handlers
/// and background tasks.
#[derive(Clone, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel the token, close all sessions, then give `tasks` up to
    /// `timeout` to finish before aborting the rest.
    ///
    /// Sessions are closed before the drain so that platform clients are
    /// disconnected even when a task has to be aborted.
    pub async fn run(
        &self,
        sessions: &SessionManager,
        tasks: Vec<JoinHandle<()>>,
        timeout: Option<Duration>,
    ) -> ShutdownReport {
        let timeout = timeout.unwrap_or(DEFAULT_DRAIN_TIMEOUT);
        self.token.cancel();

        let sessions_closed = sessions.close_all().await;
        info!(sessions_closed, "Platform sessions closed");

        let task_count = tasks.len();
        let aborts: Vec<_> = tasks.iter().map(JoinHandle::abort_handle).collect();
        let mut tasks_aborted = 0;
        if tokio::time::timeout(timeout, futures::future::join_all(tasks))
            .await
            .is_err()
        {
            for abort in aborts.iter().filter(|a| !a.is_finished()) {
                abort.abort();
                tasks_aborted += 1;
            }
            warn!(tasks_aborted, "Tasks did not drain within {timeout:?}, aborted");
        }

        let report = ShutdownReport {
            sessions_closed,
            tasks_drained: task_count - tasks_aborted,
            tasks_aborted,
        };
        info!(?report, "Shutdown complete");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use relay_core::otp::OtpMatcher;
    use relay_core::security::Credentials;
    use relay_platform::mock::MockConnector;

    use crate::client::ClientRegistry;
    use crate::relay::EventRelay;
    use crate::sessions::SessionConfig;

    fn sessions() -> (Arc<MockConnector>, Arc<ClientRegistry>, SessionManager) {
        let connector = Arc::new(MockConnector::default());
        let registry = Arc::new(ClientRegistry::new(32, Duration::from_secs(90)));
        let sessions = SessionManager::new(
            Arc::clone(&connector) as _,
            EventRelay::new(Arc::clone(&registry)),
            OtpMatcher::default(),
            SessionConfig::default(),
        );
        (connector, registry, sessions)
    }

    #[tokio::test]
    async fn closes_sessions_and_drains_cooperative_tasks() {
        let (connector, registry, sessions) = sessions();
        let (cid, _rx) = registry.register();
        let _ = sessions
            .submit(cid, Credentials::new(1, "hash", "session"))
            .await
            .unwrap();

        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        let task = tokio::spawn(async move { token.cancelled().await });

        let report = coord.run(&sessions, vec![task], None).await;

        assert!(coord.is_shutting_down());
        assert_eq!(
            report,
            ShutdownReport {
                sessions_closed: 1,
                tasks_drained: 1,
                tasks_aborted: 0,
            }
        );
        assert!(sessions.is_empty());
        assert_eq!(connector.last_client().unwrap().disconnect_count(), 1);
    }

    #[tokio::test]
    async fn aborts_tasks_that_ignore_cancellation() {
        let (_connector, _registry, sessions) = sessions();
        let coord = ShutdownCoordinator::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let stubborn = tokio::spawn(async move {
            let _tx = tx;
            tokio::time::sleep(Duration::from_secs(300)).await;
        });
        let token = coord.token();
        let polite = tokio::spawn(async move { token.cancelled().await });

        let report = coord
            .run(&sessions, vec![stubborn, polite], Some(Duration::from_millis(50)))
            .await;

        assert_eq!(report.sessions_closed, 0);
        assert_eq!(report.tasks_drained, 1);
        assert_eq!(report.tasks_aborted, 1);
        // The aborted task drops its sender.
        assert!(rx.await.is_err());
    }

    #[test]
    fn tokens_share_cancellation() {
        let coord = ShutdownCoordinator::new();
        let token = coord.clone().token();
        assert!(!coord.is_shutting_down());
        coord.token.cancel();
        assert!(token.is_cancelled());
    }
}
