//! Graceful shutdown coordination via `CancellationToken`.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Default timeout for graceful shutdown before giving up on tasks.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Signals the listener and every open connection to stop.
///
/// Each connection holds a child of [`ShutdownCoordinator::token`], so a
/// single cancel closes them all and fires their close hooks.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Get a clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Initiate shutdown.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Cancel every connection, then wait up to `timeout` for `tasks`.
    ///
    /// Returns `false` if some task was still running at the deadline.
    pub async fn graceful_shutdown(
        &self,
        tasks: Vec<JoinHandle<()>>,
        timeout: Option<Duration>,
    ) -> bool {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);
        self.shutdown();
        info!(tasks = tasks.len(), ?timeout, "draining graphql-ws connections");

        match tokio::time::timeout(timeout, futures::future::join_all(tasks)).await {
            Ok(_) => true,
            Err(_) => {
                warn!(?timeout, "graceful shutdown deadline passed");
                false
            }
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_not_shutting_down() {
        assert!(!ShutdownCoordinator::new().token().is_cancelled());
    }

    #[test]
    fn shutdown_is_idempotent() {
        let coord = ShutdownCoordinator::default();
        coord.shutdown();
        coord.shutdown();
        assert!(coord.token().is_cancelled());
    }

    #[test]
    fn child_tokens_are_cancelled() {
        let coord = ShutdownCoordinator::new();
        let conn_a = coord.token().child_token();
        let conn_b = coord.token().child_token();
        coord.shutdown();
        assert!(conn_a.is_cancelled());
        assert!(conn_b.is_cancelled());
    }

    #[test]
    fn cancelling_child_leaves_parent_running() {
        let coord = ShutdownCoordinator::new();
        let conn = coord.token().child_token();
        conn.cancel();
        assert!(!coord.token().is_cancelled());
    }

    #[tokio::test]
    async fn graceful_shutdown_awaits_tasks() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        let handle = tokio::spawn(async move {
            token.cancelled().await;
        });
        assert!(coord.graceful_shutdown(vec![handle], None).await);
        assert!(coord.token().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn graceful_shutdown_times_out() {
        let coord = ShutdownCoordinator::new();
        let handle = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(300)).await;
        });
        let finished = coord
            .graceful_shutdown(vec![handle], Some(Duration::from_millis(100)))
            .await;
        assert!(!finished);
    }
}
