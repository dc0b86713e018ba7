//! Stopping the listener and draining live sessions.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::hub::Hub;

/// How often the drain re-checks the live connection count.
const DRAIN_POLL: Duration = Duration::from_millis(20);

/// What was left when [`ShutdownCoordinator::drain`] returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrainReport {
    /// Listener stopped and every session tore down within the grace period.
    pub completed: bool,
    /// Connections still tracked by the hub.
    pub lingering: usize,
}

/// Owns the token every session and the listener watch.
#[derive(Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Token handed to the listener and each session.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Tell the listener and sessions to stop. Idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Stop everything, then wait up to `grace` for the listener task to
    /// exit and for the hub to have no connections left.
    pub async fn drain(&self, hub: &Hub, listener: JoinHandle<()>, grace: Duration) -> DrainReport {
        self.shutdown();
        info!(
            connections = hub.connection_count(),
            grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
            "draining sessions"
        );

        let settle = async {
            if let Err(e) = listener.await {
                warn!(error = %e, "listener task ended abnormally");
            }
            let mut poll = tokio::time::interval(DRAIN_POLL);
            while hub.connection_count() > 0 {
                let _ = poll.tick().await;
            }
        };
        let completed = tokio::time::timeout(grace, settle).await.is_ok();
        let lingering = hub.connection_count();
        if completed {
            info!("all sessions drained");
        } else {
            warn!(lingering, "grace period elapsed with sessions still open");
        }
        DrainReport {
            completed,
            lingering,
        }
    }
}

/// Resolve on Ctrl-C, or never if the handler cannot be installed.
pub async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("ctrl-c received, shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{make_connection, make_hub};

    #[test]
    fn shutdown_cancels_every_token() {
        let coord = ShutdownCoordinator::new();
        let listener = coord.token();
        let session = coord.token();
        coord.shutdown();
        coord.shutdown();
        assert!(listener.is_cancelled());
        assert!(session.is_cancelled());
    }

    #[tokio::test]
    async fn drain_completes_when_sessions_leave() {
        let coord = ShutdownCoordinator::new();
        let hub = std::sync::Arc::new(make_hub());
        let (conn, _rx) = make_connection("c1", "chat");
        assert!(hub.track(&conn));

        // Stand-in session: leaves the hub once the token fires.
        let token = coord.token();
        let session_hub = hub.clone();
        let listener = tokio::spawn(async move {
            token.cancelled().await;
            let _ = session_hub.untrack(&conn);
        });

        let report = coord.drain(&hub, listener, Duration::from_secs(5)).await;
        assert_eq!(
            report,
            DrainReport {
                completed: true,
                lingering: 0
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn drain_reports_sessions_left_after_grace() {
        let coord = ShutdownCoordinator::new();
        let hub = make_hub();
        let (conn, _rx) = make_connection("c1", "chat");
        assert!(hub.track(&conn));
        let listener = tokio::spawn(async {});

        let report = coord.drain(&hub, listener, Duration::from_millis(100)).await;
        assert!(!report.completed);
        assert_eq!(report.lingering, 1);
    }
}
