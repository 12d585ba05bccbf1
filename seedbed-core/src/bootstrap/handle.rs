//! The process-wide database handle and its lifecycle.

use sqlx::PgPool;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tracing::{debug, error, info};

use super::database::DatabaseTarget;
use crate::{Error, Result};

/// Lifecycle of a [`DatabaseHandle`].
///
/// `Uninitialized -> Connecting -> Ready -> ShuttingDown -> Closed`. A failed
/// connect jumps straight to `Closed` and the handle is never handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HandleState {
    Uninitialized = 0,
    Connecting = 1,
    Ready = 2,
    ShuttingDown = 3,
    Closed = 4,
}

impl HandleState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Uninitialized,
            1 => Self::Connecting,
            2 => Self::Ready,
            3 => Self::ShuttingDown,
            _ => Self::Closed,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::ShuttingDown => "shutting_down",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for HandleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What asked for the shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGINT / Ctrl+C
    Interrupt,
    /// SIGTERM
    Terminate,
    /// Normal end of the process
    Exit,
}

impl ShutdownSignal {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
            Self::Exit => "exit",
        }
    }
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// This call closed the pool
    Released,
    /// Another call got there first; nothing was done
    AlreadyReleased,
}

/// Owns the connection pool for the life of the process.
///
/// Not `Clone`: the composition root wraps it in an `Arc` and passes that
/// around, so there is only ever one pool per handle.
pub struct DatabaseHandle {
    pool: PgPool,
    state: AtomicU8,
    target: DatabaseTarget,
    probe_timeout: Duration,
    shutdown_timeout: Duration,
}

impl DatabaseHandle {
    pub(crate) const fn new(
        pool: PgPool,
        target: DatabaseTarget,
        probe_timeout: Duration,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            pool,
            state: AtomicU8::new(HandleState::Uninitialized as u8),
            target,
            probe_timeout,
            shutdown_timeout,
        }
    }

    /// Adopt a pool built elsewhere as a `Ready` handle, skipping the probe.
    #[must_use]
    pub fn from_pool(pool: PgPool, probe_timeout: Duration, shutdown_timeout: Duration) -> Self {
        let handle = Self::new(pool, DatabaseTarget::default(), probe_timeout, shutdown_timeout);
        handle.state.store(HandleState::Ready as u8, Ordering::Release);
        handle
    }

    /// Pool for query execution
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    #[must_use]
    pub fn state(&self) -> HandleState {
        HandleState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[must_use]
    pub const fn target(&self) -> &DatabaseTarget {
        &self.target
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state() == HandleState::Ready
    }

    pub(crate) fn advance(&self, from: HandleState, to: HandleState) -> bool {
        let moved = self
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if moved {
            debug!(from = %from, to = %to, "Database handle state changed");
        }
        moved
    }

    /// Close the pool after a failed connect.
    pub(crate) async fn abandon(&self) {
        self.state.store(HandleState::Closed as u8, Ordering::Release);
        self.pool.close().await;
    }

    /// Run `SELECT 1` bounded by the probe timeout.
    pub(crate) async fn probe(&self) -> Result<()> {
        let query = sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(&self.pool);

        match tokio::time::timeout(self.probe_timeout, query).await {
            Ok(Ok(1)) => Ok(()),
            Ok(Ok(other)) => Err(Error::Connection(format!(
                "Probe returned unexpected value {other}"
            ))),
            Ok(Err(sqlx::Error::PoolTimedOut)) => Err(Error::Connection(format!(
                "Could not open a connection to {} within {}ms",
                self.target,
                self.probe_timeout.as_millis()
            ))),
            Ok(Err(e)) => Err(Error::Connection(e.to_string())),
            Err(_) => Err(Error::Connection(format!(
                "Probe timed out after {}ms",
                self.probe_timeout.as_millis()
            ))),
        }
    }

    /// Check that the database still answers.
    ///
    /// Never fails: problems are logged and reported as `false`. A handle
    /// that is shutting down or closed reports `false` without touching
    /// the pool.
    pub async fn health_check(&self) -> bool {
        let state = self.state();
        if state != HandleState::Ready {
            debug!(state = %state, "Skipping health check, handle is not ready");
            return false;
        }

        match self.probe().await {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, target_db = %self.target, "Database health check failed");
                false
            }
        }
    }

    /// Release the pool exactly once.
    ///
    /// Safe to call from several signal handlers at the same time: the first
    /// caller moves `Ready -> ShuttingDown` and closes the pool, every other
    /// caller returns [`ShutdownOutcome::AlreadyReleased`] straight away.
    /// A close that outlives the shutdown timeout still ends in `Closed` but
    /// returns [`Error::Shutdown`].
    pub async fn shutdown(&self, signal: ShutdownSignal) -> Result<ShutdownOutcome> {
        if !self.advance(HandleState::Ready, HandleState::ShuttingDown) {
            debug!(signal = %signal, state = %self.state(), "Shutdown already handled, ignoring");
            return Ok(ShutdownOutcome::AlreadyReleased);
        }

        info!(signal = %signal, "Closing database connection pool...");
        let closed = tokio::time::timeout(self.shutdown_timeout, self.pool.close()).await;
        self.state.store(HandleState::Closed as u8, Ordering::Release);

        match closed {
            Ok(()) => {
                info!(signal = %signal, "Database pool closed");
                Ok(ShutdownOutcome::Released)
            }
            Err(_) => {
                error!(
                    signal = %signal,
                    timeout_secs = self.shutdown_timeout.as_secs(),
                    "Timed out closing database pool"
                );
                Err(Error::Shutdown(format!(
                    "pool did not close within {}s",
                    self.shutdown_timeout.as_secs()
                )))
            }
        }
    }
}

impl fmt::Debug for DatabaseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseHandle")
            .field("state", &self.state())
            .field("target", &self.target)
            .field("pool_size", &self.pool.size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{live_handle, unreachable_pool};
    use std::sync::Arc;

    #[test]
    fn test_state_round_trips_through_u8() {
        for state in [
            HandleState::Uninitialized,
            HandleState::Connecting,
            HandleState::Ready,
            HandleState::ShuttingDown,
            HandleState::Closed,
        ] {
            assert_eq!(HandleState::from_u8(state as u8), state);
        }
    }

    #[tokio::test]
    async fn test_advance_only_from_expected_state() {
        let handle = DatabaseHandle::new(
            unreachable_pool(),
            DatabaseTarget::default(),
            Duration::from_millis(200),
            Duration::from_secs(1),
        );

        assert_eq!(handle.state(), HandleState::Uninitialized);
        assert!(!handle.advance(HandleState::Connecting, HandleState::Ready));
        assert!(handle.advance(HandleState::Uninitialized, HandleState::Connecting));
        assert!(handle.advance(HandleState::Connecting, HandleState::Ready));
        assert!(handle.is_ready());
    }

    #[tokio::test]
    async fn test_shutdown_releases_once() {
        let handle = DatabaseHandle::from_pool(
            unreachable_pool(),
            Duration::from_millis(200),
            Duration::from_secs(1),
        );

        let first = handle.shutdown(ShutdownSignal::Interrupt).await.unwrap();
        let second = handle.shutdown(ShutdownSignal::Exit).await.unwrap();

        assert_eq!(first, ShutdownOutcome::Released);
        assert_eq!(second, ShutdownOutcome::AlreadyReleased);
        assert_eq!(handle.state(), HandleState::Closed);
        assert!(handle.pool().is_closed());
    }

    #[tokio::test]
    async fn test_racing_shutdowns_collapse() {
        let handle = Arc::new(DatabaseHandle::from_pool(
            unreachable_pool(),
            Duration::from_millis(200),
            Duration::from_secs(1),
        ));

        let signals = [
            ShutdownSignal::Interrupt,
            ShutdownSignal::Terminate,
            ShutdownSignal::Exit,
            ShutdownSignal::Terminate,
        ];
        let tasks: Vec<_> = signals
            .into_iter()
            .map(|signal| {
                let handle = handle.clone();
                tokio::spawn(async move { handle.shutdown(signal).await })
            })
            .collect();

        let mut released = 0;
        for task in tasks {
            match task.await.unwrap().unwrap() {
                ShutdownOutcome::Released => released += 1,
                ShutdownOutcome::AlreadyReleased => {}
            }
        }

        assert_eq!(released, 1);
        assert_eq!(handle.state(), HandleState::Closed);
    }

    #[tokio::test]
    async fn test_health_check_false_when_unreachable() {
        let handle = DatabaseHandle::from_pool(
            unreachable_pool(),
            Duration::from_millis(300),
            Duration::from_secs(1),
        );

        assert!(!handle.health_check().await);
        // A failed probe does not change the lifecycle
        assert_eq!(handle.state(), HandleState::Ready);
    }

    #[tokio::test]
    async fn test_health_check_false_after_shutdown() {
        let handle = DatabaseHandle::from_pool(
            unreachable_pool(),
            Duration::from_millis(300),
            Duration::from_secs(1),
        );
        handle.shutdown(ShutdownSignal::Terminate).await.unwrap();

        assert!(!handle.health_check().await);
    }

    #[tokio::test]
    #[ignore = "Requires database"]
    async fn test_health_check_tracks_live_database() {
        let handle = live_handle().await;

        assert_eq!(handle.state(), HandleState::Ready);
        assert!(handle.health_check().await);

        assert_eq!(
            handle.shutdown(ShutdownSignal::Exit).await.unwrap(),
            ShutdownOutcome::Released
        );
        assert!(handle.pool().is_closed());
        assert!(!handle.health_check().await);
    }

    #[test]
    fn test_signal_names() {
        assert_eq!(ShutdownSignal::Interrupt.to_string(), "SIGINT");
        assert_eq!(ShutdownSignal::Terminate.to_string(), "SIGTERM");
        assert_eq!(ShutdownSignal::Exit.to_string(), "exit");
    }
}
