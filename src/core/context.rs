//! Cancellation and deadline carrier
//!
//! Every mapper entry point takes a [`Context`]. Executors race the in-flight
//! statement against [`Context::done`] and abort it when the context is cancelled
//! or its deadline passes.

use super::error::{DatabaseError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Cancellation-carrying context passed to every call
///
/// Clones share the same cancellation state, so cancelling any clone cancels all
/// of them.
#[derive(Debug, Clone, Default)]
pub struct Context {
    state: Arc<CancelState>,
    deadline: Option<Instant>,
    timeout: Duration,
}

impl Context {
    /// A context that is never cancelled and has no deadline
    pub fn background() -> Self {
        Self::default()
    }

    /// Derive a context that also expires after `timeout`
    ///
    /// The earlier of the existing deadline and the new one wins.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        match self.deadline {
            Some(existing) if existing < deadline => self.clone(),
            _ => Self {
                state: Arc::clone(&self.state),
                deadline: Some(deadline),
                timeout,
            },
        }
    }

    /// Cancel this context and every clone of it
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::Release);
        self.state.notify.notify_waiters();
    }

    /// Check whether the context has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }

    /// Deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, if any
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Return the error this context would end a call with, if it is already done
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(DatabaseError::Cancelled);
        }
        match self.remaining() {
            Some(left) if left.is_zero() => Err(self.timeout_error()),
            _ => Ok(()),
        }
    }

    /// Resolve once the context is cancelled or its deadline passes
    ///
    /// The returned error describes why the context ended.
    pub async fn done(&self) -> DatabaseError {
        let notified = self.state.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if self.is_cancelled() {
            return DatabaseError::Cancelled;
        }

        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = &mut notified => DatabaseError::Cancelled,
                _ = tokio::time::sleep_until(deadline) => self.timeout_error(),
            },
            None => {
                notified.await;
                DatabaseError::Cancelled
            }
        }
    }

    fn timeout_error(&self) -> DatabaseError {
        DatabaseError::query_timeout(self.timeout.as_millis() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_background_is_never_done() {
        let ctx = Context::background();
        assert!(ctx.check().is_ok());
        let done = tokio::time::timeout(Duration::from_millis(20), ctx.done()).await;
        assert!(done.is_err());
    }

    #[tokio::test]
    async fn test_cancel_wakes_waiters() {
        let ctx = Context::background();
        let waiter = ctx.clone();
        let handle = tokio::spawn(async move { waiter.done().await });

        tokio::time::sleep(Duration::from_millis(5)).await;
        ctx.cancel();

        let err = handle.await.unwrap();
        assert!(matches!(err, DatabaseError::Cancelled));
        assert!(matches!(ctx.check(), Err(DatabaseError::Cancelled)));
    }

    #[tokio::test]
    async fn test_deadline_expires() {
        let ctx = Context::background().with_timeout(Duration::from_millis(5));
        let err = ctx.done().await;
        assert!(matches!(err, DatabaseError::QueryTimeout { .. }));
        assert!(matches!(ctx.check(), Err(DatabaseError::QueryTimeout { .. })));
    }

    #[test]
    fn test_earlier_deadline_wins() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        rt.block_on(async {
            let short = Context::background().with_timeout(Duration::from_millis(10));
            let long = short.with_timeout(Duration::from_secs(60));
            assert_eq!(short.deadline(), long.deadline());
        });
    }
}
