//! Run budget: wall-clock deadline plus a shutdown signal.
//!
//! Every wait in a campaign run goes through [`RunBudget::sleep`], so
//! either a deadline or a shutdown request stops the run at the next
//! wait point.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// Resolve once `shutdown` carries `true`. Never resolves if the sender
/// is gone without having signalled.
pub async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[derive(Debug, Clone)]
pub struct RunBudget {
    deadline: Option<Instant>,
    shutdown: watch::Receiver<bool>,
}

impl RunBudget {
    pub fn new(shutdown: watch::Receiver<bool>) -> Self {
        Self {
            deadline: None,
            shutdown,
        }
    }

    /// A budget that is never cancelled.
    pub fn unbounded() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self::new(rx)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_time_limit(self, limit: Duration) -> Self {
        self.with_deadline(Instant::now() + limit)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        *self.shutdown.borrow() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Resolve when the deadline passes or shutdown is requested.
    pub async fn cancelled(&self) {
        let mut shutdown = self.shutdown.clone();
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = shutdown_requested(&mut shutdown) => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => shutdown_requested(&mut shutdown).await,
        }
    }

    /// Sleep for `duration` unless cancelled first. Returns `true` if the
    /// full duration elapsed.
    pub async fn sleep(&self, duration: Duration) -> bool {
        if self.is_cancelled() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => !self.is_cancelled(),
            _ = self.cancelled() => false,
        }
    }
}
