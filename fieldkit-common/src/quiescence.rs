//! Quiescence counter
//!
//! Shared busy counter for asynchronous field work. Every asynchronous
//! mutation increments before it starts and decrements when it completes
//! (including on error paths, see [`BusyGuard`]). Readers that need a
//! consistent snapshot of a record wait for the counter to reach zero.
//!
//! This is a cooperative synchronization point, not a lock: it never prevents
//! concurrent mutation.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::warn;

use crate::{Error, Result};

/// Page-wide busy counter
///
/// Cloning yields another handle to the same counter.
#[derive(Clone)]
pub struct QuiescenceCounter {
    tx: Arc<watch::Sender<usize>>,
}

impl QuiescenceCounter {
    /// Create a counter at zero
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0usize);
        Self { tx: Arc::new(tx) }
    }

    /// Mark one more operation in flight
    pub fn increment(&self) {
        self.tx.send_modify(|count| *count += 1);
    }

    /// Mark one operation as settled
    ///
    /// Unmatched decrements saturate at zero and are logged.
    pub fn decrement(&self) {
        self.tx.send_modify(|count| {
            if *count == 0 {
                warn!("Quiescence counter decremented below zero");
            }
            *count = count.saturating_sub(1);
        });
    }

    /// Number of operations currently in flight
    pub fn count(&self) -> usize {
        *self.tx.borrow()
    }

    /// True when nothing is in flight
    pub fn is_quiet(&self) -> bool {
        self.count() == 0
    }

    /// Increment and return a guard that decrements on drop
    pub fn enter(&self) -> BusyGuard {
        self.increment();
        BusyGuard {
            counter: self.clone(),
        }
    }

    /// Resolve once the counter is exactly zero
    ///
    /// After each observed zero the task yields once and checks again, so work
    /// scheduled by whatever just settled is waited for as well.
    pub async fn wait_until_quiet(&self) {
        let mut rx = self.tx.subscribe();
        loop {
            if rx.wait_for(|count| *count == 0).await.is_err() {
                return;
            }
            tokio::task::yield_now().await;
            if self.is_quiet() {
                return;
            }
        }
    }

    /// [`wait_until_quiet`](Self::wait_until_quiet) bounded by a timeout
    pub async fn wait_until_quiet_for(&self, limit: Duration) -> Result<()> {
        tokio::time::timeout(limit, self.wait_until_quiet())
            .await
            .map_err(|_| {
                Error::Timeout(format!(
                    "still {} operation(s) in flight after {:?}",
                    self.count(),
                    limit
                ))
            })
    }
}

impl Default for QuiescenceCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for QuiescenceCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuiescenceCounter")
            .field("count", &self.count())
            .finish()
    }
}

/// Decrements the owning counter when dropped
#[must_use = "dropping the guard immediately marks the operation as settled"]
pub struct BusyGuard {
    counter: QuiescenceCounter,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.counter.decrement();
    }
}
