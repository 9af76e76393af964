//! Page-wide popup exclusivity
//!
//! At most one correction popup is open across all records. A check waits
//! until the open count is zero, then claims the gate; the returned guard
//! releases it when dropped, on every path.

use tokio::sync::watch;
use tracing::trace;

/// Open-popup counter shared by every record on a page
#[derive(Debug)]
pub struct PopupGate {
    open: watch::Sender<usize>,
}

impl PopupGate {
    pub fn new() -> Self {
        let (open, _) = watch::channel(0);
        Self { open }
    }

    /// Number of open popups (0 or 1)
    pub fn open_count(&self) -> usize {
        *self.open.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.open_count() > 0
    }

    /// Wait until no popup is open, then claim the gate
    pub async fn acquire(&self) -> PopupGuard<'_> {
        loop {
            let mut rx = self.open.subscribe();
            let _ = rx.wait_for(|open| *open == 0).await;
            if let Some(guard) = self.try_acquire() {
                return guard;
            }
        }
    }

    /// Claim the gate only if it is free right now
    pub fn try_acquire(&self) -> Option<PopupGuard<'_>> {
        let claimed = self.open.send_if_modified(|open| {
            if *open == 0 {
                *open = 1;
                true
            } else {
                false
            }
        });
        if claimed {
            trace!("Popup gate claimed");
        }
        claimed.then(|| PopupGuard { gate: self })
    }
}

impl Default for PopupGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Open popup; closes it when dropped
#[derive(Debug)]
pub struct PopupGuard<'a> {
    gate: &'a PopupGate,
}

impl Drop for PopupGuard<'_> {
    fn drop(&mut self) {
        self.gate.open.send_modify(|open| *open = open.saturating_sub(1));
        trace!("Popup gate released");
    }
}
