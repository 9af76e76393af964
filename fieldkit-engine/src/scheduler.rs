//! Submit-time check ordering
//!
//! Records taking part in a check are queued in a [`ProcessQueue`]. A record
//! runs its check once it is first among queued records of its own level;
//! records of different levels do not wait for each other. Concurrent runs
//! for the same record share one entry; it is removed when the last of them
//! finishes (or is cancelled), waking the next record.

use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tracing::trace;

use fieldkit_common::process_queue::{Placement, ProcessQueue};

use crate::lock;
use crate::record::{Record, RecordId};

/// Queued record and the number of runs holding its entry
#[derive(Debug)]
struct Queued {
    record: Arc<Record>,
    holders: usize,
}

/// Orders checks across the records of one page
#[derive(Debug, Default)]
pub struct SubmitScheduler {
    queue: Mutex<ProcessQueue<RecordId, Queued>>,
    turn_changed: Notify,
}

impl SubmitScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued records
    pub fn len(&self) -> usize {
        lock(&self.queue).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.queue).is_empty()
    }

    /// Queued record ids in processing order
    pub fn queued(&self) -> Vec<RecordId> {
        lock(&self.queue).keys().copied().collect()
    }

    /// Queue `record`, wait for its turn, run `task`, leave the queue
    ///
    /// A record already queued keeps its position and the entry stays until
    /// every run holding it has finished.
    pub async fn run_in_turn<F, Fut, T>(&self, record: &Arc<Record>, task: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let id = record.id();
        let level = record.level();
        {
            let mut queue = lock(&self.queue);
            match queue.get_mut(&id) {
                Some(queued) => queued.holders += 1,
                None => {
                    queue.enqueue(
                        id,
                        Queued {
                            record: Arc::clone(record),
                            holders: 1,
                        },
                        Placement::Tail,
                    );
                    queue.set_level_to_process(&id, level);
                }
            }
        }
        let _entry = QueueEntry {
            scheduler: self,
            id,
        };

        loop {
            let turn = self.turn_changed.notified();
            if lock(&self.queue).is_first(&id, Some(level)) {
                break;
            }
            trace!(record_id = %id, level, "Waiting for turn");
            turn.await;
        }

        trace!(record_id = %id, level, "Running in turn");
        task().await
    }
}

struct QueueEntry<'a> {
    scheduler: &'a SubmitScheduler,
    id: RecordId,
}

impl Drop for QueueEntry<'_> {
    fn drop(&mut self) {
        let released = {
            let mut queue = lock(&self.scheduler.queue);
            let remaining = match queue.get_mut(&self.id) {
                Some(queued) => {
                    queued.holders = queued.holders.saturating_sub(1);
                    queued.holders
                }
                None => 0,
            };
            if remaining == 0 {
                if let Some(queued) = queue.delete(&self.id) {
                    trace!(record_id = %queued.record.id(), "Left check queue");
                }
            }
            remaining == 0
        };
        if released {
            self.scheduler.turn_changed.notify_waiters();
        }
    }
}
