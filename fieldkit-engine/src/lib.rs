//! # fieldkit Engine Library (fieldkit-engine)
//!
//! Reactive composition and orchestration engine that keeps canonical records
//! (address, email) synchronized with externally-owned UI elements and with a
//! remote validation service.
//!
//! **Architecture:**
//! - [`capability`]: named feature modules attached to a record at bootstrap
//! - [`record`] / [`field`]: asynchronous canonical field pipeline
//! - [`binding`]: two-way binding between fields and polled UI elements
//! - [`prediction`]: debounced, stale-response-safe autocomplete
//! - [`validation`]: address status normalization and correction flows
//! - [`scheduler`] / [`orchestrator`]: page-wide coordination

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod binding;
pub mod capability;
pub mod context;
pub mod field;
pub mod orchestrator;
pub mod prediction;
pub mod record;
pub mod remote;
pub mod scheduler;
pub mod validation;

pub use context::PageContext;
pub use fieldkit_common::{Error, FieldValue, Result};
pub use orchestrator::{Orchestrator, SubmitOutcome};
pub use record::{Record, RecordId};

/// Lock a std mutex, recovering the data if a holder panicked
///
/// Engine mutexes guard plain data and are never held across an await.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
