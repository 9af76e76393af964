//! Shared page context
//!
//! Page-wide state handed to every record by reference: configuration, the
//! quiescence counter, the popup gate, the event bus, the remote service and
//! the submit scheduler. The quiescence counter and the popup gate are the
//! only mutable state shared across records.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use fieldkit_common::config::EngineConfig;
use fieldkit_common::events::{EngineEvent, EventBus};
use fieldkit_common::{Error, QuiescenceCounter};

use crate::remote::RemoteService;
use crate::scheduler::SubmitScheduler;
use crate::validation::{CorrectionPresenter, PopupGate};

/// Shared state accessible by all records on a page
pub struct PageContext {
    /// Resolved engine configuration
    pub config: EngineConfig,

    /// Busy counter every asynchronous field operation reports to
    pub quiescence: QuiescenceCounter,

    /// At most one correction popup open across all records
    pub popups: PopupGate,

    /// Event broadcaster
    pub events: EventBus,

    /// Remote validation service
    pub remote: Arc<dyn RemoteService>,

    /// Renders correction popups
    pub presenter: Arc<dyn CorrectionPresenter>,

    /// Orders submit-time and blur-time checks across records
    pub scheduler: SubmitScheduler,

    /// Source of per-field "local state" stamps
    local_state: AtomicU64,
}

impl PageContext {
    /// Create shared state for one page
    pub fn new(
        config: EngineConfig,
        remote: Arc<dyn RemoteService>,
        presenter: Arc<dyn CorrectionPresenter>,
    ) -> Arc<Self> {
        let events = EventBus::new(config.events.bus_capacity);
        Arc::new(Self {
            config,
            quiescence: QuiescenceCounter::new(),
            popups: PopupGate::new(),
            events,
            remote,
            presenter,
            scheduler: SubmitScheduler::new(),
            local_state: AtomicU64::new(0),
        })
    }

    /// Next monotonically increasing local-state stamp
    pub fn next_local_state(&self) -> u64 {
        self.local_state.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Broadcast an event, ignoring the no-subscriber case
    pub fn emit(&self, event: EngineEvent) {
        self.events.emit_lossy(event);
    }

    /// Log a failure that is absorbed at a field/capability boundary
    ///
    /// Logged at debug level unless `logging.verbose_diagnostics` is set.
    pub fn report_swallowed(&self, what: &str, error: &Error) {
        if self.config.logging.verbose_diagnostics {
            warn!(error = %error, "{} failed", what);
        } else {
            debug!(error = %error, "{} failed", what);
        }
    }
}
