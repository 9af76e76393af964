//! Event types for the fieldkit event system
//!
//! Provides shared event definitions and the EventBus used by every record on
//! a page.

mod flow_types;

pub use flow_types::{CorrectionFlow, UserDecision};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::FieldValue;

/// fieldkit event types
///
/// Events are broadcast via EventBus and can be serialized for external
/// renderers (status badges, popups, debugging consoles).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    /// Canonical field value changed on an active record
    ///
    /// Triggers:
    /// - Renderers: refresh dependent markup
    /// - Integrations: mirror the value into their own model
    FieldChanged {
        /// Record that owns the field
        record_id: Uuid,
        /// Canonical field name
        field: String,
        /// Value before the write
        old_value: FieldValue,
        /// Value after the write
        new_value: FieldValue,
        /// When the write was committed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Capability attached to a record during bootstrap
    CapabilityAttached {
        record_id: Uuid,
        capability: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Capability failed to attach (or timed out waiting) and was dropped
    CapabilityDropped {
        record_id: Uuid,
        capability: String,
        /// Human-readable failure reason
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Autocomplete prediction list replaced
    PredictionsUpdated {
        record_id: Uuid,
        field: String,
        /// Number of predictions after truncation
        count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Address status recomputed after a check or explicit assignment
    AddressStatusChanged {
        record_id: Uuid,
        /// Normalized status tokens
        status: Vec<String>,
        /// Flow selected for this status
        flow: CorrectionFlow,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Correction popup opened for a record
    PopupOpened {
        record_id: Uuid,
        flow: CorrectionFlow,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Correction popup closed
    PopupClosed {
        record_id: Uuid,
        decision: UserDecision,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Submit-time validation finished for the whole page
    SubmitResolved {
        /// Whether the submission may proceed
        proceed: bool,
        /// Records that were checked
        records: Vec<Uuid>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl EngineEvent {
    /// Record the event refers to, if any
    pub fn record_id(&self) -> Option<Uuid> {
        match self {
            EngineEvent::FieldChanged { record_id, .. }
            | EngineEvent::CapabilityAttached { record_id, .. }
            | EngineEvent::CapabilityDropped { record_id, .. }
            | EngineEvent::PredictionsUpdated { record_id, .. }
            | EngineEvent::AddressStatusChanged { record_id, .. }
            | EngineEvent::PopupOpened { record_id, .. }
            | EngineEvent::PopupClosed { record_id, .. } => Some(*record_id),
            EngineEvent::SubmitResolved { .. } => None,
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus for page-wide events
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use fieldkit_common::events::{EventBus, EngineEvent};
/// use std::sync::Arc;
///
/// let event_bus = Arc::new(EventBus::new(100));
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(EngineEvent::SubmitResolved {
///     proceed: true,
///     records: vec![],
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(matches!(rx.try_recv(), Ok(EngineEvent::SubmitResolved { .. })));
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: EngineEvent,
    ) -> Result<usize, broadcast::error::SendError<EngineEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
