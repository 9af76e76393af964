//! Field pipeline contract
//!
//! Every canonical field is written through the same ordered pipeline (see
//! [`Record::set_field`](crate::record::Record::set_field)):
//! 1. resolve the (possibly deferred) value
//! 2. apply the optional [`SetFilter`]
//! 3. compare structurally with the canonical value (and chunk shadow)
//! 4. on change: store, update the chunk, push to subscribers, emit
//!    `FieldChanged` if the record is active, run [`PostCommitHook`]s
//!
//! The outcome is reported as a [`SetOutcome`]; a setter never returns an
//! error to its caller.

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use fieldkit_common::{Error, FieldValue, Result};

use crate::record::Record;

/// Declaration of one canonical field
#[derive(Clone)]
pub struct FieldSpec {
    /// Canonical field name
    pub name: String,
    /// Optional normalization applied to every write
    pub set_filter: Option<Arc<dyn SetFilter>>,
    /// Keep a chunk shadow for in-progress autocomplete text
    pub chunked: bool,
    /// Value before the first write
    pub initial: FieldValue,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            set_filter: None,
            chunked: false,
            initial: FieldValue::empty(),
        }
    }

    pub fn with_filter(mut self, filter: Arc<dyn SetFilter>) -> Self {
        self.set_filter = Some(filter);
        self
    }

    pub fn chunked(mut self) -> Self {
        self.chunked = true;
        self
    }

    pub fn with_initial(mut self, value: FieldValue) -> Self {
        self.initial = value;
        self
    }
}

impl std::fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldSpec")
            .field("name", &self.name)
            .field("set_filter", &self.set_filter.is_some())
            .field("chunked", &self.chunked)
            .finish()
    }
}

/// Pluggable write normalization (may be asynchronous)
#[async_trait]
pub trait SetFilter: Send + Sync {
    async fn apply(&self, value: FieldValue) -> Result<FieldValue>;
}

/// Letter case applied by [`TextNormalizer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextCase {
    Upper,
    Lower,
}

/// Trims and/or re-cases text values; other values pass through
#[derive(Debug, Clone, Copy, Default)]
pub struct TextNormalizer {
    pub trim: bool,
    pub case: Option<TextCase>,
}

impl TextNormalizer {
    pub fn trim() -> Self {
        Self {
            trim: true,
            case: None,
        }
    }

    pub fn upper() -> Self {
        Self {
            trim: true,
            case: Some(TextCase::Upper),
        }
    }

    pub fn lower() -> Self {
        Self {
            trim: true,
            case: Some(TextCase::Lower),
        }
    }

    fn normalize(&self, text: &str) -> String {
        let text = if self.trim { text.trim() } else { text };
        match self.case {
            Some(TextCase::Upper) => text.to_uppercase(),
            Some(TextCase::Lower) => text.to_lowercase(),
            None => text.to_string(),
        }
    }
}

#[async_trait]
impl SetFilter for TextNormalizer {
    async fn apply(&self, value: FieldValue) -> Result<FieldValue> {
        Ok(match value {
            FieldValue::Text(text) => FieldValue::Text(self.normalize(&text)),
            other => other,
        })
    }
}

/// Side effect run after a field commit
///
/// Hooks run in registration order, after subscribers were updated and the
/// change event was emitted.
#[async_trait]
pub trait PostCommitHook: Send + Sync {
    async fn after_commit(&self, record: &Arc<Record>, change: &ChangeEvent);
}

/// Observer of chunk (live input) changes on a chunked field
pub trait ChunkListener: Send + Sync {
    fn on_chunk(&self, record: &Arc<Record>, field: &str, chunk: &str);
}

/// Observer of "editing stopped" signals from bound elements
pub trait BlurListener: Send + Sync {
    fn on_blur(&self, record: &Arc<Record>, field: &str);
}

/// A committed field change
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub record_id: Uuid,
    pub field: String,
    pub old_value: FieldValue,
    pub new_value: FieldValue,
    /// Local-state stamp of the write (see derived-field propagation)
    pub local_state: u64,
}

/// Typed result of a field write
#[derive(Debug)]
pub enum SetOutcome {
    /// Value changed and side effects ran
    Changed(ChangeEvent),
    /// Resolved value equals the canonical value
    Unchanged,
    /// A write issued later already settled; this one was dropped
    Superseded,
    /// Resolution, filtering or lookup failed; field left unchanged
    Failed(Error),
}

impl SetOutcome {
    pub fn is_changed(&self) -> bool {
        matches!(self, SetOutcome::Changed(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SetOutcome::Failed(_))
    }

    pub fn change(&self) -> Option<&ChangeEvent> {
        match self {
            SetOutcome::Changed(change) => Some(change),
            _ => None,
        }
    }
}
