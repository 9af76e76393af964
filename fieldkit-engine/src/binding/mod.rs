//! Two-way binding between canonical fields and external UI elements
//!
//! External elements offer no change notification, so every bound element is
//! polled by independent detectors (see [`subscriber`]):
//!
//! | Detector | Fires when                                  | Action                    |
//! |----------|---------------------------------------------|---------------------------|
//! | change   | value differs from last seen, not focused   | commit to canonical field |
//! | input    | value differs from last seen, focused       | update chunk shadow       |
//! | blur     | focused -> unfocused                        | commit, notify blur       |
//! | liveness | element left the document                   | stop detectors, unbind    |
//!
//! Detectors are suppressed while the subscriber itself writes into the
//! element. All polling lives behind the [`UiElement`] seam so an element
//! type with native notifications can drive the same [`Subscriber`].

pub mod subscriber;

pub use subscriber::Subscriber;

use std::sync::Arc;
use tracing::debug;

use fieldkit_common::{Error, Result};

use crate::record::Record;

/// An externally-owned input-like element
pub trait UiElement: Send + Sync {
    /// Current text value
    fn value(&self) -> String;

    /// Replace the text value
    fn set_value(&self, value: &str);

    fn is_disabled(&self) -> bool {
        false
    }

    /// Checked state for choice inputs; `None` for text inputs
    fn is_checked(&self) -> Option<bool> {
        None
    }

    /// Whether the user is currently editing the element
    fn is_focused(&self) -> bool;

    /// Whether the element is still part of the host document
    fn is_connected(&self) -> bool;
}

/// Text transformation between the element and the canonical field
pub type TextFilter = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Options for [`bind`]
#[derive(Clone, Default)]
pub struct BindOptions {
    /// Reconcile element and canonical value on creation
    pub sync_value: bool,
    /// Element value -> canonical value
    pub read_filter: Option<TextFilter>,
    /// Canonical value -> element value
    pub write_filter: Option<TextFilter>,
}

impl BindOptions {
    pub fn synced() -> Self {
        Self {
            sync_value: true,
            ..Self::default()
        }
    }

    pub fn with_read_filter(mut self, filter: TextFilter) -> Self {
        self.read_filter = Some(filter);
        self
    }

    pub fn with_write_filter(mut self, filter: TextFilter) -> Self {
        self.write_filter = Some(filter);
        self
    }
}

impl std::fmt::Debug for BindOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindOptions")
            .field("sync_value", &self.sync_value)
            .field("read_filter", &self.read_filter.is_some())
            .field("write_filter", &self.write_filter.is_some())
            .finish()
    }
}

/// Bind `element` to canonical field `field` of `record`
///
/// With `sync_value`: an empty canonical value adopts a non-empty element
/// value; otherwise a non-empty canonical value is pushed into the element
/// (the record wins when both are set). The detectors start afterwards.
pub async fn bind(
    record: &Arc<Record>,
    field: &str,
    element: Arc<dyn UiElement>,
    options: BindOptions,
) -> Result<Arc<Subscriber>> {
    if !record.has_field(field) {
        return Err(Error::UnknownField(field.to_string()));
    }

    let subscriber = Subscriber::new(field, element, &options);
    record.add_subscriber(field, Arc::clone(&subscriber));

    if options.sync_value {
        let canonical = record.get(field).unwrap_or_default();
        let observed = subscriber.value();
        if canonical.is_empty() && !observed.is_empty() {
            debug!(record_id = %record.id(), field, "Adopting element value");
            record.set_field(field, observed).await;
        } else if !canonical.is_empty() {
            debug!(record_id = %record.id(), field, "Pushing canonical value to element");
            subscriber.set_value(&canonical.to_display());
        }
    }

    subscriber.start(record);
    Ok(subscriber)
}
