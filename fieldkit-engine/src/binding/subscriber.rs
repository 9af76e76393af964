//! Subscriber: one canonical field bound to one UI element

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

use super::{BindOptions, TextFilter, UiElement};
use crate::lock;
use crate::record::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Detector {
    Change,
    Input,
    Blur,
}

/// Raw element state as last seen by the detectors
#[derive(Debug, Default)]
struct Observed {
    /// Last value committed to (or pushed from) the canonical field
    committed: String,
    /// Last value forwarded as a chunk
    live: String,
    was_focused: bool,
}

/// Binding of one field to one external element
pub struct Subscriber {
    field: String,
    element: Arc<dyn UiElement>,
    read_filter: Option<TextFilter>,
    write_filter: Option<TextFilter>,
    observed: Mutex<Observed>,
    writing: AtomicBool,
    active: AtomicBool,
    detectors: Mutex<Vec<JoinHandle<()>>>,
    liveness: Mutex<Option<JoinHandle<()>>>,
}

impl Subscriber {
    pub(crate) fn new(field: &str, element: Arc<dyn UiElement>, options: &BindOptions) -> Arc<Self> {
        let raw = element.value();
        let focused = element.is_focused();
        Arc::new(Self {
            field: field.to_string(),
            element,
            read_filter: options.read_filter.clone(),
            write_filter: options.write_filter.clone(),
            observed: Mutex::new(Observed {
                committed: raw.clone(),
                live: raw,
                was_focused: focused,
            }),
            writing: AtomicBool::new(false),
            active: AtomicBool::new(true),
            detectors: Mutex::new(Vec::new()),
            liveness: Mutex::new(None),
        })
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn element(&self) -> &Arc<dyn UiElement> {
        &self.element
    }

    /// Element value in canonical representation
    pub fn value(&self) -> String {
        self.read(&self.element.value())
    }

    fn read(&self, raw: &str) -> String {
        match &self.read_filter {
            Some(filter) => filter(raw),
            None => raw.to_string(),
        }
    }

    /// Push a canonical value into the element
    ///
    /// Detectors treat the written value as already seen. Choice inputs keep
    /// their own option value.
    pub fn set_value(&self, canonical: &str) {
        let text = match &self.write_filter {
            Some(filter) => filter(canonical),
            None => canonical.to_string(),
        };

        self.writing.store(true, Ordering::SeqCst);
        if self.element.is_checked().is_none() && self.element.value() != text {
            self.element.set_value(&text);
        }
        let now = self.element.value();
        {
            let mut observed = lock(&self.observed);
            observed.committed = now.clone();
            observed.live = now;
        }
        self.writing.store(false, Ordering::SeqCst);
    }

    /// True while the subscriber writes into its element
    pub fn is_writing(&self) -> bool {
        self.writing.load(Ordering::SeqCst)
    }

    /// False once the element left the document
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn suppressed(&self) -> bool {
        !self.is_active() || self.is_writing() || self.element.is_disabled()
    }

    /// Stop every detector
    pub fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
        for handle in lock(&self.detectors).drain(..) {
            handle.abort();
        }
        if let Some(handle) = lock(&self.liveness).take() {
            handle.abort();
        }
    }

    pub(crate) fn start(self: &Arc<Self>, record: &Arc<Record>) {
        let config = &record.context().config.binding;
        let detectors = vec![
            self.spawn_detector(record, Detector::Change, config.change_period()),
            self.spawn_detector(record, Detector::Input, config.input_period()),
            self.spawn_detector(record, Detector::Blur, config.blur_period()),
        ];
        *lock(&self.detectors) = detectors;
        *lock(&self.liveness) = Some(self.spawn_liveness(record, config.liveness_period()));
    }

    fn spawn_detector(
        self: &Arc<Self>,
        record: &Arc<Record>,
        detector: Detector,
        period: Duration,
    ) -> JoinHandle<()> {
        let subscriber = Arc::clone(self);
        let record = Arc::downgrade(record);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(record) = record.upgrade() else {
                    break;
                };
                if !subscriber.is_active() {
                    break;
                }
                subscriber.poll(&record, detector).await;
            }
        })
    }

    fn spawn_liveness(self: &Arc<Self>, record: &Arc<Record>, period: Duration) -> JoinHandle<()> {
        let subscriber = Arc::clone(self);
        let record: Weak<Record> = Arc::downgrade(record);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if subscriber.element.is_connected() {
                    continue;
                }
                debug!(field = %subscriber.field, "Bound element removed, unbinding");
                subscriber.active.store(false, Ordering::SeqCst);
                for handle in lock(&subscriber.detectors).drain(..) {
                    handle.abort();
                }
                if let Some(record) = record.upgrade() {
                    record.remove_subscriber(&subscriber.field, &subscriber);
                }
                break;
            }
        })
    }

    async fn poll(&self, record: &Arc<Record>, detector: Detector) {
        match detector {
            Detector::Change => self.poll_change(record).await,
            Detector::Input => self.poll_input(record),
            Detector::Blur => self.poll_blur(record).await,
        }
    }

    async fn poll_change(&self, record: &Arc<Record>) {
        if self.suppressed() {
            return;
        }

        let raw = self.element.value();
        match self.element.is_checked() {
            Some(true) => {
                let value = self.read(&raw);
                let current = record.get(&self.field).unwrap_or_default().to_display();
                if current != value {
                    trace!(field = %self.field, "Choice input checked");
                    lock(&self.observed).committed = raw;
                    record.set_field(&self.field, value).await;
                }
            }
            Some(false) => {}
            None => {
                if !self.element.is_focused() {
                    self.commit_if_changed(record, raw).await;
                }
            }
        }
    }

    fn poll_input(&self, record: &Arc<Record>) {
        if self.suppressed() || !self.element.is_focused() {
            return;
        }

        let raw = self.element.value();
        {
            let mut observed = lock(&self.observed);
            if observed.live == raw {
                return;
            }
            observed.live = raw.clone();
        }
        record.set_chunk(&self.field, &self.read(&raw));
    }

    async fn poll_blur(&self, record: &Arc<Record>) {
        let focused = self.element.is_focused();
        let was_focused = std::mem::replace(&mut lock(&self.observed).was_focused, focused);
        if !was_focused || focused || self.suppressed() {
            return;
        }

        trace!(field = %self.field, "Element blurred");
        self.commit_if_changed(record, self.element.value()).await;
        record.notify_blur(&self.field);
    }

    async fn commit_if_changed(&self, record: &Arc<Record>, raw: String) {
        {
            let mut observed = lock(&self.observed);
            if observed.committed == raw {
                return;
            }
            observed.committed = raw.clone();
            observed.live = raw.clone();
        }
        trace!(field = %self.field, "Element value changed");
        record.set_field(&self.field, self.read(&raw)).await;
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("field", &self.field)
            .field("active", &self.is_active())
            .field("writing", &self.is_writing())
            .finish()
    }
}
