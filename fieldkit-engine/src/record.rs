//! Composed record
//!
//! A record is a bare container assembled at run time by capability modules:
//! they register canonical fields, install hooks and park their own state in
//! the record's extension map. The canonical value of each field is the single
//! source of truth; bound subscribers are reconciled to it eventually.
//!
//! ## Local state
//!
//! Every commit stamps its field with a page-wide monotonically increasing
//! "local state" number. Derived-field propagation compares stamps so that two
//! representations of the same data (e.g. full street vs. street name + number)
//! only overwrite each other when the writer is strictly newer.
//!
//! ## Write tickets
//!
//! Each write takes a per-field ticket when it is issued. A write that settles
//! after a later-issued write already settled is dropped as superseded, which
//! makes the field last-write-wins after quiescence regardless of how long
//! individual filters take.

use std::any::Any;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, trace};
use uuid::Uuid;

use fieldkit_common::events::EngineEvent;
use fieldkit_common::{Error, FieldValue, Result};

use crate::binding::Subscriber;
use crate::capability::CapabilityToken;
use crate::context::PageContext;
use crate::field::{
    BlurListener, ChangeEvent, ChunkListener, FieldSpec, PostCommitHook, SetOutcome,
};
use crate::lock;

/// Record identifier
pub type RecordId = Uuid;

struct FieldSlot {
    spec: FieldSpec,
    value: FieldValue,
    chunk: Option<FieldValue>,
    local_state: u64,
    issued: u64,
    committed: u64,
}

/// Record assembled from capabilities
pub struct Record {
    id: RecordId,
    kind: String,
    level: u32,
    context: Arc<PageContext>,
    declared: Vec<String>,

    loaded: watch::Sender<BTreeMap<String, CapabilityToken>>,
    attaching: Mutex<HashSet<String>>,

    fields: Mutex<BTreeMap<String, FieldSlot>>,
    hooks: Mutex<HashMap<String, Vec<Arc<dyn PostCommitHook>>>>,
    chunk_listeners: Mutex<HashMap<String, Vec<Arc<dyn ChunkListener>>>>,
    blur_listeners: Mutex<Vec<Arc<dyn BlurListener>>>,
    subscribers: Mutex<HashMap<String, Vec<Arc<Subscriber>>>>,
    extensions: Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>,

    active: AtomicBool,
    changed: AtomicBool,
}

impl Record {
    /// Create an empty, inactive record
    ///
    /// `capabilities` is the declared capability list attached during
    /// bootstrap; `level` groups records whose checks are ordered together.
    pub fn new(
        context: Arc<PageContext>,
        kind: impl Into<String>,
        capabilities: Vec<String>,
        level: u32,
    ) -> Arc<Self> {
        let (loaded, _) = watch::channel(BTreeMap::new());
        Arc::new(Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            level,
            context,
            declared: capabilities,
            loaded,
            attaching: Mutex::new(HashSet::new()),
            fields: Mutex::new(BTreeMap::new()),
            hooks: Mutex::new(HashMap::new()),
            chunk_listeners: Mutex::new(HashMap::new()),
            blur_listeners: Mutex::new(Vec::new()),
            subscribers: Mutex::new(HashMap::new()),
            extensions: Mutex::new(HashMap::new()),
            active: AtomicBool::new(false),
            changed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn context(&self) -> &Arc<PageContext> {
        &self.context
    }

    /// Capability names declared for this record
    pub fn declared_capabilities(&self) -> &[String] {
        &self.declared
    }

    // ------------------------------------------------------------------
    // Flags
    // ------------------------------------------------------------------

    /// Active records emit change notifications
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    /// Dirty flag: set by address field commits, cleared after every check
    pub fn is_changed(&self) -> bool {
        self.changed.load(Ordering::SeqCst)
    }

    pub fn mark_changed(&self) {
        self.changed.store(true, Ordering::SeqCst);
    }

    pub fn clear_changed(&self) {
        self.changed.store(false, Ordering::SeqCst);
    }

    // ------------------------------------------------------------------
    // Capabilities
    // ------------------------------------------------------------------

    /// Names of attached capabilities
    pub fn loaded_capabilities(&self) -> Vec<String> {
        self.loaded.borrow().keys().cloned().collect()
    }

    pub fn has_capability(&self, name: &str) -> bool {
        self.loaded.borrow().contains_key(name)
    }

    /// Watch the loaded-capability map
    pub fn capability_watch(&self) -> watch::Receiver<BTreeMap<String, CapabilityToken>> {
        self.loaded.subscribe()
    }

    /// Claim a capability for attachment
    ///
    /// Returns false if it is already attached or being attached.
    pub(crate) fn begin_attach(&self, name: &str) -> bool {
        if self.has_capability(name) {
            return false;
        }
        lock(&self.attaching).insert(name.to_string())
    }

    pub(crate) fn finish_attach(&self, token: Option<CapabilityToken>, name: &str) {
        lock(&self.attaching).remove(name);
        if let Some(token) = token {
            self.loaded.send_modify(|loaded| {
                loaded.insert(token.name.clone(), token);
            });
        }
    }

    // ------------------------------------------------------------------
    // Extensions
    // ------------------------------------------------------------------

    /// Park capability state on the record
    pub fn insert_extension<T: Any + Send + Sync>(&self, key: impl Into<String>, value: Arc<T>) {
        lock(&self.extensions).insert(key.into(), value);
    }

    /// Typed capability state stored under `key`
    pub fn extension<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let value = lock(&self.extensions).get(key).cloned()?;
        value.downcast::<T>().ok()
    }

    // ------------------------------------------------------------------
    // Field registration
    // ------------------------------------------------------------------

    /// Register a canonical field
    ///
    /// Registering an existing name is a no-op and returns false.
    pub fn register_field(&self, spec: FieldSpec) -> bool {
        let mut fields = lock(&self.fields);
        if fields.contains_key(&spec.name) {
            return false;
        }
        trace!(record_id = %self.id, field = %spec.name, "Registering field");
        let value = spec.initial.clone();
        let chunk = spec.chunked.then(|| value.clone());
        fields.insert(
            spec.name.clone(),
            FieldSlot {
                spec,
                value,
                chunk,
                local_state: 0,
                issued: 0,
                committed: 0,
            },
        );
        true
    }

    pub fn has_field(&self, name: &str) -> bool {
        lock(&self.fields).contains_key(name)
    }

    pub fn field_names(&self) -> Vec<String> {
        lock(&self.fields).keys().cloned().collect()
    }

    /// Give an existing field a chunk shadow (autocomplete variants)
    pub fn enable_chunk(&self, name: &str) -> Result<()> {
        let mut fields = lock(&self.fields);
        let slot = fields
            .get_mut(name)
            .ok_or_else(|| Error::UnknownField(name.to_string()))?;
        if slot.chunk.is_none() {
            slot.spec.chunked = true;
            slot.chunk = Some(slot.value.clone());
        }
        Ok(())
    }

    pub fn add_post_commit_hook(&self, name: &str, hook: Arc<dyn PostCommitHook>) -> Result<()> {
        if !self.has_field(name) {
            return Err(Error::UnknownField(name.to_string()));
        }
        lock(&self.hooks).entry(name.to_string()).or_default().push(hook);
        Ok(())
    }

    pub fn add_chunk_listener(&self, name: &str, listener: Arc<dyn ChunkListener>) -> Result<()> {
        if !self.has_field(name) {
            return Err(Error::UnknownField(name.to_string()));
        }
        lock(&self.chunk_listeners)
            .entry(name.to_string())
            .or_default()
            .push(listener);
        Ok(())
    }

    pub fn add_blur_listener(&self, listener: Arc<dyn BlurListener>) {
        lock(&self.blur_listeners).push(listener);
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Last settled canonical value
    pub fn get(&self, name: &str) -> Option<FieldValue> {
        lock(&self.fields).get(name).map(|slot| slot.value.clone())
    }

    /// Canonical value as text (empty for unknown or non-text fields)
    pub fn get_text(&self, name: &str) -> String {
        self.get(name)
            .and_then(|value| value.as_str().map(str::to_string))
            .unwrap_or_default()
    }

    /// Chunk shadow of an autocomplete field
    pub fn chunk(&self, name: &str) -> Option<FieldValue> {
        lock(&self.fields).get(name).and_then(|slot| slot.chunk.clone())
    }

    /// Local-state stamp of the last commit to `name` (0 if never written)
    pub fn local_state(&self, name: &str) -> u64 {
        lock(&self.fields)
            .get(name)
            .map(|slot| slot.local_state)
            .unwrap_or(0)
    }

    /// All canonical values, without waiting for pending writes
    pub fn snapshot(&self) -> BTreeMap<String, FieldValue> {
        lock(&self.fields)
            .iter()
            .map(|(name, slot)| (name.clone(), slot.value.clone()))
            .collect()
    }

    /// All canonical values once the page is quiet
    pub async fn settled_snapshot(&self) -> BTreeMap<String, FieldValue> {
        self.context.quiescence.wait_until_quiet().await;
        self.snapshot()
    }

    /// Text values of the listed fields (missing fields are skipped)
    pub fn text_params(&self, names: &[&str]) -> BTreeMap<String, String> {
        let fields = lock(&self.fields);
        names
            .iter()
            .filter_map(|name| {
                let slot = fields.get(*name)?;
                Some((name.to_string(), slot.value.as_str()?.to_string()))
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Write a value through the field pipeline
    pub async fn set_field(
        self: &Arc<Self>,
        name: &str,
        value: impl Into<FieldValue>,
    ) -> SetOutcome {
        let value = value.into();
        self.write(name, async move { Ok(value) }, None).await
    }

    /// Write a deferred value through the field pipeline
    pub async fn set_field_deferred<F>(self: &Arc<Self>, name: &str, value: F) -> SetOutcome
    where
        F: Future<Output = Result<FieldValue>> + Send,
    {
        self.write(name, value, None).await
    }

    /// Write carrying the local-state stamp of the write it derives from
    pub async fn set_field_stamped(
        self: &Arc<Self>,
        name: &str,
        value: impl Into<FieldValue>,
        stamp: u64,
    ) -> SetOutcome {
        let value = value.into();
        self.write(name, async move { Ok(value) }, Some(stamp)).await
    }

    async fn write<F>(self: &Arc<Self>, name: &str, pending: F, stamp: Option<u64>) -> SetOutcome
    where
        F: Future<Output = Result<FieldValue>> + Send,
    {
        let quiescence = self.context.quiescence.clone();
        let _busy = quiescence.enter();

        let ticket = match self.issue_ticket(name) {
            Some(ticket) => ticket,
            None => return self.fail(name, Error::UnknownField(name.to_string())),
        };

        let value = match pending.await {
            Ok(value) => value,
            Err(e) => return self.fail(name, e),
        };

        let value = match self.set_filter(name) {
            Some(filter) => {
                let _filtering = quiescence.enter();
                match filter.apply(value).await {
                    Ok(value) => value,
                    Err(e) => return self.fail(name, e),
                }
            }
            None => value,
        };

        let change = match self.commit(name, ticket, value, stamp) {
            Ok(change) => change,
            Err(outcome) => return outcome,
        };

        self.push_to_subscribers(name, &change.new_value);

        if self.is_active() {
            self.context.emit(EngineEvent::FieldChanged {
                record_id: self.id,
                field: change.field.clone(),
                old_value: change.old_value.clone(),
                new_value: change.new_value.clone(),
                timestamp: chrono::Utc::now(),
            });
        }

        let hooks: Vec<Arc<dyn PostCommitHook>> = lock(&self.hooks)
            .get(name)
            .cloned()
            .unwrap_or_default();
        for hook in hooks {
            hook.after_commit(self, &change).await;
        }

        SetOutcome::Changed(change)
    }

    fn issue_ticket(&self, name: &str) -> Option<u64> {
        let mut fields = lock(&self.fields);
        let slot = fields.get_mut(name)?;
        slot.issued += 1;
        Some(slot.issued)
    }

    fn set_filter(&self, name: &str) -> Option<Arc<dyn crate::field::SetFilter>> {
        lock(&self.fields)
            .get(name)
            .and_then(|slot| slot.spec.set_filter.clone())
    }

    /// Steps 3 and 4 of the pipeline under the field lock
    fn commit(
        &self,
        name: &str,
        ticket: u64,
        value: FieldValue,
        stamp: Option<u64>,
    ) -> std::result::Result<ChangeEvent, SetOutcome> {
        let mut fields = lock(&self.fields);
        let slot = fields
            .get_mut(name)
            .ok_or_else(|| SetOutcome::Failed(Error::UnknownField(name.to_string())))?;

        if ticket < slot.committed {
            trace!(record_id = %self.id, field = name, ticket, "Write superseded");
            return Err(SetOutcome::Superseded);
        }
        slot.committed = ticket;

        let chunk_matches = slot.chunk.as_ref().map_or(true, |chunk| *chunk == value);
        if slot.value == value && chunk_matches {
            if let Some(stamp) = stamp {
                slot.local_state = slot.local_state.max(stamp);
            }
            return Err(SetOutcome::Unchanged);
        }

        let old_value = std::mem::replace(&mut slot.value, value.clone());
        if let Some(chunk) = slot.chunk.as_mut() {
            *chunk = value.clone();
        }
        slot.local_state = stamp.unwrap_or_else(|| self.context.next_local_state());

        debug!(record_id = %self.id, field = name, value = %value, "Field committed");
        Ok(ChangeEvent {
            record_id: self.id,
            field: name.to_string(),
            old_value,
            new_value: value,
            local_state: slot.local_state,
        })
    }

    fn fail(&self, name: &str, error: Error) -> SetOutcome {
        self.context
            .report_swallowed(&format!("Write to field '{}'", name), &error);
        SetOutcome::Failed(error)
    }

    /// Update the chunk shadow of an autocomplete field
    ///
    /// Does not touch the canonical value. Chunk listeners (prediction
    /// pipelines) are notified when the chunk actually changed.
    pub fn set_chunk(self: &Arc<Self>, name: &str, text: &str) {
        let changed = {
            let mut fields = lock(&self.fields);
            match fields.get_mut(name).and_then(|slot| slot.chunk.as_mut()) {
                Some(chunk) if chunk.as_str() != Some(text) => {
                    *chunk = FieldValue::from(text);
                    true
                }
                _ => false,
            }
        };
        if !changed {
            return;
        }

        let listeners: Vec<Arc<dyn ChunkListener>> = lock(&self.chunk_listeners)
            .get(name)
            .cloned()
            .unwrap_or_default();
        for listener in listeners {
            listener.on_chunk(self, name, text);
        }
    }

    /// Signal that editing of `field` stopped
    pub fn notify_blur(self: &Arc<Self>, field: &str) {
        let listeners: Vec<Arc<dyn BlurListener>> = lock(&self.blur_listeners).clone();
        for listener in listeners {
            listener.on_blur(self, field);
        }
    }

    // ------------------------------------------------------------------
    // Subscribers
    // ------------------------------------------------------------------

    pub(crate) fn add_subscriber(&self, field: &str, subscriber: Arc<Subscriber>) {
        lock(&self.subscribers)
            .entry(field.to_string())
            .or_default()
            .push(subscriber);
    }

    pub(crate) fn remove_subscriber(&self, field: &str, subscriber: &Arc<Subscriber>) {
        if let Some(list) = lock(&self.subscribers).get_mut(field) {
            list.retain(|s| !Arc::ptr_eq(s, subscriber));
        }
    }

    /// Subscribers currently bound to `field`
    pub fn subscribers(&self, field: &str) -> Vec<Arc<Subscriber>> {
        lock(&self.subscribers)
            .get(field)
            .cloned()
            .unwrap_or_default()
    }

    fn push_to_subscribers(&self, field: &str, value: &FieldValue) {
        let display = value.to_display();
        for subscriber in self.subscribers(field) {
            subscriber.set_value(&display);
        }
    }
}

impl std::fmt::Debug for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Record")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("level", &self.level)
            .field("capabilities", &self.loaded_capabilities())
            .field("active", &self.is_active())
            .field("changed", &self.is_changed())
            .finish()
    }
}
