//! Autocomplete prediction pipeline
//!
//! One pipeline per autocomplete field. Chunk changes restart a debounce
//! timer; when it fires a request index is issued and the remote lookup runs.
//! A response is applied only if its index is still the current one, so a
//! slow response can never overwrite the result of a newer request.
//!
//! The highlighted cursor saturates at the list bounds. Selecting a
//! prediction writes its fields into the record and clears the list.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use fieldkit_common::config::PredictionConfig;
use fieldkit_common::events::EngineEvent;

use crate::capability::ADDRESS_FIELDS;
use crate::field::ChunkListener;
use crate::lock;
use crate::record::Record;
use crate::remote::{Params, Prediction, PredictionKind};

#[derive(Debug, Default)]
struct PredictionState {
    predictions: Vec<Prediction>,
    highlighted: Option<usize>,
}

/// Debounced, stale-response-safe autocomplete for one field
pub struct PredictionPipeline {
    me: Weak<PredictionPipeline>,
    kind: PredictionKind,
    config: PredictionConfig,
    request_index: AtomicU64,
    active: AtomicBool,
    state: Mutex<PredictionState>,
    debounce: Mutex<Option<JoinHandle<()>>>,
}

impl PredictionPipeline {
    pub fn new(kind: PredictionKind, config: PredictionConfig) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            kind,
            config,
            request_index: AtomicU64::new(0),
            active: AtomicBool::new(true),
            state: Mutex::new(PredictionState::default()),
            debounce: Mutex::new(None),
        })
    }

    pub fn kind(&self) -> PredictionKind {
        self.kind
    }

    pub fn field(&self) -> &'static str {
        self.kind.field()
    }

    /// Inactive pipelines ignore chunk changes
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
        if !active {
            self.cancel_pending();
        }
    }

    /// Index of the most recently issued request
    pub fn request_index(&self) -> u64 {
        self.request_index.load(Ordering::SeqCst)
    }

    /// Issue the next request index
    pub fn begin_request(&self) -> u64 {
        self.request_index.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Apply a response issued under `ticket`
    ///
    /// Returns false (and changes nothing) if a newer request was issued in
    /// the meantime.
    pub fn accept(&self, ticket: u64, mut predictions: Vec<Prediction>) -> bool {
        let current = self.request_index();
        if ticket != current {
            debug!(
                field = self.field(),
                request_index = ticket,
                current,
                "Discarding stale predictions"
            );
            return false;
        }

        predictions.truncate(self.config.max_items);
        let mut state = lock(&self.state);
        state.predictions = predictions;
        state.highlighted = None;
        true
    }

    pub fn predictions(&self) -> Vec<Prediction> {
        lock(&self.state).predictions.clone()
    }

    pub fn highlighted(&self) -> Option<usize> {
        lock(&self.state).highlighted
    }

    /// Move the cursor down, stopping at the last prediction
    pub fn highlight_next(&self) -> Option<usize> {
        let mut state = lock(&self.state);
        let len = state.predictions.len();
        if len == 0 {
            return None;
        }
        let next = match state.highlighted {
            None => 0,
            Some(index) => (index + 1).min(len - 1),
        };
        state.highlighted = Some(next);
        state.highlighted
    }

    /// Move the cursor up, stopping at the first prediction
    pub fn highlight_prev(&self) -> Option<usize> {
        let mut state = lock(&self.state);
        if state.predictions.is_empty() {
            return None;
        }
        let prev = state.highlighted.map_or(0, |index| index.saturating_sub(1));
        state.highlighted = Some(prev);
        state.highlighted
    }

    pub fn clear(&self) {
        let mut state = lock(&self.state);
        state.predictions.clear();
        state.highlighted = None;
    }

    fn cancel_pending(&self) {
        if let Some(handle) = lock(&self.debounce).take() {
            handle.abort();
        }
    }

    /// Restart the debounce timer for `chunk`
    ///
    /// Only the timer is cancellable. Once it fires, the lookup and any
    /// smart-fill commit run detached and are never aborted halfway; a newer
    /// chunk supersedes them through the request index.
    pub fn schedule(self: &Arc<Self>, record: Arc<Record>, chunk: String) {
        let pipeline = Arc::clone(self);
        let delay = self.config.debounce();
        let mut pending = lock(&self.debounce);
        if let Some(handle) = pending.take() {
            handle.abort();
        }
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let busy = record.context().quiescence.enter();
            tokio::spawn(async move {
                let _busy = busy;
                pipeline.request(&record, &chunk).await;
            });
        }));
    }

    /// Run one lookup for `chunk` right away
    ///
    /// Returns true if the response was applied.
    pub async fn request(&self, record: &Arc<Record>, chunk: &str) -> bool {
        let ticket = self.begin_request();
        let params = self.request_params(record, chunk);
        trace!(record_id = %record.id(), field = self.field(), request_index = ticket, "Requesting predictions");

        let response = {
            let _busy = record.context().quiescence.enter();
            record.context().remote.predict(self.kind, &params).await
        };

        let predictions = match response {
            Ok(predictions) => predictions,
            Err(e) => {
                record
                    .context()
                    .report_swallowed(&format!("Prediction request for '{}'", self.field()), &e);
                return false;
            }
        };

        if !self.accept(ticket, predictions) {
            return false;
        }

        let predictions = self.predictions();
        record.context().emit(EngineEvent::PredictionsUpdated {
            record_id: record.id(),
            field: self.field().to_string(),
            count: predictions.len(),
            timestamp: chrono::Utc::now(),
        });

        if self.should_smart_fill(chunk, &predictions) {
            debug!(record_id = %record.id(), field = self.field(), "Smart fill");
            self.select(record, 0).await;
        }
        true
    }

    fn request_params(&self, record: &Record, chunk: &str) -> Params {
        let mut params = record.text_params(ADDRESS_FIELDS);
        params.insert(self.field().to_string(), chunk.to_string());
        params
    }

    fn should_smart_fill(&self, chunk: &str, predictions: &[Prediction]) -> bool {
        if !self.config.smart_fill || predictions.len() != 1 {
            return false;
        }
        let candidate = predictions[0].get(self.field()).to_lowercase();
        let typed = chunk.trim().to_lowercase();
        !typed.is_empty() && strsim::levenshtein(&typed, &candidate) <= self.config.smart_fill_distance
    }

    /// Commit prediction `index` into the record and clear the list
    ///
    /// Returns false if there is no prediction at `index`.
    pub async fn select(&self, record: &Arc<Record>, index: usize) -> bool {
        let prediction = match lock(&self.state).predictions.get(index).cloned() {
            Some(prediction) => prediction,
            None => return false,
        };
        self.clear();
        apply_prediction(record, &prediction).await;
        true
    }

    /// Commit the highlighted prediction, if any
    pub async fn select_highlighted(&self, record: &Arc<Record>) -> bool {
        match self.highlighted() {
            Some(index) => self.select(record, index).await,
            None => false,
        }
    }
}

impl ChunkListener for PredictionPipeline {
    fn on_chunk(&self, record: &Arc<Record>, _field: &str, chunk: &str) {
        if !self.is_active() {
            return;
        }
        if let Some(pipeline) = self.me.upgrade() {
            pipeline.schedule(Arc::clone(record), chunk.to_string());
        }
    }
}

/// Write every field of `prediction` the record knows about
pub async fn apply_prediction(record: &Arc<Record>, prediction: &Prediction) {
    for (field, value) in &prediction.fields {
        if record.has_field(field) {
            record.set_field(field, value.as_str()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline(max_items: usize) -> Arc<PredictionPipeline> {
        PredictionPipeline::new(
            PredictionKind::Locality,
            PredictionConfig {
                max_items,
                ..PredictionConfig::default()
            },
        )
    }

    fn localities(names: &[&str]) -> Vec<Prediction> {
        names
            .iter()
            .map(|name| Prediction::new([("locality", *name)]))
            .collect()
    }

    #[test]
    fn test_out_of_order_responses_only_latest_applies() {
        let pipeline = pipeline(6);
        let first = pipeline.begin_request();
        let second = pipeline.begin_request();
        let third = pipeline.begin_request();

        assert!(pipeline.accept(third, localities(&["Berlin"])));
        assert!(!pipeline.accept(first, localities(&["Bonn"])));
        assert!(!pipeline.accept(second, localities(&["Bremen"])));

        assert_eq!(pipeline.predictions(), localities(&["Berlin"]));
    }

    #[test]
    fn test_response_truncated_to_max_items() {
        let pipeline = pipeline(2);
        let ticket = pipeline.begin_request();
        pipeline.accept(ticket, localities(&["A", "B", "C"]));
        assert_eq!(pipeline.predictions().len(), 2);
    }

    #[test]
    fn test_cursor_saturates() {
        let pipeline = pipeline(6);
        assert_eq!(pipeline.highlight_next(), None);

        let ticket = pipeline.begin_request();
        pipeline.accept(ticket, localities(&["A", "B", "C"]));

        assert_eq!(pipeline.highlight_prev(), Some(0));
        assert_eq!(pipeline.highlight_prev(), Some(0));
        assert_eq!(pipeline.highlight_next(), Some(1));
        assert_eq!(pipeline.highlight_next(), Some(2));
        assert_eq!(pipeline.highlight_next(), Some(2));
    }

    #[test]
    fn test_new_response_resets_cursor() {
        let pipeline = pipeline(6);
        let ticket = pipeline.begin_request();
        pipeline.accept(ticket, localities(&["A", "B"]));
        pipeline.highlight_next();

        let ticket = pipeline.begin_request();
        pipeline.accept(ticket, localities(&["C"]));
        assert_eq!(pipeline.highlighted(), None);
    }

    #[test]
    fn test_smart_fill_requires_single_close_match() {
        let pipeline = pipeline(6);
        assert!(pipeline.should_smart_fill("berln", &localities(&["Berlin"])));
        assert!(!pipeline.should_smart_fill("Bern", &localities(&["Berlin"])));
        assert!(!pipeline.should_smart_fill("Berlin", &localities(&["Berlin", "Bernau"])));
        assert!(!pipeline.should_smart_fill("", &localities(&["A"])));
    }
}
