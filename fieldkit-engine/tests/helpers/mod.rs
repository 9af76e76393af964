//! Shared fakes for fieldkit-engine integration tests
//!
//! - `FakeRemote`: scripted remote validation service
//! - `ScriptedPresenter`: answers popups from a queue, tracks overlap
//! - `FakeElement`: in-memory UI element driven by the test

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fieldkit_common::config::EngineConfig;
use fieldkit_common::events::UserDecision;
use fieldkit_common::{Error, Result};
use fieldkit_engine::binding::UiElement;
use fieldkit_engine::capability::names;
use fieldkit_engine::remote::{CheckResponse, Params, Prediction, PredictionKind, RemoteService};
use fieldkit_engine::validation::{CorrectionPresenter, PopupRequest};
use fieldkit_engine::{Orchestrator, Record};

// ========================================
// Remote service
// ========================================

/// One scripted prediction response
pub struct PredictReply {
    pub delay: Duration,
    pub predictions: Vec<Prediction>,
}

/// One scripted check response (`None` = transport failure)
pub type CheckReply = Option<CheckResponse>;

#[derive(Default)]
pub struct FakeRemote {
    predict_replies: Mutex<VecDeque<PredictReply>>,
    check_replies: Mutex<VecDeque<CheckReply>>,
    email_status: Mutex<Vec<String>>,
    pub predict_calls: Mutex<Vec<(PredictionKind, Params)>>,
    pub check_calls: Mutex<Vec<Params>>,
    pub email_calls: Mutex<Vec<String>>,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_predictions(&self, delay_ms: u64, predictions: Vec<Prediction>) {
        self.predict_replies.lock().unwrap().push_back(PredictReply {
            delay: Duration::from_millis(delay_ms),
            predictions,
        });
    }

    pub fn push_check(&self, status: &[&str], predictions: Vec<Prediction>) {
        self.check_replies.lock().unwrap().push_back(Some(CheckResponse {
            status: status.iter().map(|s| s.to_string()).collect(),
            predictions,
        }));
    }

    pub fn push_check_failure(&self) {
        self.check_replies.lock().unwrap().push_back(None);
    }

    pub fn set_email_status(&self, status: &[&str]) {
        *self.email_status.lock().unwrap() = status.iter().map(|s| s.to_string()).collect();
    }

    pub fn predict_count(&self) -> usize {
        self.predict_calls.lock().unwrap().len()
    }

    pub fn check_count(&self) -> usize {
        self.check_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl RemoteService for FakeRemote {
    async fn predict(&self, kind: PredictionKind, params: &Params) -> Result<Vec<Prediction>> {
        self.predict_calls.lock().unwrap().push((kind, params.clone()));
        let reply = self.predict_replies.lock().unwrap().pop_front();
        match reply {
            Some(reply) => {
                tokio::time::sleep(reply.delay).await;
                Ok(reply.predictions)
            }
            None => Ok(Vec::new()),
        }
    }

    async fn check_address(&self, params: &Params) -> Result<CheckResponse> {
        self.check_calls.lock().unwrap().push(params.clone());
        let reply = self.check_replies.lock().unwrap().pop_front();
        match reply {
            Some(Some(response)) => Ok(response),
            Some(None) => Err(Error::Network("connection refused".to_string())),
            None => Ok(CheckResponse {
                status: vec!["A1000".to_string()],
                predictions: Vec::new(),
            }),
        }
    }

    async fn check_email(&self, email: &str) -> Result<Vec<String>> {
        self.email_calls.lock().unwrap().push(email.to_string());
        Ok(self.email_status.lock().unwrap().clone())
    }
}

// ========================================
// Presenter
// ========================================

pub struct ScriptedPresenter {
    decisions: Mutex<VecDeque<UserDecision>>,
    hold: Duration,
    open: AtomicUsize,
    max_open: AtomicUsize,
    pub requests: Mutex<Vec<PopupRequest>>,
}

impl ScriptedPresenter {
    pub fn new(decisions: Vec<UserDecision>) -> Arc<Self> {
        Self::holding(decisions, Duration::ZERO)
    }

    /// Keep every popup open for `hold` before answering
    pub fn holding(decisions: Vec<UserDecision>, hold: Duration) -> Arc<Self> {
        Arc::new(Self {
            decisions: Mutex::new(decisions.into()),
            hold,
            open: AtomicUsize::new(0),
            max_open: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn max_open(&self) -> usize {
        self.max_open.load(Ordering::SeqCst)
    }

    pub fn presented(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl CorrectionPresenter for ScriptedPresenter {
    async fn present(&self, request: PopupRequest) -> UserDecision {
        let open = self.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_open.fetch_max(open, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);

        if !self.hold.is_zero() {
            tokio::time::sleep(self.hold).await;
        }

        let decision = self
            .decisions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(UserDecision::Edit);
        self.open.fetch_sub(1, Ordering::SeqCst);
        decision
    }
}

// ========================================
// UI element
// ========================================

#[derive(Debug, Default)]
struct ElementState {
    value: String,
    focused: bool,
    connected: bool,
    disabled: bool,
    checked: Option<bool>,
}

#[derive(Debug)]
pub struct FakeElement {
    state: Mutex<ElementState>,
    writes: AtomicUsize,
}

impl FakeElement {
    pub fn new(value: &str) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ElementState {
                value: value.to_string(),
                connected: true,
                ..ElementState::default()
            }),
            writes: AtomicUsize::new(0),
        })
    }

    pub fn checkbox(value: &str, checked: bool) -> Arc<Self> {
        let element = Self::new(value);
        element.state.lock().unwrap().checked = Some(checked);
        element
    }

    /// User edit (does not count as a programmatic write)
    pub fn type_text(&self, value: &str) {
        self.state.lock().unwrap().value = value.to_string();
    }

    pub fn focus(&self) {
        self.state.lock().unwrap().focused = true;
    }

    pub fn blur(&self) {
        self.state.lock().unwrap().focused = false;
    }

    pub fn set_checked(&self, checked: bool) {
        self.state.lock().unwrap().checked = Some(checked);
    }

    pub fn set_disabled(&self, disabled: bool) {
        self.state.lock().unwrap().disabled = disabled;
    }

    pub fn disconnect(&self) {
        self.state.lock().unwrap().connected = false;
    }

    /// Number of programmatic writes
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn current(&self) -> String {
        self.state.lock().unwrap().value.clone()
    }
}

impl UiElement for FakeElement {
    fn value(&self) -> String {
        self.current()
    }

    fn set_value(&self, value: &str) {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.state.lock().unwrap().value = value.to_string();
    }

    fn is_disabled(&self) -> bool {
        self.state.lock().unwrap().disabled
    }

    fn is_checked(&self) -> Option<bool> {
        self.state.lock().unwrap().checked
    }

    fn is_focused(&self) -> bool {
        self.state.lock().unwrap().focused
    }

    fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }
}

// ========================================
// Page setup
// ========================================

pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.capabilities.wait_timeout_secs = 1;
    config
}

pub fn page(remote: Arc<FakeRemote>, presenter: Arc<ScriptedPresenter>) -> Orchestrator {
    page_with_config(test_config(), remote, presenter)
}

pub fn page_with_config(
    config: EngineConfig,
    remote: Arc<FakeRemote>,
    presenter: Arc<ScriptedPresenter>,
) -> Orchestrator {
    Orchestrator::new(config, remote, presenter)
}

/// Address record with the check capability and every autocomplete
pub async fn address_record(orchestrator: &Orchestrator, level: u32) -> Arc<Record> {
    let (record, report) = orchestrator
        .create_record(
            "address",
            &[
                names::ADDRESS,
                names::ADDRESS_CHECK,
                names::POSTAL_CODE_AUTOCOMPLETE,
                names::LOCALITY_AUTOCOMPLETE,
                names::STREET_NAME_AUTOCOMPLETE,
                names::STREET_FULL_AUTOCOMPLETE,
            ],
            level,
        )
        .await;
    assert!(report.is_complete(), "dropped: {:?}", report.dropped);
    record
}

pub fn prediction(fields: &[(&str, &str)]) -> Prediction {
    Prediction::new(fields.iter().map(|(k, v)| (k.to_string(), v.to_string())))
}

/// A complete German address as the remote would suggest it
pub fn berlin_prediction() -> Prediction {
    prediction(&[
        ("country_code", "DE"),
        ("postal_code", "10115"),
        ("locality", "Berlin"),
        ("street_name", "Invalidenstraße"),
        ("building_number", "117"),
    ])
}

/// Fill an address record with the values of `berlin_prediction`,
/// optionally overriding some fields
pub async fn fill_address(record: &Arc<Record>, overrides: &[(&str, &str)]) {
    let base = berlin_prediction();
    for (field, value) in &base.fields {
        let value = overrides
            .iter()
            .find(|(k, _)| *k == field.as_str())
            .map(|(_, v)| *v)
            .unwrap_or(value.as_str());
        record.set_field(field, value).await;
    }
}
