//! Address check routine
//!
//! One checker per record. A check waits for the page to settle, asks the
//! remote service, normalizes the answer into `address_status`, stores the
//! predictions and runs the selected correction flow. Popup flows claim the
//! page-wide popup gate for their whole lifetime. The record's dirty flag is
//! cleared after every attempt; an unchanged record returns the previous
//! outcome without a remote call.

use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use fieldkit_common::events::{CorrectionFlow, EngineEvent, UserDecision};
use fieldkit_common::FieldValue;

use super::decision::{select_flow, CheckPolicy};
use super::presenter::PopupRequest;
use super::status::{self, ADDRESS_SELECTED_AUTOMATICALLY, ADDRESS_SELECTED_BY_CUSTOMER};
use crate::capability::address::{ADDRESS_PREDICTIONS, ADDRESS_STATUS};
use crate::capability::ADDRESS_FIELDS;
use crate::lock;
use crate::prediction::apply_prediction;
use crate::record::Record;
use crate::remote::{CheckResponse, Params, Prediction};

/// Result of one address check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckOutcome {
    /// Check attempt number (1-based)
    pub attempt: u32,
    /// Normalized status after the flow ran
    pub status: Vec<String>,
    pub flow: CorrectionFlow,
    /// User answer, for popup flows
    pub decision: Option<UserDecision>,
    /// Whether a blocked submission may continue
    pub resume: bool,
    /// The remote call failed; `status` is the previous status
    pub remote_failed: bool,
}

/// Per-record address check state
pub struct AddressChecker {
    policy: CheckPolicy,
    attempts: AtomicU32,
    last: tokio::sync::Mutex<Option<CheckOutcome>>,
    blur_check: Mutex<Option<JoinHandle<()>>>,
}

impl AddressChecker {
    pub fn new(policy: CheckPolicy) -> Arc<Self> {
        Arc::new(Self {
            policy,
            attempts: AtomicU32::new(0),
            last: tokio::sync::Mutex::new(None),
            blur_check: Mutex::new(None),
        })
    }

    /// Number of remote checks issued so far
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Outcome of the most recent check, if it finished
    pub async fn last_outcome(&self) -> Option<CheckOutcome> {
        self.last.lock().await.clone()
    }

    /// Check `record` if it changed since the last check
    ///
    /// Checks on one record never overlap.
    pub async fn check(&self, record: &Arc<Record>) -> CheckOutcome {
        let mut last = self.last.lock().await;
        if !record.is_changed() {
            if let Some(outcome) = last.as_ref() {
                debug!(record_id = %record.id(), "Address unchanged, reusing last check");
                return outcome.clone();
            }
        }

        let context = Arc::clone(record.context());
        context.quiescence.wait_until_quiet().await;

        let input = record.text_params(ADDRESS_FIELDS);
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        info!(record_id = %record.id(), attempt, "Checking address");

        let response = {
            let _busy = context.quiescence.enter();
            context.remote.check_address(&input).await
        };

        let outcome = match response {
            Ok(response) => self.apply_response(record, response, input, attempt).await,
            Err(e) => {
                context.report_swallowed("Address check", &e);
                CheckOutcome {
                    attempt,
                    status: record
                        .get(ADDRESS_STATUS)
                        .map(|value| value.text_items())
                        .unwrap_or_default(),
                    flow: CorrectionFlow::NoAction,
                    decision: None,
                    resume: context.config.check.resume_submit_on_failure,
                    remote_failed: true,
                }
            }
        };

        context.quiescence.wait_until_quiet().await;
        record.clear_changed();
        *last = Some(outcome.clone());
        outcome
    }

    async fn apply_response(
        &self,
        record: &Arc<Record>,
        response: CheckResponse,
        input: Params,
        attempt: u32,
    ) -> CheckOutcome {
        let predictions = response.predictions;
        let status = status::compute(&response.status, &predictions, &input);
        let flow = select_flow(&status, predictions.len(), attempt, &self.policy);

        record
            .set_field(
                ADDRESS_PREDICTIONS,
                FieldValue::List(predictions.iter().map(Prediction::to_field_value).collect()),
            )
            .await;
        record.set_field(ADDRESS_STATUS, status.clone()).await;
        record.context().emit(EngineEvent::AddressStatusChanged {
            record_id: record.id(),
            status: status.clone(),
            flow,
            timestamp: chrono::Utc::now(),
        });
        debug!(record_id = %record.id(), ?flow, "Correction flow selected");

        let mut outcome = CheckOutcome {
            attempt,
            status,
            flow,
            decision: None,
            resume: false,
            remote_failed: false,
        };

        match flow {
            CorrectionFlow::Resume => outcome.resume = true,
            CorrectionFlow::AutoApply => {
                if let Some(first) = predictions.first() {
                    apply_prediction(record, first).await;
                    outcome.status = self.settle(record, ADDRESS_SELECTED_AUTOMATICALLY).await;
                    outcome.resume = true;
                }
            }
            CorrectionFlow::NoAction => {}
            CorrectionFlow::VariantSelection
            | CorrectionFlow::CorrectionWithoutPredictions
            | CorrectionFlow::NotFound => {
                let request = PopupRequest {
                    record_id: record.id(),
                    flow,
                    status: outcome.status.clone(),
                    predictions: predictions.clone(),
                    input,
                };
                let decision = self.present(record, request).await;
                outcome.decision = Some(decision);

                match decision {
                    UserDecision::SelectVariant { index }
                        if flow == CorrectionFlow::VariantSelection
                            && index < predictions.len() =>
                    {
                        apply_prediction(record, &predictions[index]).await;
                        outcome.status = self.settle(record, ADDRESS_SELECTED_BY_CUSTOMER).await;
                        outcome.resume = true;
                    }
                    UserDecision::SelectVariant { index } => {
                        warn!(record_id = %record.id(), index, "Selected variant does not exist");
                    }
                    UserDecision::ForceConfirm => {
                        let mut confirmed = outcome.status.clone();
                        if !status::has(&confirmed, ADDRESS_SELECTED_BY_CUSTOMER) {
                            confirmed.push(ADDRESS_SELECTED_BY_CUSTOMER.to_string());
                        }
                        record.set_field(ADDRESS_STATUS, confirmed.clone()).await;
                        outcome.status = record
                            .get(ADDRESS_STATUS)
                            .map(|value| value.text_items())
                            .unwrap_or(confirmed);
                        outcome.resume = true;
                    }
                    UserDecision::Edit => {}
                }
            }
        }

        outcome
    }

    /// Show one popup while holding the page-wide popup gate
    async fn present(&self, record: &Arc<Record>, request: PopupRequest) -> UserDecision {
        let context = record.context();
        let _gate = context.popups.acquire().await;

        let flow = request.flow;
        context.emit(EngineEvent::PopupOpened {
            record_id: record.id(),
            flow,
            timestamp: chrono::Utc::now(),
        });
        info!(record_id = %record.id(), ?flow, "Presenting correction popup");

        let decision = context.presenter.present(request).await;

        context.emit(EngineEvent::PopupClosed {
            record_id: record.id(),
            decision,
            timestamp: chrono::Utc::now(),
        });
        decision
    }

    async fn settle(&self, record: &Arc<Record>, flag: &str) -> Vec<String> {
        let settled = status::settled(flag);
        record
            .set_field(ADDRESS_PREDICTIONS, FieldValue::List(Vec::new()))
            .await;
        record.set_field(ADDRESS_STATUS, settled.clone()).await;
        settled
    }

    /// Cancel any pending blur check and schedule a new one
    ///
    /// The check runs after `check.blur_check_delay_ms`, in submit-scheduler
    /// order, and only if the record is still dirty.
    pub fn schedule_blur_check(self: &Arc<Self>, record: &Arc<Record>) {
        let checker = Arc::clone(self);
        let record = Arc::clone(record);
        let delay = record.context().config.check.blur_check_delay();

        let mut pending = lock(&self.blur_check);
        if let Some(handle) = pending.take() {
            handle.abort();
        }
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Past the delay the check can no longer be cancelled
            tokio::spawn(async move {
                if !record.is_changed() {
                    return;
                }
                record
                    .context()
                    .scheduler
                    .run_in_turn(&record, || checker.check(&record))
                    .await;
            });
        }));
    }

    /// Whether a blur check is still waiting out its delay
    pub fn blur_check_pending(&self) -> bool {
        lock(&self.blur_check)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}
