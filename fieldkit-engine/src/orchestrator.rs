//! Page orchestrator
//!
//! Owns the shared [`PageContext`], the capability registry and every record
//! created on the page. Records are bootstrapped through the
//! [`CapabilityLoader`]; `submit` runs the address check of every record that
//! carries one, in submit-scheduler order, and decides whether the page may
//! proceed.

use futures::future::join_all;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::info;

use fieldkit_common::config::EngineConfig;
use fieldkit_common::events::EngineEvent;

use crate::capability::{AddressCheckCapability, AttachReport, CapabilityLoader, CapabilityRegistry};
use crate::context::PageContext;
use crate::lock;
use crate::record::{Record, RecordId};
use crate::remote::RemoteService;
use crate::validation::{CheckOutcome, CorrectionPresenter};

/// Page-wide submit decision
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitOutcome {
    /// Whether the submission may proceed
    pub proceed: bool,
    /// Check outcome per record, in the order the records were created
    pub per_record: Vec<(RecordId, CheckOutcome)>,
}

/// Coordinates every record on one page
pub struct Orchestrator {
    context: Arc<PageContext>,
    loader: CapabilityLoader,
    records: Mutex<Vec<Arc<Record>>>,
}

impl Orchestrator {
    /// Orchestrator with the built-in capabilities
    pub fn new(
        config: EngineConfig,
        remote: Arc<dyn RemoteService>,
        presenter: Arc<dyn CorrectionPresenter>,
    ) -> Self {
        Self::with_registry(config, remote, presenter, CapabilityRegistry::with_builtins())
    }

    pub fn with_registry(
        config: EngineConfig,
        remote: Arc<dyn RemoteService>,
        presenter: Arc<dyn CorrectionPresenter>,
        registry: CapabilityRegistry,
    ) -> Self {
        let wait_timeout = config.capabilities.wait_timeout();
        Self {
            context: PageContext::new(config, remote, presenter),
            loader: CapabilityLoader::new(Arc::new(registry), wait_timeout),
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn context(&self) -> &Arc<PageContext> {
        &self.context
    }

    pub fn loader(&self) -> &CapabilityLoader {
        &self.loader
    }

    /// Create a record and attach its capabilities
    ///
    /// The record becomes active once bootstrap finished.
    pub async fn create_record(
        &self,
        kind: &str,
        capabilities: &[&str],
        level: u32,
    ) -> (Arc<Record>, AttachReport) {
        let names: Vec<String> = capabilities.iter().map(|name| name.to_string()).collect();
        let record = Record::new(Arc::clone(&self.context), kind, names.clone(), level);

        let report = self.loader.attach(&record, &names).await;
        record.set_active(true);
        lock(&self.records).push(Arc::clone(&record));

        info!(record_id = %record.id(), kind, level, "Record created");
        (record, report)
    }

    pub fn records(&self) -> Vec<Arc<Record>> {
        lock(&self.records).clone()
    }

    pub fn record(&self, id: RecordId) -> Option<Arc<Record>> {
        lock(&self.records).iter().find(|r| r.id() == id).cloned()
    }

    /// Check every record carrying an address check and decide on submission
    ///
    /// Unchanged records reuse their last outcome. Submission proceeds only
    /// if every checked record resumed.
    pub async fn submit(&self) -> SubmitOutcome {
        self.context.quiescence.wait_until_quiet().await;

        let checked: Vec<_> = self
            .records()
            .into_iter()
            .filter_map(|record| {
                AddressCheckCapability::checker(&record).map(|checker| (record, checker))
            })
            .collect();

        let scheduler = &self.context.scheduler;
        let outcomes = join_all(checked.iter().map(|(record, checker)| async move {
            let outcome = scheduler
                .run_in_turn(record, || checker.check(record))
                .await;
            (record.id(), outcome)
        }))
        .await;

        let proceed = outcomes.iter().all(|(_, outcome)| outcome.resume);
        info!(proceed, records = outcomes.len(), "Submit resolved");
        self.context.emit(EngineEvent::SubmitResolved {
            proceed,
            records: outcomes.iter().map(|(id, _)| *id).collect(),
            timestamp: chrono::Utc::now(),
        });

        SubmitOutcome {
            proceed,
            per_record: outcomes,
        }
    }
}
