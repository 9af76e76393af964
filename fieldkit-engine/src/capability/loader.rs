//! Capability bootstrap
//!
//! Every declared capability that is not attached yet is attached
//! concurrently. Failures (unknown name, dependency timeout, attach error) are
//! logged and the capability is dropped; nothing is returned as an error.
//! Waiting for a capability is event-driven: the record publishes its loaded
//! map through a watch channel.

use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use fieldkit_common::events::EngineEvent;
use fieldkit_common::{Error, Result};

use super::{CapabilityRegistry, CapabilityToken};
use crate::record::Record;

/// Result of one bootstrap pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AttachReport {
    /// Capabilities attached during this pass
    pub attached: Vec<String>,
    /// Capabilities dropped, with the reason
    pub dropped: Vec<(String, String)>,
}

impl AttachReport {
    pub fn is_complete(&self) -> bool {
        self.dropped.is_empty()
    }
}

enum AttachResult {
    Attached(String),
    Dropped(String, String),
    Skipped,
}

/// Attaches registered capabilities to records
#[derive(Clone)]
pub struct CapabilityLoader {
    registry: Arc<CapabilityRegistry>,
    wait_timeout: Duration,
}

impl CapabilityLoader {
    pub fn new(registry: Arc<CapabilityRegistry>, wait_timeout: Duration) -> Self {
        Self {
            registry,
            wait_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    /// Default dependency wait timeout
    pub fn wait_timeout(&self) -> Duration {
        self.wait_timeout
    }

    /// Attach every listed capability not attached yet
    pub async fn attach(&self, record: &Arc<Record>, names: &[String]) -> AttachReport {
        let results = join_all(names.iter().map(|name| self.attach_one(record, name))).await;

        let mut report = AttachReport::default();
        for result in results {
            match result {
                AttachResult::Attached(name) => report.attached.push(name),
                AttachResult::Dropped(name, reason) => report.dropped.push((name, reason)),
                AttachResult::Skipped => {}
            }
        }

        info!(
            record_id = %record.id(),
            attached = report.attached.len(),
            dropped = report.dropped.len(),
            "Capability bootstrap finished"
        );
        report
    }

    async fn attach_one(&self, record: &Arc<Record>, name: &str) -> AttachResult {
        if !record.begin_attach(name) {
            debug!(record_id = %record.id(), capability = name, "Capability already attached");
            return AttachResult::Skipped;
        }

        let quiescence = record.context().quiescence.clone();
        let _busy = quiescence.enter();

        match self.run_attach(record, name).await {
            Ok(()) => {
                record.finish_attach(Some(CapabilityToken::new(name)), name);
                debug!(record_id = %record.id(), capability = name, "Capability attached");
                record.context().emit(EngineEvent::CapabilityAttached {
                    record_id: record.id(),
                    capability: name.to_string(),
                    timestamp: chrono::Utc::now(),
                });
                AttachResult::Attached(name.to_string())
            }
            Err(e) => {
                record.finish_attach(None, name);
                warn!(record_id = %record.id(), capability = name, error = %e, "Capability dropped");
                record.context().emit(EngineEvent::CapabilityDropped {
                    record_id: record.id(),
                    capability: name.to_string(),
                    reason: e.to_string(),
                    timestamp: chrono::Utc::now(),
                });
                AttachResult::Dropped(name.to_string(), e.to_string())
            }
        }
    }

    async fn run_attach(&self, record: &Arc<Record>, name: &str) -> Result<()> {
        let module = self
            .registry
            .get(name)
            .ok_or_else(|| Error::CapabilityUnavailable(format!("unknown capability '{}'", name)))?;

        let deps = module.depends_on();
        if !deps.is_empty() {
            self.wait_for(record, deps, self.wait_timeout).await?;
        }

        module.attach(record, self).await
    }

    /// True if `name` is attached to `record`
    pub fn has_capability(&self, record: &Record, name: &str) -> bool {
        record.has_capability(name)
    }

    /// Wait until every name in `names` is attached to `record`
    ///
    /// Fails with [`Error::Timeout`] if they are not all attached in time;
    /// a dropped capability never appears, so its dependents time out.
    pub async fn wait_for(&self, record: &Record, names: &[&str], timeout: Duration) -> Result<()> {
        let mut loaded = record.capability_watch();
        let wait = loaded.wait_for(|map| names.iter().all(|name| map.contains_key(*name)));

        let result = match tokio::time::timeout(timeout, wait).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(Error::Internal("capability watch closed".to_string())),
            Err(_) => Err(Error::Timeout(format!(
                "waiting for capabilities [{}]",
                names.join(", ")
            ))),
        };
        result
    }
}
