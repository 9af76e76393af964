//! Address check capability
//!
//! Marks the record dirty whenever a user-editable address field commits,
//! schedules a check when editing of an address field stops, and parks the
//! record's [`AddressChecker`] as an extension.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::trace;

use fieldkit_common::Result;

use super::address::ADDRESS_FIELDS;
use super::{names, Capability, CapabilityLoader};
use crate::field::{BlurListener, ChangeEvent, PostCommitHook};
use crate::record::Record;
use crate::validation::{AddressChecker, CheckPolicy};

const DEPENDENCIES: &[&str] = &[names::ADDRESS];

pub struct AddressCheckCapability;

impl AddressCheckCapability {
    /// Checker attached to `record`, if the capability loaded
    pub fn checker(record: &Record) -> Option<Arc<AddressChecker>> {
        record.extension::<AddressChecker>(names::ADDRESS_CHECK)
    }
}

#[async_trait]
impl Capability for AddressCheckCapability {
    fn name(&self) -> &str {
        names::ADDRESS_CHECK
    }

    fn depends_on(&self) -> &[&'static str] {
        DEPENDENCIES
    }

    async fn attach(&self, record: &Arc<Record>, _loader: &CapabilityLoader) -> Result<()> {
        let policy = CheckPolicy::from(&record.context().config.check);
        let checker = AddressChecker::new(policy);

        let marker: Arc<dyn PostCommitHook> = Arc::new(DirtyMarker);
        for field in ADDRESS_FIELDS {
            record.add_post_commit_hook(field, marker.clone())?;
        }
        record.add_blur_listener(Arc::new(BlurCheck {
            checker: Arc::clone(&checker),
        }));
        record.insert_extension(names::ADDRESS_CHECK, checker);
        Ok(())
    }
}

struct DirtyMarker;

#[async_trait]
impl PostCommitHook for DirtyMarker {
    async fn after_commit(&self, record: &Arc<Record>, change: &ChangeEvent) {
        trace!(record_id = %record.id(), field = %change.field, "Address marked dirty");
        record.mark_changed();
    }
}

struct BlurCheck {
    checker: Arc<AddressChecker>,
}

impl BlurListener for BlurCheck {
    fn on_blur(&self, record: &Arc<Record>, field: &str) {
        if ADDRESS_FIELDS.contains(&field) && record.is_changed() {
            self.checker.schedule_blur_check(record);
        }
    }
}
