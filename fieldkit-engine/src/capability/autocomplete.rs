//! Autocomplete capabilities (postal code, locality, street name, full street)

use async_trait::async_trait;
use std::sync::Arc;

use fieldkit_common::Result;

use super::{names, Capability, CapabilityLoader};
use crate::prediction::PredictionPipeline;
use crate::record::Record;
use crate::remote::PredictionKind;

const DEPENDENCIES: &[&str] = &[names::ADDRESS];

/// Turns an address field into a chunked field with a prediction pipeline
///
/// The pipeline is stored as a record extension under the capability name.
pub struct AutocompleteCapability {
    kind: PredictionKind,
}

impl AutocompleteCapability {
    pub fn new(kind: PredictionKind) -> Self {
        Self { kind }
    }

    /// Pipeline attached to `record` for `kind`, if the capability loaded
    pub fn pipeline(record: &Record, kind: PredictionKind) -> Option<Arc<PredictionPipeline>> {
        record.extension::<PredictionPipeline>(kind.capability())
    }
}

#[async_trait]
impl Capability for AutocompleteCapability {
    fn name(&self) -> &str {
        self.kind.capability()
    }

    fn depends_on(&self) -> &[&'static str] {
        DEPENDENCIES
    }

    async fn attach(&self, record: &Arc<Record>, _loader: &CapabilityLoader) -> Result<()> {
        let field = self.kind.field();
        record.enable_chunk(field)?;

        let pipeline = PredictionPipeline::new(self.kind, record.context().config.prediction.clone());
        record.add_chunk_listener(field, pipeline.clone())?;
        record.insert_extension(self.kind.capability(), pipeline);
        Ok(())
    }
}
