//! Capability modules
//!
//! A capability is a named, stateless descriptor that attaches fields, hooks
//! and extension state to a record. Capabilities are resolved by name through
//! a [`CapabilityRegistry`] and attached by the [`CapabilityLoader`]; a
//! capability that depends on another one waits for it on the record before
//! doing its own work.

pub mod address;
mod address_check;
mod autocomplete;
mod email;
mod loader;

pub use address::{compose_street_full, split_street_full, AddressCapability, ADDRESS_FIELDS};
pub use address_check::AddressCheckCapability;
pub use autocomplete::AutocompleteCapability;
pub use email::{EmailCapability, EMAIL, EMAIL_STATUS};
pub use loader::{AttachReport, CapabilityLoader};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use fieldkit_common::Result;

use crate::record::Record;
use crate::remote::PredictionKind;

/// Capability names shipped with the engine
pub mod names {
    pub const ADDRESS: &str = "address";
    pub const ADDRESS_CHECK: &str = "address_check";
    pub const EMAIL: &str = "email";
    pub const POSTAL_CODE_AUTOCOMPLETE: &str = "postal_code_autocomplete";
    pub const LOCALITY_AUTOCOMPLETE: &str = "locality_autocomplete";
    pub const STREET_NAME_AUTOCOMPLETE: &str = "street_name_autocomplete";
    pub const STREET_FULL_AUTOCOMPLETE: &str = "street_full_autocomplete";
}

/// Proof that a capability attached to a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityToken {
    pub name: String,
    pub attached_at: DateTime<Utc>,
}

impl CapabilityToken {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attached_at: Utc::now(),
        }
    }
}

/// A named feature module attachable to a record
#[async_trait]
pub trait Capability: Send + Sync {
    /// Registry name
    fn name(&self) -> &str;

    /// Capabilities that must be attached first
    fn depends_on(&self) -> &[&'static str] {
        &[]
    }

    /// Attach fields, hooks and state to `record`
    ///
    /// Called at most once per record. An error drops the capability.
    async fn attach(&self, record: &Arc<Record>, loader: &CapabilityLoader) -> Result<()>;
}

/// Capability modules keyed by name
#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    modules: BTreeMap<String, Arc<dyn Capability>>,
}

impl CapabilityRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in capability
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(AddressCapability));
        registry.register(Arc::new(AddressCheckCapability));
        registry.register(Arc::new(EmailCapability));
        for kind in PredictionKind::all() {
            registry.register(Arc::new(AutocompleteCapability::new(kind)));
        }
        registry
    }

    /// Add or replace a module
    pub fn register(&mut self, module: Arc<dyn Capability>) {
        self.modules.insert(module.name().to_string(), module);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.modules.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.modules.keys().cloned().collect()
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("modules", &self.names())
            .finish()
    }
}
