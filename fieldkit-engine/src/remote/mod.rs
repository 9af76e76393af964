//! Remote validation service
//!
//! The engine only talks to the [`RemoteService`] trait: submit structured
//! params, get back status tokens and/or predictions. [`JsonRpcClient`] is the
//! production transport; tests substitute in-memory fakes.

mod client;
pub mod mapping;

pub use client::JsonRpcClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use fieldkit_common::{FieldValue, Result};

/// Structured request params keyed by canonical field name
pub type Params = BTreeMap<String, String>;

/// Autocomplete request family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionKind {
    PostalCode,
    Locality,
    StreetName,
    StreetFull,
}

impl PredictionKind {
    /// Canonical field the predictions are for
    pub fn field(self) -> &'static str {
        match self {
            PredictionKind::PostalCode => "postal_code",
            PredictionKind::Locality => "locality",
            PredictionKind::StreetName => "street_name",
            PredictionKind::StreetFull => "street_full",
        }
    }

    /// JSON-RPC method serving this kind
    pub fn method(self) -> &'static str {
        match self {
            PredictionKind::PostalCode => "postCodeAutocomplete",
            PredictionKind::Locality => "cityNameAutocomplete",
            PredictionKind::StreetName | PredictionKind::StreetFull => "streetAutocomplete",
        }
    }

    /// Capability name that attaches this kind of autocomplete
    pub fn capability(self) -> &'static str {
        match self {
            PredictionKind::PostalCode => "postal_code_autocomplete",
            PredictionKind::Locality => "locality_autocomplete",
            PredictionKind::StreetName => "street_name_autocomplete",
            PredictionKind::StreetFull => "street_full_autocomplete",
        }
    }

    pub fn all() -> [PredictionKind; 4] {
        [
            PredictionKind::PostalCode,
            PredictionKind::Locality,
            PredictionKind::StreetName,
            PredictionKind::StreetFull,
        ]
    }
}

/// One candidate value set returned by the remote service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Prediction {
    /// Candidate values keyed by canonical field name
    pub fields: BTreeMap<String, String>,
}

impl Prediction {
    pub fn new<I, K, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Candidate value for `field` (empty if absent)
    pub fn get(&self, field: &str) -> &str {
        self.fields.get(field).map(String::as_str).unwrap_or("")
    }

    pub fn to_field_value(&self) -> FieldValue {
        FieldValue::from(self.fields.clone())
    }

    /// Rebuild from a stored `address_predictions` item
    pub fn from_field_value(value: &FieldValue) -> Option<Self> {
        let map = value.as_map()?;
        Some(Self {
            fields: map
                .iter()
                .filter_map(|(k, v)| Some((k.clone(), v.as_str()?.to_string())))
                .collect(),
        })
    }
}

/// Result of an address check
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResponse {
    /// Raw status tokens (wire codes or canonical tokens)
    pub status: Vec<String>,
    pub predictions: Vec<Prediction>,
}

/// Remote validation service
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Autocomplete lookup for one field
    async fn predict(&self, kind: PredictionKind, params: &Params) -> Result<Vec<Prediction>>;

    /// Full address check
    async fn check_address(&self, params: &Params) -> Result<CheckResponse>;

    /// Email check, returning status tokens
    async fn check_email(&self, email: &str) -> Result<Vec<String>>;
}
