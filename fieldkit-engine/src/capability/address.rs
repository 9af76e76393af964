//! Base address capability
//!
//! Registers the canonical address fields and keeps the two street
//! representations (`street_full` vs. `street_name` + `building_number`) in
//! sync. The representation written most recently wins: a hook only rewrites
//! the other side when the writer's local-state stamp is strictly newer than
//! the stamps of the fields it would overwrite.

use async_trait::async_trait;
use std::sync::{Arc, Weak};
use tracing::trace;

use fieldkit_common::{FieldValue, Result};

use super::{names, Capability, CapabilityLoader};
use crate::field::{ChangeEvent, FieldSpec, PostCommitHook, SetFilter, TextNormalizer};
use crate::record::Record;
use crate::remote::Prediction;
use crate::validation::status;

pub const COUNTRY_CODE: &str = "country_code";
pub const SUBDIVISION_CODE: &str = "subdivision_code";
pub const POSTAL_CODE: &str = "postal_code";
pub const LOCALITY: &str = "locality";
pub const STREET_FULL: &str = "street_full";
pub const STREET_NAME: &str = "street_name";
pub const BUILDING_NUMBER: &str = "building_number";
pub const ADDITIONAL_INFO: &str = "additional_info";
pub const ADDRESS_STATUS: &str = "address_status";
pub const ADDRESS_PREDICTIONS: &str = "address_predictions";

/// User-editable address fields (sent to the remote check)
pub const ADDRESS_FIELDS: &[&str] = &[
    COUNTRY_CODE,
    SUBDIVISION_CODE,
    POSTAL_CODE,
    LOCALITY,
    STREET_FULL,
    STREET_NAME,
    BUILDING_NUMBER,
    ADDITIONAL_INFO,
];

/// Countries writing the building number before the street name
const NUMBER_FIRST_COUNTRIES: &[&str] = &["us", "gb", "fr", "ca", "au", "ie", "nz"];

pub struct AddressCapability;

#[async_trait]
impl Capability for AddressCapability {
    fn name(&self) -> &str {
        names::ADDRESS
    }

    async fn attach(&self, record: &Arc<Record>, _loader: &CapabilityLoader) -> Result<()> {
        record.register_field(
            FieldSpec::new(COUNTRY_CODE).with_filter(Arc::new(TextNormalizer::upper())),
        );
        record.register_field(FieldSpec::new(SUBDIVISION_CODE));
        record.register_field(
            FieldSpec::new(POSTAL_CODE).with_filter(Arc::new(TextNormalizer::trim())),
        );
        record.register_field(FieldSpec::new(LOCALITY));
        record.register_field(FieldSpec::new(STREET_FULL));
        record.register_field(FieldSpec::new(STREET_NAME));
        record.register_field(FieldSpec::new(BUILDING_NUMBER));
        record.register_field(FieldSpec::new(ADDITIONAL_INFO));
        record.register_field(
            FieldSpec::new(ADDRESS_STATUS)
                .with_filter(Arc::new(StatusFilter {
                    record: Arc::downgrade(record),
                }))
                .with_initial(FieldValue::List(Vec::new())),
        );
        record.register_field(
            FieldSpec::new(ADDRESS_PREDICTIONS).with_initial(FieldValue::List(Vec::new())),
        );

        let propagation: Arc<dyn PostCommitHook> = Arc::new(StreetPropagation);
        record.add_post_commit_hook(STREET_FULL, propagation.clone())?;
        record.add_post_commit_hook(STREET_NAME, propagation.clone())?;
        record.add_post_commit_hook(BUILDING_NUMBER, propagation)?;
        Ok(())
    }
}

/// street_full <-> street_name/building_number propagation
struct StreetPropagation;

#[async_trait]
impl PostCommitHook for StreetPropagation {
    async fn after_commit(&self, record: &Arc<Record>, change: &ChangeEvent) {
        let stamp = change.local_state;

        if change.field == STREET_FULL {
            let newest_part = record
                .local_state(STREET_NAME)
                .max(record.local_state(BUILDING_NUMBER));
            if stamp <= newest_part {
                return;
            }
            let full = change.new_value.as_str().unwrap_or_default();
            let (name, number) = split_street_full(full);
            trace!(record_id = %record.id(), stamp, "Splitting street_full");
            record.set_field_stamped(STREET_NAME, name, stamp).await;
            record.set_field_stamped(BUILDING_NUMBER, number, stamp).await;
        } else {
            if stamp <= record.local_state(STREET_FULL) {
                return;
            }
            let full = compose_street_full(
                &record.get_text(STREET_NAME),
                &record.get_text(BUILDING_NUMBER),
                &record.get_text(COUNTRY_CODE),
            );
            trace!(record_id = %record.id(), stamp, "Composing street_full");
            record.set_field_stamped(STREET_FULL, full, stamp).await;
        }
    }
}

/// Normalizes every status write and re-derives flags and per-field tokens
///
/// Derivation uses the stored `address_predictions` and the current address
/// input, so predictions must be written before the status they belong to.
/// An empty list clears the status.
struct StatusFilter {
    record: Weak<Record>,
}

#[async_trait]
impl SetFilter for StatusFilter {
    async fn apply(&self, value: FieldValue) -> Result<FieldValue> {
        let raw = value.text_items();
        let record = match self.record.upgrade() {
            Some(record) if !raw.is_empty() => record,
            _ => return Ok(value),
        };

        let predictions: Vec<Prediction> = record
            .get(ADDRESS_PREDICTIONS)
            .and_then(|stored| {
                stored.as_list().map(|items| {
                    items
                        .iter()
                        .filter_map(Prediction::from_field_value)
                        .collect::<Vec<_>>()
                })
            })
            .unwrap_or_default();
        let input = record.text_params(ADDRESS_FIELDS);

        Ok(FieldValue::from(status::compute(&raw, &predictions, &input)))
    }
}

fn is_building_number(token: &str) -> bool {
    token.chars().next().is_some_and(|c| c.is_ascii_digit())
}

/// Split a full street line into (street name, building number)
///
/// The building number is the trailing token starting with a digit, or
/// failing that the leading one. Without such a token the whole line is the
/// street name.
pub fn split_street_full(full: &str) -> (String, String) {
    let tokens: Vec<&str> = full.split_whitespace().collect();
    if tokens.len() < 2 {
        return match tokens.first() {
            Some(token) if is_building_number(token) => (String::new(), token.to_string()),
            Some(token) => (token.to_string(), String::new()),
            None => (String::new(), String::new()),
        };
    }

    let last = tokens.len() - 1;
    if is_building_number(tokens[last]) {
        return (tokens[..last].join(" "), tokens[last].to_string());
    }
    if is_building_number(tokens[0]) {
        return (tokens[1..].join(" "), tokens[0].to_string());
    }
    (tokens.join(" "), String::new())
}

/// Compose a full street line in the order usual for `country_code`
pub fn compose_street_full(name: &str, number: &str, country_code: &str) -> String {
    let name = name.trim();
    let number = number.trim();
    if number.is_empty() {
        return name.to_string();
    }
    if name.is_empty() {
        return number.to_string();
    }

    let country = country_code.trim().to_ascii_lowercase();
    if NUMBER_FIRST_COUNTRIES.contains(&country.as_str()) {
        format!("{} {}", number, name)
    } else {
        format!("{} {}", name, number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_trailing_number() {
        assert_eq!(
            split_street_full("Unter den Linden 77"),
            ("Unter den Linden".to_string(), "77".to_string())
        );
    }

    #[test]
    fn test_split_leading_number() {
        assert_eq!(
            split_street_full("221b Baker Street"),
            ("Baker Street".to_string(), "221b".to_string())
        );
    }

    #[test]
    fn test_split_without_number() {
        assert_eq!(
            split_street_full("  Hauptstraße "),
            ("Hauptstraße".to_string(), String::new())
        );
        assert_eq!(split_street_full(""), (String::new(), String::new()));
    }

    #[test]
    fn test_compose_order_by_country() {
        assert_eq!(compose_street_full("Invalidenstraße", "117", "DE"), "Invalidenstraße 117");
        assert_eq!(compose_street_full("Baker Street", "221b", "GB"), "221b Baker Street");
        assert_eq!(compose_street_full("Main St", "", "us"), "Main St");
        assert_eq!(compose_street_full("", "5", "de"), "5");
    }
}
