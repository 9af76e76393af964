//! Address status vocabulary and normalization
//!
//! Raw remote status (wire codes such as `A1000` or canonical tokens) is
//! normalized to exactly one top-level token plus sub-flags, then per-field
//! tokens are derived from the top-level token and the first prediction.

use serde::{Deserialize, Serialize};

use crate::capability::address::{
    BUILDING_NUMBER, COUNTRY_CODE, LOCALITY, POSTAL_CODE, STREET_NAME,
};
use crate::remote::{Params, Prediction};

pub const ADDRESS_CORRECT: &str = "address_correct";
pub const ADDRESS_NEEDS_CORRECTION: &str = "address_needs_correction";
pub const ADDRESS_MULTIPLE_VARIANTS: &str = "address_multiple_variants";
pub const ADDRESS_NOT_FOUND: &str = "address_not_found";

pub const ADDRESS_MINOR_CORRECTION: &str = "address_minor_correction";
pub const BUILDING_NUMBER_IS_MISSING: &str = "building_number_is_missing";
pub const BUILDING_NUMBER_NOT_FOUND: &str = "building_number_not_found";
pub const ADDRESS_SELECTED_AUTOMATICALLY: &str = "address_selected_automatically";
pub const ADDRESS_SELECTED_BY_CUSTOMER: &str = "address_selected_by_customer";

/// Fields that get `{field}_correct` / `{field}_needs_correction` tokens
pub const CHECKED_FIELDS: &[&str] = &[
    COUNTRY_CODE,
    POSTAL_CODE,
    LOCALITY,
    STREET_NAME,
    BUILDING_NUMBER,
];

/// The four mutually exclusive top-level outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopLevelStatus {
    Correct,
    NeedsCorrection,
    MultipleVariants,
    NotFound,
}

impl TopLevelStatus {
    pub fn token(self) -> &'static str {
        match self {
            TopLevelStatus::Correct => ADDRESS_CORRECT,
            TopLevelStatus::NeedsCorrection => ADDRESS_NEEDS_CORRECTION,
            TopLevelStatus::MultipleVariants => ADDRESS_MULTIPLE_VARIANTS,
            TopLevelStatus::NotFound => ADDRESS_NOT_FOUND,
        }
    }

    /// Parse a wire code or canonical token
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "A1000" | ADDRESS_CORRECT => Some(TopLevelStatus::Correct),
            "A1100" | ADDRESS_NEEDS_CORRECTION => Some(TopLevelStatus::NeedsCorrection),
            "A1110" | ADDRESS_MULTIPLE_VARIANTS => Some(TopLevelStatus::MultipleVariants),
            "A2000" | ADDRESS_NOT_FOUND => Some(TopLevelStatus::NotFound),
            _ => None,
        }
    }

    /// Higher wins when a response carries several top-level codes
    fn precedence(self) -> u8 {
        match self {
            TopLevelStatus::Correct => 0,
            TopLevelStatus::NeedsCorrection => 1,
            TopLevelStatus::MultipleVariants => 2,
            TopLevelStatus::NotFound => 3,
        }
    }
}

/// Map raw tokens to canonical tokens
///
/// The result starts with exactly one top-level token (`address_not_found`
/// if none was recognized), followed by the remaining tokens in their
/// original order without duplicates.
pub fn normalize(raw: &[String]) -> Vec<String> {
    let top = raw
        .iter()
        .filter_map(|token| TopLevelStatus::from_token(token))
        .max_by_key(|status| status.precedence())
        .unwrap_or(TopLevelStatus::NotFound);

    let mut normalized = vec![top.token().to_string()];
    for token in raw {
        if TopLevelStatus::from_token(token).is_some() || normalized.contains(token) {
            continue;
        }
        normalized.push(token.clone());
    }
    normalized
}

/// Top-level status of a normalized token set
pub fn top_level(status: &[String]) -> TopLevelStatus {
    status
        .iter()
        .find_map(|token| TopLevelStatus::from_token(token))
        .unwrap_or(TopLevelStatus::NotFound)
}

pub fn has(status: &[String], token: &str) -> bool {
    status.iter().any(|t| t == token)
}

fn push_unique(status: &mut Vec<String>, token: &str) {
    if !has(status, token) {
        status.push(token.to_string());
    }
}

fn same_text(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// Fields whose input disagrees with `prediction`
fn differing_fields(input: &Params, prediction: &Prediction) -> Vec<&'static str> {
    CHECKED_FIELDS
        .iter()
        .copied()
        .filter(|field| {
            let suggested = prediction.get(field);
            let typed = input.get(*field).map(String::as_str).unwrap_or("");
            !suggested.is_empty() && !same_text(typed, suggested)
        })
        .collect()
}

/// Normalize raw remote status and derive sub-flags and per-field tokens
///
/// `input` holds the address that was checked. Per-field tokens are
/// recomputed from scratch; any per-field tokens in `raw` are dropped.
pub fn compute(raw: &[String], predictions: &[Prediction], input: &Params) -> Vec<String> {
    let mut status: Vec<String> = normalize(raw)
        .into_iter()
        .filter(|token| !is_field_token(token))
        .collect();
    let top = top_level(&status);
    let first = predictions.first();

    if top == TopLevelStatus::NeedsCorrection {
        let typed_number = input.get(BUILDING_NUMBER).map(String::as_str).unwrap_or("");
        if typed_number.trim().is_empty() {
            push_unique(&mut status, BUILDING_NUMBER_IS_MISSING);
        } else if first.is_some_and(|p| p.get(BUILDING_NUMBER).is_empty()) {
            push_unique(&mut status, BUILDING_NUMBER_NOT_FOUND);
        }

        if let Some(prediction) = first {
            let differing = differing_fields(input, prediction);
            if differing.len() == 1 && differing[0] != BUILDING_NUMBER {
                push_unique(&mut status, ADDRESS_MINOR_CORRECTION);
            }
        }
    }

    status.extend(field_tokens(top, first, input));
    status
}

/// `{field}_correct` / `{field}_needs_correction` for every checked field
pub fn field_tokens(
    top: TopLevelStatus,
    first: Option<&Prediction>,
    input: &Params,
) -> Vec<String> {
    let differing = match (top, first) {
        (TopLevelStatus::Correct, _) => Vec::new(),
        (TopLevelStatus::NotFound, _) | (_, None) => CHECKED_FIELDS.to_vec(),
        (_, Some(prediction)) => differing_fields(input, prediction),
    };

    CHECKED_FIELDS
        .iter()
        .map(|field| {
            if differing.contains(field) {
                format!("{}_needs_correction", field)
            } else {
                format!("{}_correct", field)
            }
        })
        .collect()
}

/// Status after the user (or the engine) settled on an address
pub fn settled(selection_flag: &str) -> Vec<String> {
    compute(
        &[ADDRESS_CORRECT.to_string(), selection_flag.to_string()],
        &[],
        &Params::new(),
    )
}

fn is_field_token(token: &str) -> bool {
    CHECKED_FIELDS.iter().any(|field| {
        token
            .strip_prefix(field)
            .is_some_and(|rest| rest == "_correct" || rest == "_needs_correction")
    })
}
