//! Canonical field values
//!
//! A record field holds text, a list (status tokens, prediction lists) or a
//! structured map. Equality is structural so the field pipeline can skip
//! writes that do not change anything.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Value stored in a canonical field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Plain text (most input fields)
    Text(String),
    /// Ordered list (status tokens, prediction sets)
    List(Vec<FieldValue>),
    /// Structured value keyed by canonical field name
    Map(BTreeMap<String, FieldValue>),
}

impl FieldValue {
    /// Empty text value
    pub fn empty() -> Self {
        FieldValue::Text(String::new())
    }

    /// True for empty text, empty lists and empty maps
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Text(s) => s.is_empty(),
            FieldValue::List(items) => items.is_empty(),
            FieldValue::Map(map) => map.is_empty(),
        }
    }

    /// Borrow the text content, if this is a text value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow list items, if this is a list value
    pub fn as_list(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Borrow the map, if this is a structured value
    pub fn as_map(&self) -> Option<&BTreeMap<String, FieldValue>> {
        match self {
            FieldValue::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Collect the text items of a list value (non-text items are skipped)
    pub fn text_items(&self) -> Vec<String> {
        match self {
            FieldValue::List(items) => items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            FieldValue::Text(s) if !s.is_empty() => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    /// Representation pushed into external UI elements
    ///
    /// Text is passed through, lists of text are comma-joined and anything
    /// else is rendered as compact JSON.
    pub fn to_display(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::List(items) if items.iter().all(|i| i.as_str().is_some()) => {
                self.text_items().join(",")
            }
            other => serde_json::to_string(other).unwrap_or_default(),
        }
    }
}

impl Default for FieldValue {
    fn default() -> Self {
        FieldValue::empty()
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display())
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(values: Vec<String>) -> Self {
        FieldValue::List(values.into_iter().map(FieldValue::Text).collect())
    }
}

impl From<BTreeMap<String, String>> for FieldValue {
    fn from(map: BTreeMap<String, String>) -> Self {
        FieldValue::Map(map.into_iter().map(|(k, v)| (k, FieldValue::Text(v))).collect())
    }
}
