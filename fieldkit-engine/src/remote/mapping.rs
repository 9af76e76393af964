//! Canonical field name <-> wire key mapping

use serde_json::{Map, Value};

use super::{Params, Prediction};

/// (canonical field, wire key)
pub const FIELD_KEYS: &[(&str, &str)] = &[
    ("country_code", "countryCode"),
    ("subdivision_code", "subdivisionCode"),
    ("postal_code", "postCode"),
    ("locality", "cityName"),
    ("street_name", "street"),
    ("building_number", "houseNumber"),
    ("street_full", "streetFull"),
    ("additional_info", "additionalInfo"),
];

pub fn to_wire_key(field: &str) -> Option<&'static str> {
    FIELD_KEYS
        .iter()
        .find(|(canonical, _)| *canonical == field)
        .map(|(_, wire)| *wire)
}

pub fn from_wire_key(key: &str) -> Option<&'static str> {
    FIELD_KEYS
        .iter()
        .find(|(_, wire)| *wire == key)
        .map(|(canonical, _)| *canonical)
}

/// Build a wire params object, skipping empty and unmapped fields
pub fn params_to_wire(params: &Params) -> Value {
    let mut object = Map::new();
    for (field, value) in params {
        if value.is_empty() {
            continue;
        }
        if let Some(key) = to_wire_key(field) {
            object.insert(key.to_string(), Value::String(value.clone()));
        }
    }
    Value::Object(object)
}

/// Parse one wire prediction object
///
/// Unmapped keys are dropped; numbers are kept as their text form.
pub fn prediction_from_wire(value: &Value) -> Option<Prediction> {
    let object = value.as_object()?;
    let fields = object
        .iter()
        .filter_map(|(key, value)| {
            let field = from_wire_key(key)?;
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => return None,
            };
            Some((field.to_string(), text))
        })
        .collect();
    Some(Prediction { fields })
}

/// Status tokens from `result.status` (a list or a single string)
pub fn status_from_wire(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        Some(Value::String(token)) => vec![token.clone()],
        _ => Vec::new(),
    }
}

/// Predictions from `result.predictions`
pub fn predictions_from_wire(value: Option<&Value>) -> Vec<Prediction> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(prediction_from_wire).collect())
        .unwrap_or_default()
}
