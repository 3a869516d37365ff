//! Response normalization
//!
//! Coerces whatever JSON a handler produced into a [`CanonicalResponse`].
//! Every runtime's runner already shapes its result this way; running the
//! same rules again on the host keeps the contract independent of the runner.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::types::CanonicalResponse;

/// Normalize an arbitrary JSON value into a canonical response.
///
/// Objects are read as response records (`statusCode`, `headers`, `body`).
/// Any other value, including `null` and arrays, becomes the body of a 200
/// response. This function never fails.
pub fn normalize(raw: &Value) -> CanonicalResponse {
    match raw {
        Value::Object(fields) => CanonicalResponse {
            status_code: status_code(fields.get("statusCode")),
            headers: headers(fields.get("headers")),
            body: body(fields.get("body")),
        },
        other => CanonicalResponse {
            status_code: CanonicalResponse::DEFAULT_STATUS,
            headers: BTreeMap::new(),
            body: body(Some(other)),
        },
    }
}

/// Coerce a status code to `u16`, falling back to 200
fn status_code(raw: Option<&Value>) -> u16 {
    let parsed = match raw {
        Some(Value::Number(n)) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0 && *f >= 0.0)
                .map(|f| f as u64)
        }),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        _ => None,
    };

    parsed
        .and_then(|code| u16::try_from(code).ok())
        .unwrap_or(CanonicalResponse::DEFAULT_STATUS)
}

/// Accept headers only when they are a plain object
fn headers(raw: Option<&Value>) -> BTreeMap<String, String> {
    let Some(Value::Object(map)) = raw else {
        return BTreeMap::new();
    };

    header_map(map)
}

fn header_map(map: &Map<String, Value>) -> BTreeMap<String, String> {
    map.iter()
        .filter_map(|(name, value)| match value {
            Value::Null => None,
            Value::String(s) => Some((name.clone(), s.clone())),
            other => Some((name.clone(), serialize(other))),
        })
        .collect()
}

fn body(raw: Option<&Value>) -> String {
    match raw {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => serialize(other),
    }
}

fn serialize(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!("[unserializable value: {e}]"))
}
