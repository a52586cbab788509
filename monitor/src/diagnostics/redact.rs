//! Secret redaction over arbitrary JSON documents

use serde_json::Value;

use crate::constants::diagnostics::{REDACTION_MARKER, SECRET_KEYS};

fn is_secret(key: &str) -> bool {
    SECRET_KEYS.iter().any(|secret| key.eq_ignore_ascii_case(secret))
}

/// Replace the value of every secret-bearing key, at any depth, with the marker
pub fn redact(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, inner) in map.iter_mut() {
                if is_secret(key) {
                    *inner = Value::from(REDACTION_MARKER);
                } else {
                    redact(inner);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact),
        _ => {}
    }
}

/// Redacted copy, leaving the input untouched
pub fn redacted(value: &Value) -> Value {
    let mut copy = value.clone();
    redact(&mut copy);
    copy
}
