//! PII redaction for structured payloads headed into a prompt.
//!
//! Walks an arbitrary JSON value. String values under a sensitive key are
//! masked; nested objects are descended into; arrays and scalars pass through
//! untouched. Masks are fixed points, so redacting twice changes nothing.

use serde_json::{Map, Value};

/// Keys whose string values are always masked.
pub const SENSITIVE_KEYS: [&str; 5] = ["email", "displayName", "fullName", "phone", "address"];

/// Replacement for any value that looks like an email address.
pub const EMAIL_MASK: &str = "***@***.***";

/// Filler placed between the kept first and last characters.
pub const FILLER: &str = "***";

/// Return a redacted copy of `payload`.
pub fn redact(payload: &Value) -> Value {
    match payload {
        Value::Object(map) => Value::Object(redact_object(map)),
        other => other.clone(),
    }
}

fn redact_object(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .map(|(key, value)| {
            let redacted = match value {
                Value::String(s) if is_sensitive(key) => Value::String(mask(s)),
                Value::Object(inner) => Value::Object(redact_object(inner)),
                other => other.clone(),
            };
            (key.clone(), redacted)
        })
        .collect()
}

fn is_sensitive(key: &str) -> bool {
    SENSITIVE_KEYS.contains(&key)
}

/// Mask a single sensitive string.
pub fn mask(value: &str) -> String {
    if is_mask(value) {
        return value.to_string();
    }
    if value.contains('@') {
        return EMAIL_MASK.to_string();
    }

    let chars: Vec<char> = value.chars().collect();
    match chars.as_slice() {
        [first, .., last] if chars.len() > 2 => format!("{first}{FILLER}{last}"),
        _ => FILLER.to_string(),
    }
}

/// Whether `value` is already the output of [`mask`].
fn is_mask(value: &str) -> bool {
    if value == EMAIL_MASK || value == FILLER {
        return true;
    }
    let chars: Vec<char> = value.chars().collect();
    chars.len() == FILLER.len() + 2 && chars[1..chars.len() - 1].iter().all(|c| *c == '*')
}
