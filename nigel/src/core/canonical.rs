//! Canonical JSON text for candidate keys.
//!
//! Object fields are emitted in lexicographic key order at every depth and no
//! insignificant whitespace is written, so semantically equal values always
//! produce identical text regardless of input field order or formatting.

use serde_json::Value;

/// Serialize `value` canonically.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {
            out.push_str(&scalar_json(value));
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&string_json(key));
                out.push(':');
                write_canonical(item, out);
            }
            out.push('}');
        }
    }
}

// Scalars have exactly one serde_json rendering, so delegate escaping to it.
fn scalar_json(value: &Value) -> String {
    value.to_string()
}

fn string_json(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

/// Plain-text rendering used by template accessors: strings verbatim,
/// everything else as canonical JSON.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => canonical_json(other),
    }
}
