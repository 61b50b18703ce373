// src/coerce.rs
// Field-Value Coercer (C9): normalises per-type input values for storage
// and for filter binding.
//
// Applied on ingress (before `CacheStore::put_records`) and when binding
// filter values during compilation. Invariant: `coerce` is idempotent on
// its own output (`put_record; get_record == normalise(r)` round-trips).

use serde_json::{Map, Value};

use crate::registry::FieldType;

/// Coerce one record field value to its canonical on-disk shape.
pub fn coerce(field_type: FieldType, value: Value) -> Value {
    match field_type {
        FieldType::YesNo => coerce_yes_no(value),
        FieldType::Number => coerce_number(value),
        FieldType::Date | FieldType::DueDate | FieldType::DateRange => value, // nested date objects retained verbatim
        FieldType::Status => coerce_status(value),
        FieldType::SingleSelect => value, // sometimes plain string, sometimes object — left as-is
        FieldType::MultiSelect | FieldType::User | FieldType::LinkedRecord => coerce_array(value),
        FieldType::RichDocument => coerce_rich_document(value),
        FieldType::Text | FieldType::File | FieldType::System => value,
    }
}

/// Booleans stored as `0`/`1` integers where the underlying store is
/// SQL-like.
fn coerce_yes_no(value: Value) -> Value {
    match value {
        Value::Bool(b) => Value::from(if b { 1 } else { 0 }),
        Value::String(s) => {
            let truthy = matches!(s.to_lowercase().as_str(), "true" | "yes" | "1");
            Value::from(if truthy { 1 } else { 0 })
        }
        Value::Number(n) => Value::from(if n.as_f64().unwrap_or(0.0) != 0.0 { 1 } else { 0 }),
        other => other,
    }
}

/// Currency/percent/number/rating/duration strings coerced to decimals.
fn coerce_number(value: Value) -> Value {
    match &value {
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            match cleaned.parse::<f64>() {
                Ok(n) => serde_json::Number::from_f64(n)
                    .map(Value::Number)
                    .unwrap_or(value),
                Err(_) => value,
            }
        }
        _ => value,
    }
}

/// Status is always stored as the full `{value, updated_on}` object.
fn coerce_status(value: Value) -> Value {
    match value {
        Value::Object(_) => value,
        Value::String(s) => {
            let mut map = Map::new();
            map.insert("value".to_string(), Value::String(s));
            map.insert("updated_on".to_string(), Value::Null);
            Value::Object(map)
        }
        other => other,
    }
}

/// Array-valued user/linked/multi-select fields are always materialised
/// as arrays even when the upstream collapses a single value.
fn coerce_array(value: Value) -> Value {
    match value {
        Value::Array(_) => value,
        Value::Null => Value::Array(Vec::new()),
        other => Value::Array(vec![other]),
    }
}

/// Rich-document values retain `data`, `html`, `preview` sub-fields; the
/// shaper later chooses one.
fn coerce_rich_document(value: Value) -> Value {
    match value {
        Value::Object(ref map) if map.contains_key("data") || map.contains_key("html") => value,
        Value::String(s) => {
            let mut map = Map::new();
            map.insert("data".to_string(), Value::String(s.clone()));
            map.insert("html".to_string(), Value::Null);
            map.insert("preview".to_string(), Value::String(s));
            Value::Object(map)
        }
        other => other,
    }
}
