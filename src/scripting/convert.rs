//! Conversions between interpreter values and JSON.
//!
//! Numbers follow JavaScript semantics on the way out: a float with no
//! fractional part is emitted as an integer, so `7.0` and `7` compare equal
//! once converted.

use rhai::{Array, Dynamic, Map, FLOAT, INT};
use serde_json::{Number, Value};

/// Largest float magnitude converted losslessly to an integer.
const MAX_SAFE_INTEGER: FLOAT = 9_007_199_254_740_991.0;

pub(crate) fn json_to_dynamic(value: &Value) -> Dynamic {
    match value {
        Value::Null => Dynamic::UNIT,
        Value::Bool(b) => Dynamic::from_bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Dynamic::from_int(i as INT),
            None => Dynamic::from_float(n.as_f64().unwrap_or(FLOAT::NAN)),
        },
        Value::String(s) => Dynamic::from(s.clone()),
        Value::Array(items) => Dynamic::from_array(items.iter().map(json_to_dynamic).collect()),
        Value::Object(fields) => Dynamic::from_map(
            fields
                .iter()
                .map(|(k, v)| (k.as_str().into(), json_to_dynamic(v)))
                .collect(),
        ),
    }
}

pub(crate) fn dynamic_to_json(value: &Dynamic) -> Value {
    let value = value.flatten_clone();

    if value.is_unit() {
        return Value::Null;
    }
    if let Ok(b) = value.as_bool() {
        return Value::Bool(b);
    }
    if let Ok(i) = value.as_int() {
        return Value::from(i);
    }
    if let Ok(f) = value.as_float() {
        return float_to_json(f);
    }
    if let Ok(c) = value.as_char() {
        return Value::String(c.to_string());
    }
    if value.is_string() {
        return Value::String(value.into_string().unwrap_or_default());
    }
    if let Some(items) = value.read_lock::<Array>() {
        return Value::Array(items.iter().map(dynamic_to_json).collect());
    }
    if let Some(fields) = value.read_lock::<Map>() {
        return Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.to_string(), dynamic_to_json(v)))
                .collect(),
        );
    }
    Value::String(value.to_string())
}

fn float_to_json(f: FLOAT) -> Value {
    if f.is_finite() && f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER {
        return Value::from(f as i64);
    }
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

/// Text stored when a script writes `value` into a variable.
///
/// Strings are stored as-is, unit as an empty string, everything else in
/// its JSON form.
pub(crate) fn dynamic_to_string(value: &Dynamic) -> String {
    match dynamic_to_json(value) {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Numeric view of a value, if it is an int or a float.
pub(crate) fn as_number(value: &Dynamic) -> Option<FLOAT> {
    let value = value.flatten_clone();
    if let Ok(i) = value.as_int() {
        return Some(i as FLOAT);
    }
    value.as_float().ok()
}

/// JavaScript `typeof`-style name of a value.
pub(crate) fn js_type_name(value: &Dynamic) -> &'static str {
    let value = value.flatten_clone();
    if value.is_unit() {
        "undefined"
    } else if value.is_bool() {
        "boolean"
    } else if value.is_int() || value.is_float() {
        "number"
    } else if value.is_string() || value.is_char() {
        "string"
    } else if value.is_array() {
        "array"
    } else if value.is_map() {
        "object"
    } else if value.is_fnptr() {
        "function"
    } else {
        "object"
    }
}

/// Short rendering of a value for assertion messages.
pub(crate) fn describe(value: &Dynamic) -> String {
    match dynamic_to_json(value) {
        Value::Null => "undefined".to_string(),
        Value::String(s) => format!("'{}'", s),
        other => other.to_string(),
    }
}
