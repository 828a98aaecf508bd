//! String-to-typed conversions for values that arrive as text (path, query, header,
//! cookie). Body values are never passed through here.

use serde_json::{Map, Number, Value};

pub fn to_integer(raw: &str) -> Option<Value> {
    let s = raw.trim();
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::from(i));
    }
    s.parse::<u64>().ok().map(Value::from)
}

pub fn to_number(raw: &str) -> Option<Value> {
    let s = raw.trim();
    if let Some(int) = to_integer(s) {
        return Some(int);
    }
    s.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

pub fn to_boolean(raw: &str) -> Option<Value> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(Value::Bool(true)),
        "false" | "0" => Some(Value::Bool(false)),
        _ => None,
    }
}

/// `delimiter`-separated list; empty input is an empty array.
pub fn to_array(raw: &str, delimiter: char) -> Value {
    if raw.is_empty() {
        return Value::Array(Vec::new());
    }
    Value::Array(raw.split(delimiter).map(|s| Value::String(s.to_string())).collect())
}

/// JSON object text, else `key,value,key,value` pairs.
pub fn to_object(raw: &str) -> Option<Value> {
    if let Ok(v @ Value::Object(_)) = serde_json::from_str::<Value>(raw) {
        return Some(v);
    }
    let parts: Vec<&str> = raw.split(',').collect();
    if parts.len() % 2 != 0 {
        return None;
    }
    let mut map = Map::new();
    for pair in parts.chunks(2) {
        map.insert(pair[0].to_string(), Value::String(pair[1].to_string()));
    }
    Some(Value::Object(map))
}

/// Whole-number floats such as `3.0` count as integers.
pub fn integral(value: &Value) -> Option<Value> {
    let Value::Number(n) = value else {
        return None;
    };
    if n.is_i64() || n.is_u64() {
        return Some(value.clone());
    }
    let f = n.as_f64()?;
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        return Some(Value::from(f as i64));
    }
    None
}
