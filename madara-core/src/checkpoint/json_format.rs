//! JSON dump of a checkpoint state: `{ "name": value, ... }`.

use crate::record::{Record, Variant};
use serde_json::{Map, Value};

fn to_json(record: &Record) -> Value {
    match record.variant() {
        Variant::Empty => Value::Null,
        Variant::Integer(n) => Value::from(*n),
        Variant::Double(d) => serde_json::Number::from_f64(*d).map(Value::Number).unwrap_or(Value::Null),
        Variant::String(s) => Value::String(s.clone()),
        Variant::IntegerArray(a) => Value::Array(a.iter().map(|n| Value::from(*n)).collect()),
        Variant::DoubleArray(a) => Value::Array(
            a.iter()
                .map(|d| serde_json::Number::from_f64(*d).map(Value::Number).unwrap_or(Value::Null))
                .collect(),
        ),
        Variant::Binary(bytes, _) => Value::String(bytes.iter().map(|b| format!("{:02x}", b)).collect()),
        Variant::Any(payload) => payload.fmt_json(),
    }
}

/// Renders `records` as a single JSON object keyed by name.
pub fn save_as_json(records: &[(String, Record)]) -> String {
    let mut map = Map::new();
    for (name, record) in records {
        map.insert(name.clone(), to_json(record));
    }
    serde_json::to_string_pretty(&Value::Object(map)).expect("JSON values never fail to serialize")
}
