//! Flattening of OTLP attribute lists into dotted-key JSON maps.

use opentelemetry_proto::tonic::common::v1::{KeyValue, any_value};
use serde_json::{Map, Number, Value};

/// Flatten attributes into a JSON object keyed by dotted paths.
///
/// Nested key/value lists contribute `parent.child` keys. When two entries
/// resolve to the same key the later one wins. Attributes without a value are
/// skipped.
pub fn flatten_attributes(attrs: &[KeyValue]) -> Map<String, Value> {
    let mut out = Map::new();
    flatten_into(&mut out, "", attrs);
    out
}

fn flatten_into(out: &mut Map<String, Value>, prefix: &str, attrs: &[KeyValue]) {
    for kv in attrs {
        let key = if prefix.is_empty() {
            kv.key.clone()
        } else {
            format!("{prefix}.{}", kv.key)
        };

        match kv.value.as_ref().and_then(|v| v.value.as_ref()) {
            Some(any_value::Value::KvlistValue(list)) => flatten_into(out, &key, &list.values),
            Some(value) => {
                out.insert(key, to_json(value));
            }
            None => {}
        }
    }
}

fn to_json(value: &any_value::Value) -> Value {
    match value {
        any_value::Value::StringValue(s) => Value::String(s.clone()),
        any_value::Value::BoolValue(b) => Value::Bool(*b),
        any_value::Value::IntValue(i) => Value::from(*i),
        any_value::Value::DoubleValue(d) => Number::from_f64(*d).map_or(Value::Null, Value::Number),
        any_value::Value::BytesValue(b) => Value::String(hex::encode(b)),
        any_value::Value::ArrayValue(arr) => Value::Array(
            arr.values
                .iter()
                .filter_map(|v| v.value.as_ref())
                .map(to_json)
                .collect(),
        ),
        // Inside arrays a key/value list cannot be flattened into the parent,
        // so it becomes a nested object.
        any_value::Value::KvlistValue(list) => Value::Object(flatten_attributes(&list.values)),
    }
}

/// String value of an attribute, if present and a string.
pub fn string_attribute<'a>(attrs: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    attrs.get(key).and_then(Value::as_str)
}
