//! Conversion between plain JSON and Firestore's typed REST values
//! (`{"stringValue": "a"}`, `{"integerValue": "3"}`, ...).

use chrono::SecondsFormat;
use serde_json::{json, Map, Value};

use crate::filter::FilterValue;

/// Encodes a filter operand. Identifiers become references to documents under `collection_path`.
pub fn encode_filter_value(value: &FilterValue, collection_path: &str) -> Value {
    match value {
        FilterValue::Null => json!({ "nullValue": null }),
        FilterValue::Bool(b) => json!({ "booleanValue": b }),
        FilterValue::Int(i) => json!({ "integerValue": i.to_string() }),
        FilterValue::Float(f) => json!({ "doubleValue": f }),
        FilterValue::String(s) => json!({ "stringValue": s }),
        FilterValue::Time(t) => json!({ "timestampValue": t.to_rfc3339_opts(SecondsFormat::Micros, true) }),
        FilterValue::Id(id) => json!({ "referenceValue": format!("{}/{}", collection_path, id) }),
        FilterValue::List(items) => {
            let values: Vec<Value> = items.iter().map(|v| encode_filter_value(v, collection_path)).collect();
            json!({ "arrayValue": { "values": values } })
        }
        FilterValue::Map(map) => encode_map(map),
    }
}

pub fn encode_json(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64() }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(encode_json).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(map) => encode_map(map),
    }
}

fn encode_map(map: &Map<String, Value>) -> Value {
    let fields: Map<String, Value> = map.iter().map(|(k, v)| (k.clone(), encode_json(v))).collect();
    json!({ "mapValue": { "fields": fields } })
}

/// Decodes one typed value. Timestamps and references come back as strings.
pub fn decode_value(value: &Value) -> Value {
    let Some((kind, inner)) = value.as_object().and_then(|o| o.iter().next()) else {
        return Value::Null;
    };
    match kind.as_str() {
        "nullValue" => Value::Null,
        "booleanValue" => inner.as_bool().map(Value::Bool).unwrap_or(Value::Null),
        "integerValue" => match inner {
            Value::String(s) => s.parse::<i64>().map(Value::from).unwrap_or(Value::Null),
            Value::Number(_) => inner.clone(),
            _ => Value::Null,
        },
        "doubleValue" => match inner {
            Value::Number(_) => inner.clone(),
            // NaN and the infinities arrive as strings and have no JSON form
            _ => Value::Null,
        },
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => inner.clone(),
        "geoPointValue" => inner.clone(),
        "arrayValue" => Value::Array(
            inner
                .get("values")
                .and_then(Value::as_array)
                .map(|values| values.iter().map(decode_value).collect())
                .unwrap_or_default(),
        ),
        "mapValue" => decode_fields(inner.get("fields")),
        _ => Value::Null,
    }
}

/// Decodes a document `fields` object into a plain JSON object.
pub fn decode_fields(fields: Option<&Value>) -> Value {
    let decoded: Map<String, Value> = fields
        .and_then(Value::as_object)
        .map(|fields| fields.iter().map(|(k, v)| (k.clone(), decode_value(v))).collect())
        .unwrap_or_default();
    Value::Object(decoded)
}
