//! Attribute codec: conversions between domain values and store attributes.
//!
//! Encoders are infallible for scalars. Nested payloads go through
//! [`encode_value`] / [`decode_value`], which reject shapes the store
//! representation does not carry instead of coercing them.

use std::collections::{BTreeMap, HashMap};

use aws_sdk_dynamodb::types::AttributeValue;
use chrono::{DateTime, Utc};
use serde_json::{Number, Value};

use crate::{Item, RecordError};

/// A keyed payload of primitive values, as carried by job data.
pub type DataMap = BTreeMap<String, Value>;

/// The null marker.
pub fn encode_null() -> AttributeValue {
    AttributeValue::Null(true)
}

pub fn encode_string(value: impl Into<String>) -> AttributeValue {
    AttributeValue::S(value.into())
}

/// Encode an optional string; `None` becomes the null marker.
pub fn encode_optional_string(value: Option<&str>) -> AttributeValue {
    match value {
        Some(s) => AttributeValue::S(s.to_string()),
        None => encode_null(),
    }
}

pub fn encode_bool(value: bool) -> AttributeValue {
    AttributeValue::Bool(value)
}

pub fn encode_i64(value: i64) -> AttributeValue {
    AttributeValue::N(value.to_string())
}

pub fn encode_optional_i64(value: Option<i64>) -> AttributeValue {
    value.map(encode_i64).unwrap_or_else(encode_null)
}

/// Timestamps are stored as epoch milliseconds.
pub fn encode_timestamp(value: DateTime<Utc>) -> AttributeValue {
    encode_i64(value.timestamp_millis())
}

pub fn encode_optional_timestamp(value: Option<DateTime<Utc>>) -> AttributeValue {
    value.map(encode_timestamp).unwrap_or_else(encode_null)
}

/// Encode a single payload value. `name` is only used for error reporting.
pub fn encode_value(name: &str, value: &Value) -> Result<AttributeValue, RecordError> {
    match value {
        Value::Null => Ok(encode_null()),
        Value::Bool(b) => Ok(AttributeValue::Bool(*b)),
        Value::Number(n) => Ok(AttributeValue::N(n.to_string())),
        Value::String(s) => Ok(AttributeValue::S(s.clone())),
        Value::Object(obj) => {
            let mut map = HashMap::with_capacity(obj.len());
            for (key, nested) in obj {
                map.insert(key.clone(), encode_value(key, nested)?);
            }
            Ok(AttributeValue::M(map))
        }
        Value::Array(_) => Err(RecordError::UnsupportedValue {
            name: name.to_string(),
            kind: "array".to_string(),
        }),
    }
}

/// Encode a keyed payload as a map attribute.
pub fn encode_map(name: &str, map: &DataMap) -> Result<AttributeValue, RecordError> {
    let mut encoded = HashMap::with_capacity(map.len());
    for (key, value) in map {
        encoded.insert(key.clone(), encode_value(&format!("{}.{}", name, key), value)?);
    }
    Ok(AttributeValue::M(encoded))
}

/// Short store type name of an attribute, for error messages.
pub fn kind(attr: &AttributeValue) -> &'static str {
    match attr {
        AttributeValue::S(_) => "S",
        AttributeValue::N(_) => "N",
        AttributeValue::B(_) => "B",
        AttributeValue::Bool(_) => "BOOL",
        AttributeValue::Null(_) => "NULL",
        AttributeValue::M(_) => "M",
        AttributeValue::L(_) => "L",
        AttributeValue::Ss(_) => "SS",
        AttributeValue::Ns(_) => "NS",
        AttributeValue::Bs(_) => "BS",
        _ => "unknown",
    }
}

pub fn is_null(attr: &AttributeValue) -> bool {
    matches!(attr, AttributeValue::Null(true))
}

/// Decode a single payload value.
pub fn decode_value(name: &str, attr: &AttributeValue) -> Result<Value, RecordError> {
    match attr {
        AttributeValue::Null(_) => Ok(Value::Null),
        AttributeValue::Bool(b) => Ok(Value::Bool(*b)),
        AttributeValue::S(s) => Ok(Value::String(s.clone())),
        AttributeValue::N(n) => parse_number(name, n).map(Value::Number),
        AttributeValue::M(map) => {
            let mut obj = serde_json::Map::with_capacity(map.len());
            for (key, nested) in map {
                obj.insert(key.clone(), decode_value(key, nested)?);
            }
            Ok(Value::Object(obj))
        }
        other => Err(RecordError::UnsupportedValue {
            name: name.to_string(),
            kind: kind(other).to_string(),
        }),
    }
}

fn parse_number(name: &str, raw: &str) -> Result<Number, RecordError> {
    if let Ok(i) = raw.parse::<i64>() {
        return Ok(i.into());
    }
    if let Ok(u) = raw.parse::<u64>() {
        return Ok(u.into());
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .ok_or_else(|| RecordError::Malformed {
            name: name.to_string(),
            message: format!("not a number: {}", raw),
        })
}

/// Fetch an attribute that must be present.
pub fn required<'a>(record: &'a Item, name: &str) -> Result<&'a AttributeValue, RecordError> {
    record
        .get(name)
        .ok_or_else(|| RecordError::MissingAttribute(name.to_string()))
}

fn wrong_type(name: &str, expected: &'static str) -> RecordError {
    RecordError::WrongType {
        name: name.to_string(),
        expected,
    }
}

pub fn required_string(record: &Item, name: &str) -> Result<String, RecordError> {
    match required(record, name)? {
        AttributeValue::S(s) => Ok(s.clone()),
        _ => Err(wrong_type(name, "S")),
    }
}

/// Read an optional string. Both a missing attribute and the null marker
/// decode to `None`; an empty string stays `Some("")`.
pub fn optional_string(record: &Item, name: &str) -> Result<Option<String>, RecordError> {
    match record.get(name) {
        None | Some(AttributeValue::Null(_)) => Ok(None),
        Some(AttributeValue::S(s)) => Ok(Some(s.clone())),
        Some(_) => Err(wrong_type(name, "S")),
    }
}

pub fn required_bool(record: &Item, name: &str) -> Result<bool, RecordError> {
    match required(record, name)? {
        AttributeValue::Bool(b) => Ok(*b),
        _ => Err(wrong_type(name, "BOOL")),
    }
}

fn parse_i64(name: &str, raw: &str) -> Result<i64, RecordError> {
    raw.parse().map_err(|_| RecordError::Malformed {
        name: name.to_string(),
        message: format!("not an integer: {}", raw),
    })
}

pub fn required_i64(record: &Item, name: &str) -> Result<i64, RecordError> {
    match required(record, name)? {
        AttributeValue::N(n) => parse_i64(name, n),
        _ => Err(wrong_type(name, "N")),
    }
}

pub fn optional_i64(record: &Item, name: &str) -> Result<Option<i64>, RecordError> {
    match record.get(name) {
        None | Some(AttributeValue::Null(_)) => Ok(None),
        Some(AttributeValue::N(n)) => parse_i64(name, n).map(Some),
        Some(_) => Err(wrong_type(name, "N")),
    }
}

/// Read an `i64` attribute that must fit in an `i32`.
pub fn required_i32(record: &Item, name: &str) -> Result<i32, RecordError> {
    let value = required_i64(record, name)?;
    i32::try_from(value).map_err(|_| RecordError::Malformed {
        name: name.to_string(),
        message: format!("out of range: {}", value),
    })
}

fn millis_to_timestamp(name: &str, millis: i64) -> Result<DateTime<Utc>, RecordError> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| RecordError::Malformed {
        name: name.to_string(),
        message: format!("timestamp out of range: {}", millis),
    })
}

pub fn required_timestamp(record: &Item, name: &str) -> Result<DateTime<Utc>, RecordError> {
    millis_to_timestamp(name, required_i64(record, name)?)
}

pub fn optional_timestamp(
    record: &Item,
    name: &str,
) -> Result<Option<DateTime<Utc>>, RecordError> {
    optional_i64(record, name)?
        .map(|millis| millis_to_timestamp(name, millis))
        .transpose()
}

/// Borrow a nested map attribute.
pub fn required_nested<'a>(record: &'a Item, name: &str) -> Result<&'a Item, RecordError> {
    match required(record, name)? {
        AttributeValue::M(map) => Ok(map),
        _ => Err(wrong_type(name, "M")),
    }
}

/// Read a keyed payload written by [`encode_map`].
pub fn required_map(record: &Item, name: &str) -> Result<DataMap, RecordError> {
    required_nested(record, name)?
        .iter()
        .map(|(key, attr)| Ok((key.clone(), decode_value(key, attr)?)))
        .collect()
}
