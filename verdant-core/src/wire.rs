//! Lenient id decoding: the server sends ids as numbers or numeric strings.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::Id;

/// Coerce a JSON number or numeric string to an id.
pub(crate) fn coerce_id(value: &Value) -> Option<Id> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as Id)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Id, D::Error> {
    let value = Value::deserialize(deserializer)?;
    coerce_id(&value).ok_or_else(|| D::Error::custom(format!("expected numeric id, got {value}")))
}

pub fn opt_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Id>, D::Error> {
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(value) => coerce_id(&value)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("expected numeric id or null, got {value}"))),
    }
}
