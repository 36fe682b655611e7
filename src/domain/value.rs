//! Dynamic JSON scalars
//!
//! The Ceph Manager reports option values as whatever JSON type the option
//! declares. The reconciler stores every value as a string, so scalars are
//! tagged first and formatted second; anything that is not a scalar is
//! rejected explicitly.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;

/// A JSON value tagged by scalar kind
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Bool(bool),
    Int(i128),
    Float(f64),
    String(String),
    /// null, arrays and objects
    Other(serde_json::Value),
}

impl From<serde_json::Value> for ScalarValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Bool(b) => ScalarValue::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    ScalarValue::Int(i as i128)
                } else if let Some(u) = n.as_u64() {
                    ScalarValue::Int(u as i128)
                } else {
                    ScalarValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => ScalarValue::String(s),
            other => ScalarValue::Other(other),
        }
    }
}

impl ScalarValue {
    /// Canonical string form
    ///
    /// Integral floats collapse to integer form, other floats use the
    /// shortest decimal that round-trips, booleans are lowercase.
    pub fn format(&self) -> Result<String> {
        match self {
            ScalarValue::Bool(b) => Ok(b.to_string()),
            ScalarValue::Int(i) => Ok(i.to_string()),
            ScalarValue::Float(f) if !f.is_finite() => Err(Error::Parse(format!(
                "unsupported non-finite number {}",
                f
            ))),
            ScalarValue::Float(f) if f.fract() == 0.0 && f.abs() < 1e18 => {
                Ok((*f as i128).to_string())
            }
            // f64's Display never uses exponent notation
            ScalarValue::Float(f) => Ok(f.to_string()),
            ScalarValue::String(s) => Ok(s.clone()),
            ScalarValue::Other(v) => Err(Error::Parse(format!(
                "unsupported value type {}",
                json_type_name(v)
            ))),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Other(serde_json::Value::Null))
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
    }
}

/// Format a raw JSON value
pub fn format_value(value: &serde_json::Value) -> Result<String> {
    ScalarValue::from(value.clone()).format()
}

/// Deserialize a map whose values may be any scalar into formatted strings
///
/// Lets manifests say `ssl: false` or `server_port: 8080` while the model
/// keeps `"false"` and `"8080"`.
pub fn deserialize_string_map<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(k, v)| {
            let formatted = format_value(&v)
                .map_err(|e| serde::de::Error::custom(format!("{}: {}", k, e)))?;
            Ok((k, formatted))
        })
        .collect()
}

/// Two-level variant of [`deserialize_string_map`] for section → name → value
pub fn deserialize_nested_string_map<'de, D>(
    deserializer: D,
) -> std::result::Result<BTreeMap<String, BTreeMap<String, String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, BTreeMap<String, serde_json::Value>>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(section, names)| {
            let names = names
                .into_iter()
                .map(|(name, v)| {
                    let formatted = format_value(&v).map_err(|e| {
                        serde::de::Error::custom(format!("{}.{}: {}", section, name, e))
                    })?;
                    Ok((name, formatted))
                })
                .collect::<std::result::Result<BTreeMap<_, _>, D::Error>>()?;
            Ok((section, names))
        })
        .collect()
}

/// Deserialize a single scalar into its formatted string
pub fn deserialize_scalar_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    format_value(&raw).map_err(serde::de::Error::custom)
}
