//! Lenient deserializers for Manager API fields
//!
//! Depending on the Ceph release the same field arrives as a JSON number, a
//! numeric string, or a boolean encoded as `0/1` or `"true"`.

use serde::{de, Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

pub fn flex_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Loose>::deserialize(deserializer)? {
        None => Ok(false),
        Some(Loose::Bool(b)) => Ok(b),
        Some(Loose::Int(i)) => Ok(i != 0),
        Some(Loose::Float(f)) => Ok(f != 0.0),
        Some(Loose::Str(s)) => match s.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" | "" => Ok(false),
            other => Err(de::Error::custom(format!("invalid boolean {:?}", other))),
        },
    }
}

pub fn flex_i64_opt<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Loose>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Loose::Int(i)) => Ok(Some(i)),
        Some(Loose::Float(f)) if f.fract() == 0.0 => Ok(Some(f as i64)),
        Some(Loose::Str(s)) if s.is_empty() => Ok(None),
        Some(Loose::Str(s)) => s
            .parse()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("invalid integer {:?}", s))),
        Some(_) => Err(de::Error::custom("expected an integer")),
    }
}

pub fn flex_u32_opt<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    flex_i64_opt(deserializer)?
        .map(|v| u32::try_from(v).map_err(|_| de::Error::custom(format!("{} out of range", v))))
        .transpose()
}

pub fn flex_u64_opt<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    flex_i64_opt(deserializer)?
        .map(|v| u64::try_from(v).map_err(|_| de::Error::custom(format!("{} out of range", v))))
        .transpose()
}

/// Absent, null, and empty strings all mean "not set"
pub fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.filter(|s| !s.is_empty()))
}
