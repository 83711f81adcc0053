//! Property values: a tagged union over the types the collector accepts.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

/// Ordered property map attached to every event.
pub type Properties = BTreeMap<String, Value>;

/// Wire format for [`Value::Date`].
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// A single property value.
///
/// Deserialization is untagged so persisted super properties round-trip
/// through plain JSON. Dates are written as formatted strings and therefore
/// come back as [`Value::String`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Value {
    String(String),
    Number(f64),
    Boolean(bool),
    Date(DateTime<Utc>),
    List(Vec<String>),
}

impl Value {
    /// Short type name used in validation messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Number(_) => "number",
            Self::Boolean(_) => "boolean",
            Self::Date(_) => "date",
            Self::List(_) => "list",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::String(s) => serializer.serialize_str(s),
            Self::Number(n) => {
                // Integral values go out as integers so counters stay exact.
                if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
                    serializer.serialize_i64(*n as i64)
                } else {
                    serializer.serialize_f64(*n)
                }
            }
            Self::Boolean(b) => serializer.serialize_bool(*b),
            Self::Date(d) => serializer.serialize_str(&d.format(DATE_FORMAT).to_string()),
            Self::List(items) => items.serialize(serializer),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Number(v as f64)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Number(f64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Number(f64::from(v))
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Date(v)
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Self::List(v)
    }
}

/// Build a [`Properties`] map from `key => value` pairs.
///
/// ```
/// let props = tally_core::properties! { "plan" => "pro", "seats" => 3 };
/// assert_eq!(props.len(), 2);
/// ```
#[macro_export]
macro_rules! properties {
    () => { $crate::value::Properties::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::value::Properties::new();
        $( map.insert(($key).to_string(), $crate::value::Value::from($value)); )+
        map
    }};
}
