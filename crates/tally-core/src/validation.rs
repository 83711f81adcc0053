//! Boundary validation for event names, property keys, values, and ids.
//!
//! Validation is per property: a bad entry is dropped from the map and
//! reported, the rest of the event proceeds.

use std::sync::OnceLock;

use regex::Regex;

use crate::constants::{MAX_ID_LEN, MAX_STRING_VALUE_LEN};
use crate::errors::ValidationError;
use crate::value::{Properties, Value};

/// Keys the collector reserves for top-level event fields.
const RESERVED_KEYS: &[&str] = &[
    "distinct_id",
    "original_id",
    "time",
    "properties",
    "id",
    "first_id",
    "second_id",
    "users",
    "events",
    "event",
    "user_id",
    "date",
    "datetime",
];

fn key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-zA-Z_$][a-zA-Z0-9_$]{0,99}$").expect("static key pattern compiles")
    })
}

/// Validate a property key or event name.
pub fn validate_key(key: &str) -> Result<(), ValidationError> {
    if key.is_empty() {
        return Err(ValidationError::Empty { field: "key" });
    }
    if !key_pattern().is_match(key) {
        return Err(ValidationError::InvalidKey {
            key: key.to_string(),
        });
    }
    if RESERVED_KEYS.iter().any(|r| r.eq_ignore_ascii_case(key)) {
        return Err(ValidationError::ReservedKey {
            key: key.to_string(),
        });
    }
    Ok(())
}

/// Validate a distinct, login, or item id.
pub fn validate_id(field: &'static str, id: &str) -> Result<(), ValidationError> {
    if id.trim().is_empty() {
        return Err(ValidationError::Empty { field });
    }
    let len = id.chars().count();
    if len > MAX_ID_LEN {
        return Err(ValidationError::TooLong {
            field,
            len,
            max: MAX_ID_LEN,
        });
    }
    Ok(())
}

/// Validate a single value against its key.
pub fn validate_value(key: &str, value: &Value) -> Result<(), ValidationError> {
    match value {
        Value::String(s) => check_len(key, s),
        Value::Number(n) if !n.is_finite() => Err(ValidationError::InvalidValue {
            key: key.to_string(),
            reason: format!("number must be finite, got {n}"),
        }),
        Value::List(items) => items.iter().try_for_each(|s| check_len(key, s)),
        Value::Number(_) | Value::Boolean(_) | Value::Date(_) => Ok(()),
    }
}

fn check_len(key: &str, s: &str) -> Result<(), ValidationError> {
    let len = s.chars().count();
    if len > MAX_STRING_VALUE_LEN {
        return Err(ValidationError::ValueTooLong {
            key: key.to_string(),
            len,
            max: MAX_STRING_VALUE_LEN,
        });
    }
    Ok(())
}

/// Validate every entry of `props`, returning the accepted subset and the
/// rejections. Rejected entries are logged at warn level.
pub fn sanitize_properties(props: Properties) -> (Properties, Vec<ValidationError>) {
    let mut accepted = Properties::new();
    let mut rejected = Vec::new();
    for (key, value) in props {
        match validate_key(&key).and_then(|()| validate_value(&key, &value)) {
            Ok(()) => {
                accepted.insert(key, value);
            }
            Err(e) => {
                tracing::warn!("validation: dropping property: {e}");
                rejected.push(e);
            }
        }
    }
    (accepted, rejected)
}

/// Whether a device-derived id is usable as an anonymous id.
pub fn is_valid_device_id(id: &str) -> bool {
    const BLOCKLIST: &[&str] = &["9774d56d682e549c", "0123456789abcdef", "unknown"];
    let trimmed = id.trim();
    !trimmed.is_empty()
        && trimmed.chars().count() <= MAX_ID_LEN
        && !trimmed.chars().all(|c| c == '0' || c == '-')
        && !BLOCKLIST.iter().any(|b| b.eq_ignore_ascii_case(trimmed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties;

    #[test]
    fn keys_follow_identifier_pattern() {
        assert!(validate_key("plan").is_ok());
        assert!(validate_key("$AppClick").is_ok());
        assert!(validate_key("_private_1").is_ok());
        assert!(matches!(
            validate_key("1abc"),
            Err(ValidationError::InvalidKey { .. })
        ));
        assert!(matches!(
            validate_key("has space"),
            Err(ValidationError::InvalidKey { .. })
        ));
        assert!(validate_key(&"a".repeat(101)).is_err());
    }

    #[test]
    fn reserved_keys_rejected_case_insensitively() {
        assert!(matches!(
            validate_key("Distinct_ID"),
            Err(ValidationError::ReservedKey { .. })
        ));
    }

    #[test]
    fn one_bad_property_does_not_reject_the_rest() {
        let mut props = properties! { "ok" => "fine", "count" => 2 };
        props.insert("bad key".to_string(), Value::from("x"));
        props.insert("long".to_string(), Value::String("x".repeat(8193)));
        props.insert("nan".to_string(), Value::Number(f64::NAN));

        let (accepted, rejected) = sanitize_properties(props);
        assert_eq!(accepted.len(), 2);
        assert!(accepted.contains_key("ok"));
        assert!(accepted.contains_key("count"));
        assert_eq!(rejected.len(), 3);
    }

    #[test]
    fn device_id_blocklist() {
        assert!(is_valid_device_id("a1b2c3d4e5f60718"));
        assert!(!is_valid_device_id(""));
        assert!(!is_valid_device_id("0000-0000"));
        assert!(!is_valid_device_id("9774d56d682e549c"));
    }
}
