//! Field-level input contracts for tool arguments.
//!
//! Identifiers that end up in URL paths are restricted to an
//! alphanumeric/underscore/hyphen charset, which rules out path
//! traversal, header injection and request smuggling by construction.
//! Validation failures are safe to return verbatim to the caller.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::errors::AppError;

pub static SAFE_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("static regex"));

/// Reject any identifier outside the safe charset.
pub fn require_safe_id(field: &str, value: &str) -> Result<(), AppError> {
    if SAFE_ID_RE.is_match(value) {
        Ok(())
    } else {
        Err(AppError::validation(
            field,
            "must match [A-Za-z0-9_-] and not be empty",
        ))
    }
}

pub fn required_str<'a>(args: &'a Value, field: &str) -> Result<&'a str, AppError> {
    args.get(field)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::validation(field, "required string"))
}

pub fn optional_str<'a>(args: &'a Value, field: &str) -> Option<&'a str> {
    args.get(field).and_then(|v| v.as_str())
}

pub fn optional_u32(args: &Value, field: &str, default: u32) -> Result<u32, AppError> {
    match args.get(field) {
        None | Some(Value::Null) => Ok(default),
        Some(v) => v
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| AppError::validation(field, "must be a non-negative integer")),
    }
}

pub fn required_object<'a>(args: &'a Value, field: &str) -> Result<&'a Value, AppError> {
    args.get(field)
        .filter(|v| v.is_object())
        .ok_or_else(|| AppError::validation(field, "required object"))
}

pub fn required_array<'a>(args: &'a Value, field: &str) -> Result<&'a Value, AppError> {
    args.get(field)
        .filter(|v| v.is_array())
        .ok_or_else(|| AppError::validation(field, "required array"))
}

/// ISO dates in reports (YYYY-MM-DD), checked structurally.
pub fn require_iso_date(field: &str, value: &str) -> Result<(), AppError> {
    if chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok() {
        Ok(())
    } else {
        Err(AppError::validation(field, "must be a YYYY-MM-DD date"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn safe_id_blocks_path_metacharacters() {
        assert!(require_safe_id("id", "evt_123-abc").is_ok());
        assert!(require_safe_id("id", "../etc/passwd").is_err());
        assert!(require_safe_id("id", "a/b").is_err());
        assert!(require_safe_id("id", "a b").is_err());
        assert!(require_safe_id("id", "a\r\nHost: evil").is_err());
        assert!(require_safe_id("id", "").is_err());
    }

    #[test]
    fn required_str_rejects_missing_and_empty() {
        let args = json!({ "name": "x", "empty": "" });
        assert_eq!(required_str(&args, "name").unwrap(), "x");
        assert!(required_str(&args, "empty").is_err());
        assert!(required_str(&args, "missing").is_err());
    }

    #[test]
    fn optional_u32_defaults_and_bounds() {
        let args = json!({ "n": 25, "neg": -1 });
        assert_eq!(optional_u32(&args, "n", 10).unwrap(), 25);
        assert_eq!(optional_u32(&args, "missing", 10).unwrap(), 10);
        assert!(optional_u32(&args, "neg", 10).is_err());
    }

    #[test]
    fn iso_date_shape() {
        assert!(require_iso_date("d", "2026-02-28").is_ok());
        assert!(require_iso_date("d", "2026-13-01").is_err());
        assert!(require_iso_date("d", "tomorrow").is_err());
    }
}
