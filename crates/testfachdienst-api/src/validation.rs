//! Input validation utilities for the prescription API
//!
//! Field checks return `validator::ValidationError` values carrying the
//! message clients see in the `errors` map.

use std::borrow::Cow;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use testfachdienst_common::TestfachdienstError;
use validator::{Validate, ValidationError, ValidationErrors};

/// Maximum length for medicationName
pub const MAX_MEDICATION_NAME_LENGTH: usize = 128;

/// Maximum length for dosage
pub const MAX_DOSAGE_LENGTH: usize = 256;

/// Maximum length for patientId, practitionerId and prescriptionId
pub const MAX_IDENTIFIER_LENGTH: usize = 64;

fn error(code: &'static str, message: impl Into<Cow<'static, str>>) -> ValidationError {
    ValidationError::new(code).with_message(message.into())
}

/// Validate a required text field: not blank and at most `max` characters
pub fn validate_text(value: &str, max: usize) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(error("not_blank", "must not be blank"));
    }
    if value.chars().count() > max {
        return Err(error(
            "length",
            format!("size must be between 0 and {}", max),
        ));
    }
    Ok(())
}

/// Validate a timestamp that must not lie in the future
pub fn validate_past_or_present(value: &DateTime<Utc>) -> Result<(), ValidationError> {
    if *value > Utc::now() {
        return Err(error(
            "past_or_present",
            "must be a date in the past or in the present",
        ));
    }
    Ok(())
}

/// Validate that an optional value is present
pub fn validate_not_null<T>(value: Option<&T>) -> Result<(), ValidationError> {
    match value {
        Some(_) => Ok(()),
        None => Err(error("not_null", "must not be null")),
    }
}

/// Validate a timestamp that must not lie in the past
///
/// Compared at second precision so a value equal to "now" is accepted.
pub fn validate_future_or_present(value: &DateTime<Utc>) -> Result<(), ValidationError> {
    if value.timestamp() < Utc::now().timestamp() {
        return Err(error(
            "future_or_present",
            "must be a date in the present or in the future",
        ));
    }
    Ok(())
}

/// Flatten `validator` errors into a `field -> message` map
///
/// Only the first message per field is kept.
pub fn field_errors(errors: &ValidationErrors) -> BTreeMap<String, String> {
    errors
        .field_errors()
        .into_iter()
        .filter_map(|(field, errs)| {
            errs.first().map(|e| {
                let message = e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string());
                (field.to_string(), message)
            })
        })
        .collect()
}

/// Decode a JSON payload and run bean-style validation on it
///
/// Conversion failures map to `InvalidPayload`, constraint violations to `Validation`.
pub fn validate_payload<T>(payload: &[u8]) -> Result<T, TestfachdienstError>
where
    T: DeserializeOwned + Validate,
{
    validate_payload_with(payload, T::validate)
}

/// Decode a JSON payload and check it with a custom rule set
pub fn validate_payload_with<T, F>(payload: &[u8], check: F) -> Result<T, TestfachdienstError>
where
    T: DeserializeOwned,
    F: FnOnce(&T) -> Result<(), ValidationErrors>,
{
    let value: T = serde_json::from_slice(payload)
        .map_err(|e| TestfachdienstError::InvalidPayload(e.to_string()))?;
    check(&value).map_err(|e| TestfachdienstError::Validation(field_errors(&e)))?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::Erezept;

    #[test]
    fn test_validate_text() {
        assert!(validate_text("abc", 3).is_ok());
        assert!(validate_text("", 3).is_err());
        assert!(validate_text(" \t", 3).is_err());
        assert!(validate_text("abcd", 3).is_err());
        // multibyte characters count once
        assert!(validate_text("äöü", 3).is_ok());
    }

    #[test]
    fn test_validate_past_or_present() {
        let now = Utc::now();
        assert!(validate_past_or_present(&(now - Duration::seconds(5))).is_ok());
        assert!(validate_past_or_present(&(now + Duration::hours(1))).is_err());
    }

    #[test]
    fn test_validate_not_null() {
        assert!(validate_not_null(Some(&1)).is_ok());
        let err = validate_not_null::<i32>(None).unwrap_err();
        assert_eq!(err.message.unwrap(), "must not be null");
    }

    #[test]
    fn test_validate_future_or_present() {
        let now = Utc::now();
        assert!(validate_future_or_present(&(now + Duration::days(1))).is_ok());
        assert!(validate_future_or_present(&(now - Duration::days(1))).is_err());
    }

    #[test]
    fn test_validate_payload_conversion_error() {
        let result = validate_payload::<Erezept>(b"{not json");
        assert!(matches!(
            result,
            Err(TestfachdienstError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_validate_payload_constraint_error() {
        let result = validate_payload::<Erezept>(br#"{"dosage":"1x"}"#);
        match result {
            Err(TestfachdienstError::Validation(errors)) => {
                assert_eq!(errors.get("medicationName").unwrap(), "must not be blank");
                assert!(!errors.contains_key("dosage"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_validate_payload_with_create_rules() {
        let payload = serde_json::json!({
            "medicationName": "Ibuprofen",
            "dosage": "1x",
            "patientId": "PAT-1",
            "practitionerId": "PRAC-1",
            "prescriptionId": "RX-1",
        })
        .to_string();
        assert!(validate_payload::<Erezept>(payload.as_bytes()).is_ok());

        let result = validate_payload_with(payload.as_bytes(), Erezept::validate_for_create);
        match result {
            Err(TestfachdienstError::Validation(errors)) => {
                assert_eq!(errors.get("issuedAt").unwrap(), "must not be null");
                assert_eq!(errors.len(), 1);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
