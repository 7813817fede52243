//! HTTP response types
//!
//! Error bodies follow the familiar `{timestamp, status, error, message, path}` layout.

use std::collections::BTreeMap;

use actix_web::{HttpResponse, HttpResponseBuilder, http::StatusCode};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Error result for API error responses
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ErrorResult {
    pub timestamp: String,
    pub status: u16,
    pub error: String,
    pub message: String,
    pub path: String,
    /// Field errors of a failed validation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, String>>,
}

impl ErrorResult {
    pub fn new(status: u16, message: String, path: String) -> Self {
        let error = StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or_default()
            .to_string();

        ErrorResult {
            timestamp: chrono::Utc::now().to_rfc3339(),
            status,
            error,
            message,
            path,
            errors: None,
        }
    }

    pub fn with_errors(mut self, errors: BTreeMap<String, String>) -> Self {
        self.errors = Some(errors);
        self
    }

    pub fn http_response(&self) -> HttpResponse {
        HttpResponseBuilder::new(
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        )
        .json(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_result_fills_reason_phrase() {
        let result = ErrorResult::new(400, "Validation failed".to_string(), "/api/erezept".into());
        assert_eq!(result.error, "Bad Request");
        assert_eq!(result.path, "/api/erezept");

        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("errors").is_none());
    }

    #[test]
    fn test_error_result_with_errors() {
        let result = ErrorResult::new(400, "Validation failed".into(), "/".into()).with_errors(
            BTreeMap::from([("dosage".to_string(), "must not be blank".to_string())]),
        );
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["errors"]["dosage"], "must not be blank");
        assert_eq!(result.http_response().status(), StatusCode::BAD_REQUEST);
    }
}
