//! Error mapping for STOMP application handlers

use std::collections::BTreeMap;

use serde_json::json;
use testfachdienst_api::WebSocketErrorResponse;
use testfachdienst_common::TestfachdienstError;
use testfachdienst_common::error::{INVALID_PAYLOAD, UNEXPECTED_ERROR, VALIDATION_FAILED};
use tracing::{error, warn};

/// Failure of a STOMP application handler, replied on the sender's personal queue
#[derive(Debug, thiserror::Error)]
pub enum WsError {
    #[error("{status} {reason}")]
    Status { status: u16, reason: String },

    #[error("validation failed: {0:?}")]
    Validation(BTreeMap<String, String>),

    #[error("message conversion failed: {0}")]
    Conversion(String),

    #[error(transparent)]
    Unexpected(anyhow::Error),
}

impl WsError {
    pub fn not_found(reason: impl Into<String>) -> Self {
        WsError::Status {
            status: 404,
            reason: reason.into(),
        }
    }

    pub fn conflict(reason: impl Into<String>) -> Self {
        WsError::Status {
            status: 409,
            reason: reason.into(),
        }
    }

    pub fn bad_request(reason: impl Into<String>) -> Self {
        WsError::Status {
            status: 400,
            reason: reason.into(),
        }
    }

    /// Build the reply payload and log the failure at the matching level
    pub fn to_response(&self) -> WebSocketErrorResponse {
        match self {
            WsError::Status { status, reason } => {
                warn!(status, reason = %reason, "STOMP handler rejected request");
                WebSocketErrorResponse::new(*status, reason.clone())
            }
            WsError::Validation(errors) => {
                warn!(?errors, "STOMP payload validation failed");
                WebSocketErrorResponse::new(400, VALIDATION_FAILED)
                    .with_details(json!({ "errors": errors }))
            }
            WsError::Conversion(message) => {
                warn!(error = %message, "STOMP payload conversion failed");
                WebSocketErrorResponse::new(400, INVALID_PAYLOAD)
                    .with_details(json!({ "error": message }))
            }
            WsError::Unexpected(e) => {
                error!(error = ?e, "Unexpected error in STOMP handler");
                WebSocketErrorResponse::new(500, UNEXPECTED_ERROR)
            }
        }
    }
}

impl From<TestfachdienstError> for WsError {
    fn from(value: TestfachdienstError) -> Self {
        match value {
            TestfachdienstError::Validation(errors) => WsError::Validation(errors),
            TestfachdienstError::InvalidPayload(message) => WsError::Conversion(message),
            TestfachdienstError::NotFound(_) | TestfachdienstError::Conflict(_) => {
                WsError::Status {
                    status: value.status_code(),
                    reason: value.reason(),
                }
            }
            other => WsError::Unexpected(anyhow::Error::new(other)),
        }
    }
}

impl From<anyhow::Error> for WsError {
    fn from(value: anyhow::Error) -> Self {
        match value.downcast::<TestfachdienstError>() {
            Ok(domain) => domain.into(),
            Err(other) => WsError::Unexpected(other),
        }
    }
}
