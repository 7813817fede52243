//! Error types for the Testfachdienst
//!
//! This module defines:
//! - `TestfachdienstError`: Application-specific error enum with HTTP status mapping
//! - `AppError`: Wrapper around `anyhow::Error` for integration with web frameworks

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// Message used for every bean-style validation failure
pub const VALIDATION_FAILED: &str = "Validation failed";

/// Message used when a payload cannot be converted into the expected type
pub const INVALID_PAYLOAD: &str = "Invalid message format or missing required fields";

/// Message used for unexpected failures
pub const UNEXPECTED_ERROR: &str = "An unexpected error occurred";

/// Application-specific error types
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TestfachdienstError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("validation failed: {0:?}")]
    Validation(BTreeMap<String, String>),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("database error: {0}")]
    DatabaseError(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("export error: {0}")]
    ExportError(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl TestfachdienstError {
    /// HTTP status code this error maps to
    pub fn status_code(&self) -> u16 {
        match self {
            TestfachdienstError::NotFound(_) => 404,
            TestfachdienstError::Conflict(_) => 409,
            TestfachdienstError::Validation(_) | TestfachdienstError::InvalidPayload(_) => 400,
            TestfachdienstError::ExportError(_) => 502,
            TestfachdienstError::DatabaseError(_)
            | TestfachdienstError::ConfigError(_)
            | TestfachdienstError::InternalError(_) => 500,
        }
    }

    /// Human readable reason sent back to clients
    ///
    /// Internal failures never leak their cause.
    pub fn reason(&self) -> String {
        match self {
            TestfachdienstError::NotFound(message) | TestfachdienstError::Conflict(message) => {
                message.clone()
            }
            TestfachdienstError::Validation(_) => VALIDATION_FAILED.to_string(),
            TestfachdienstError::InvalidPayload(_) => INVALID_PAYLOAD.to_string(),
            TestfachdienstError::ExportError(message) => message.clone(),
            TestfachdienstError::DatabaseError(_)
            | TestfachdienstError::ConfigError(_)
            | TestfachdienstError::InternalError(_) => UNEXPECTED_ERROR.to_string(),
        }
    }
}

/// Wrapper for application errors
#[derive(Debug)]
pub struct AppError {
    inner: anyhow::Error,
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        AppError { inner: value }
    }
}

impl From<TestfachdienstError> for AppError {
    fn from(value: TestfachdienstError) -> Self {
        AppError {
            inner: anyhow::Error::new(value),
        }
    }
}

impl AppError {
    pub fn inner(&self) -> &anyhow::Error {
        &self.inner
    }

    pub fn downcast_ref<E: std::error::Error + Send + Sync + 'static>(&self) -> Option<&E> {
        self.inner.downcast_ref::<E>()
    }

    /// Resolve the domain error, treating anything else as internal
    pub fn to_domain(&self) -> TestfachdienstError {
        self.downcast_ref::<TestfachdienstError>()
            .cloned()
            .unwrap_or_else(|| TestfachdienstError::InternalError(self.inner.to_string()))
    }
}
