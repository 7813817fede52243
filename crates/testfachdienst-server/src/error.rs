//! HTTP error mapping
//!
//! Domain errors become JSON error bodies carrying the request path.

use std::fmt::{Display, Formatter};

use actix_web::{HttpRequest, HttpResponse, ResponseError, http::StatusCode};
use testfachdienst_common::{AppError, TestfachdienstError};

use crate::model::response::ErrorResult;

/// Error returned by REST handlers
#[derive(Debug)]
pub struct ApiError {
    pub error: TestfachdienstError,
    pub path: String,
}

impl ApiError {
    pub fn new(error: TestfachdienstError, path: impl Into<String>) -> Self {
        let error = Self {
            error,
            path: path.into(),
        };
        error.log();
        error
    }

    fn log(&self) {
        match self.error.status_code() {
            500.. => tracing::error!(path = %self.path, error = %self.error, "Request failed"),
            _ => tracing::debug!(path = %self.path, error = %self.error, "Request rejected"),
        }
    }

    pub fn to_error_result(&self) -> ErrorResult {
        let result = ErrorResult::new(
            self.error.status_code(),
            self.error.reason(),
            self.path.clone(),
        );
        match &self.error {
            TestfachdienstError::Validation(errors) => result.with_errors(errors.clone()),
            _ => result,
        }
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        self.to_error_result().http_response()
    }
}

/// Attach the request path to a failed service call
pub trait ApiResultExt<T> {
    fn or_api_error(self, req: &HttpRequest) -> Result<T, ApiError>;
}

impl<T> ApiResultExt<T> for anyhow::Result<T> {
    fn or_api_error(self, req: &HttpRequest) -> Result<T, ApiError> {
        self.map_err(|e| ApiError::new(AppError::from(e).to_domain(), req.path()))
    }
}

impl<T> ApiResultExt<T> for Result<T, TestfachdienstError> {
    fn or_api_error(self, req: &HttpRequest) -> Result<T, ApiError> {
        self.map_err(|e| ApiError::new(e, req.path()))
    }
}
