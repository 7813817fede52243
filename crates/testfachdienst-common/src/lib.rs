//! Testfachdienst Common - Shared types and utilities
//!
//! This crate provides the foundational types used across all Testfachdienst components:
//! - Error types and status mapping
//! - Context path helpers shared by REST and STOMP routing
//! - Common constants

pub mod error;
pub mod utils;

// Re-exports for convenience
pub use error::{AppError, TestfachdienstError};
pub use utils::{normalize_context_path, with_context_path};

/// Application name reported by actuator info and telemetry resources
pub const APP_NAME: &str = "testfachdienst";

/// Application version, shared with the container image tags
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Base path of the prescription REST resource
pub const EREZEPT_API_PATH: &str = "/api/erezept";

/// Default HTTP port of the service
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// Default port of the management (actuator/metrics) server
pub const DEFAULT_MANAGEMENT_PORT: u16 = 8081;
