//! Testfachdienst API - Wire models shared by REST and STOMP
//!
//! This crate provides:
//! - The prescription (`Erezept`) model and its status enum
//! - Greeting and WebSocket reply models
//! - Validation helpers turning `validator` errors into field maps

pub mod model;
pub mod validation;

pub use model::{
    DeleteConfirmation, Erezept, ErezeptStatus, HelloZetaResource, JobInfo,
    WebSocketErrorResponse,
};
pub use validation::{field_errors, validate_payload, validate_payload_with};
