// Main library module for the ZETA Testfachdienst - a prescription test resource server
// exposing CRUD over REST and STOMP and exporting self-disclosure records over OTLP

// Module declarations
pub mod api; // REST handlers, actuator and API documentation
pub mod error; // HTTP error mapping
pub mod metrics; // Metrics and observability
pub mod middleware; // HTTP middleware
pub mod model; // Configuration, application state and response types
pub mod service; // Business services and recurring jobs
pub mod startup; // Application startup utilities
pub mod ws; // STOMP over WebSocket

pub use model::app_state::AppState;
pub use model::config::Configuration;
