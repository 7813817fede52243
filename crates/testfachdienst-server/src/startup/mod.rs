//! Application startup utilities module.
//!
//! Logging, tracing, memory budget, HTTP servers and graceful shutdown.

mod http;
mod logging;
mod memory;
mod shutdown;
mod telemetry;

pub use http::{main_server, management_server};
pub use logging::{
    DEFAULT_LOG_DIR, LogRotation, LoggingConfig, LoggingGuard, ROOT_LOG_FILE, init_logging,
};
pub use memory::{BudgetAllocator, MemoryBudget, MemoryLimitSource};
pub use shutdown::{ServerTask, ServiceLifecycle, ShutdownCause, shutdown_requested};
pub use telemetry::OtelConfig;
