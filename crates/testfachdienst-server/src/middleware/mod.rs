// HTTP middleware: request spans with request ids, HTTP metrics and security headers

pub mod security;
pub mod tracing;

pub use security::security_headers;
pub use tracing::{RequestId, RequestIdExt, TracingMiddleware, X_REQUEST_ID};
