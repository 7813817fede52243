//! Response headers applied to every endpoint of the main server
//!
//! All endpoints are public: there is no authentication, no HTTP session and
//! therefore no CSRF protection.

use actix_web::middleware::DefaultHeaders;

pub const SECURITY_HEADERS: [(&str, &str); 6] = [
    ("X-Frame-Options", "SAMEORIGIN"),
    ("X-Content-Type-Options", "nosniff"),
    ("X-XSS-Protection", "0"),
    (
        "Cache-Control",
        "no-cache, no-store, max-age=0, must-revalidate",
    ),
    ("Pragma", "no-cache"),
    ("Expires", "0"),
];

/// Middleware adding the security headers unless a handler already set them
pub fn security_headers() -> DefaultHeaders {
    SECURITY_HEADERS
        .into_iter()
        .fold(DefaultHeaders::new(), |headers, header| headers.add(header))
}
