//! Context path helpers
//!
//! The service can be mounted under a context path (e.g. `/testfachdienst`).
//! REST `Location` headers and STOMP destinations are both derived from it.

/// Normalize a configured context path.
///
/// Blank values and `/` collapse to the empty string, a leading `/` is ensured
/// and a single trailing `/` is removed.
///
/// # Examples
///
/// ```
/// use testfachdienst_common::normalize_context_path;
///
/// assert_eq!(normalize_context_path(None), "");
/// assert_eq!(normalize_context_path(Some("/")), "");
/// assert_eq!(normalize_context_path(Some("ctx/")), "/ctx");
/// ```
pub fn normalize_context_path(context_path: Option<&str>) -> String {
    let raw = match context_path {
        Some(v) => v.trim(),
        None => return String::new(),
    };

    if raw.is_empty() || raw == "/" {
        return String::new();
    }

    let mut normalized = if raw.starts_with('/') {
        raw.to_string()
    } else {
        format!("/{}", raw)
    };

    if normalized.ends_with('/') {
        normalized.pop();
    }

    normalized
}

/// Prefix a path or destination with the normalized context path
pub fn with_context_path(context_path: &str, destination: &str) -> String {
    format!("{}{}", normalize_context_path(Some(context_path)), destination)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_context_path_blank() {
        assert_eq!(normalize_context_path(None), "");
        assert_eq!(normalize_context_path(Some("")), "");
        assert_eq!(normalize_context_path(Some("   ")), "");
        assert_eq!(normalize_context_path(Some("/")), "");
    }

    #[test]
    fn test_normalize_context_path_adds_leading_slash() {
        assert_eq!(normalize_context_path(Some("ctx")), "/ctx");
        assert_eq!(normalize_context_path(Some("/ctx")), "/ctx");
    }

    #[test]
    fn test_normalize_context_path_strips_trailing_slash() {
        assert_eq!(normalize_context_path(Some("/ctx/")), "/ctx");
        assert_eq!(normalize_context_path(Some("ctx/")), "/ctx");
        assert_eq!(normalize_context_path(Some("/a/b/")), "/a/b");
    }

    #[test]
    fn test_with_context_path() {
        assert_eq!(with_context_path("", "/topic/erezept"), "/topic/erezept");
        assert_eq!(
            with_context_path("ctx/", "/topic/erezept"),
            "/ctx/topic/erezept"
        );
        assert_eq!(with_context_path("/", "/app"), "/app");
    }
}
