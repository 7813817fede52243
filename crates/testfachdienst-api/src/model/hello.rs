use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Greeting returned by `GET /hellozeta`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HelloZetaResource {
    #[schema(example = "Hello ZETA!")]
    pub message: String,
}

impl HelloZetaResource {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Liveness payload returned by `GET /jobs/info`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct JobInfo {
    #[schema(example = "fantastic!")]
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hello_zeta_resource_json() {
        let json = serde_json::to_string(&HelloZetaResource::new("Hello ZETA!")).unwrap();
        assert_eq!(json, r#"{"message":"Hello ZETA!"}"#);
    }

    #[test]
    fn test_hello_zeta_resource_equality() {
        assert_eq!(HelloZetaResource::new("a"), HelloZetaResource::new("a"));
        assert_ne!(HelloZetaResource::new("a"), HelloZetaResource::new("b"));
    }
}
