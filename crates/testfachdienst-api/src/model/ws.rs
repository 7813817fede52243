use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// Error payload delivered to the sender's personal STOMP queue
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WebSocketErrorResponse {
    /// HTTP-like status code
    #[schema(example = 404)]
    pub status: u16,
    #[schema(example = "ERezept with id=42 not found")]
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<Value>,
}

impl WebSocketErrorResponse {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            timestamp: Utc::now(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Confirmation sent after `erezept.delete.{id}`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DeleteConfirmation {
    pub id: i64,
    #[schema(example = "deleted")]
    pub status: String,
}

impl DeleteConfirmation {
    pub fn deleted(id: i64) -> Self {
        Self {
            id,
            status: "deleted".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_omits_missing_details() {
        let json = serde_json::to_value(WebSocketErrorResponse::new(404, "gone")).unwrap();
        assert_eq!(json["status"], 404);
        assert_eq!(json["message"], "gone");
        assert!(json.get("timestamp").is_some());
        assert!(json.get("details").is_none());
    }

    #[test]
    fn test_error_response_with_details() {
        let response = WebSocketErrorResponse::new(400, "Validation failed")
            .with_details(serde_json::json!({"errors": {"dosage": "must not be blank"}}));
        let json = serde_json::to_value(response).unwrap();
        assert_eq!(json["details"]["errors"]["dosage"], "must not be blank");
    }

    #[test]
    fn test_delete_confirmation_json() {
        let json = serde_json::to_value(DeleteConfirmation::deleted(7)).unwrap();
        assert_eq!(json, serde_json::json!({"id": 7, "status": "deleted"}));
    }
}
