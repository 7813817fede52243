//! Self-disclosure records
//!
//! A self-disclosure is a small log record announcing that this instance is
//! alive, tagged with the configured resource attributes and the pod name.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

/// Body of every self-disclosure record
pub const SELF_DISCLOSURE_BODY: &str = "Selbstauskunft";

/// Attribute carrying the pod name, read from `HOSTNAME`
pub const POD_NAME_ATTRIBUTE: &str = "pod_name";

/// A log record ready for export
#[derive(Clone, Debug, PartialEq)]
pub struct SelfDisclosureRecord {
    pub body: String,
    pub timestamp: DateTime<Utc>,
    pub attributes: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default)]
pub struct SelfDisclosureService {
    resource_attributes: BTreeMap<String, String>,
}

impl SelfDisclosureService {
    pub fn new(resource_attributes: BTreeMap<String, String>) -> Self {
        Self {
            resource_attributes,
        }
    }

    /// Build a fresh record stamped with the current time
    ///
    /// Kubernetes sets `HOSTNAME` to the pod name, so it is read on every call.
    pub fn generate_self_disclosure_record(&self) -> SelfDisclosureRecord {
        self.record_for_pod(std::env::var("HOSTNAME").ok())
    }

    fn record_for_pod(&self, pod_name: Option<String>) -> SelfDisclosureRecord {
        let mut attributes = self.resource_attributes.clone();
        if let Some(pod_name) = pod_name.filter(|p| !p.trim().is_empty()) {
            attributes.insert(POD_NAME_ATTRIBUTE.to_string(), pod_name);
        }

        SelfDisclosureRecord {
            body: SELF_DISCLOSURE_BODY.to_string(),
            timestamp: Utc::now(),
            attributes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> SelfDisclosureService {
        SelfDisclosureService::new(BTreeMap::from([
            ("tenant".to_string(), "zeta".to_string()),
            ("stage".to_string(), "test".to_string()),
        ]))
    }

    #[test]
    fn test_record_carries_body_and_attributes() {
        let before = Utc::now();
        let record = service().record_for_pod(None);
        assert_eq!(record.body, "Selbstauskunft");
        assert!(record.timestamp >= before);
        assert_eq!(record.attributes.len(), 2);
        assert_eq!(record.attributes["tenant"], "zeta");
    }

    #[test]
    fn test_pod_name_added_when_present() {
        let record = service().record_for_pod(Some("testfachdienst-7c9d".to_string()));
        assert_eq!(record.attributes[POD_NAME_ATTRIBUTE], "testfachdienst-7c9d");
    }

    #[test]
    fn test_blank_pod_name_ignored() {
        let record = service().record_for_pod(Some("  ".to_string()));
        assert!(!record.attributes.contains_key(POD_NAME_ATTRIBUTE));
    }

    #[test]
    fn test_without_configured_attributes() {
        let record = SelfDisclosureService::default().record_for_pod(None);
        assert!(record.attributes.is_empty());
    }
}
