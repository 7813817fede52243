//! Context-aware STOMP destinations
//!
//! | Context path | Broker prefixes            | Application | User      |
//! |--------------|----------------------------|-------------|-----------|
//! | (none)       | `/topic`, `/queue`         | `/app`      | `/user`   |
//! | `C`          | `C/topic`, `/queue`, `C/queue` | `C/app` | `C/user`  |

use testfachdienst_common::{normalize_context_path, with_context_path};

/// Suffix of the prescription broadcast topic
pub const EREZEPT_TOPIC: &str = "/topic/erezept";

/// Personal reply queue, relative to the user prefix
pub const EREZEPT_REPLY_QUEUE: &str = "/queue/erezept";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StompDestinations {
    broker_prefixes: Vec<String>,
    application_prefix: String,
    user_prefix: String,
    erezept_topic: String,
}

impl StompDestinations {
    pub fn new(context_path: &str) -> Self {
        let context = normalize_context_path(Some(context_path));
        let broker_prefixes = if context.is_empty() {
            vec!["/topic".to_string(), "/queue".to_string()]
        } else {
            vec![
                with_context_path(&context, "/topic"),
                "/queue".to_string(),
                with_context_path(&context, "/queue"),
            ]
        };

        Self {
            broker_prefixes,
            application_prefix: with_context_path(&context, "/app"),
            user_prefix: with_context_path(&context, "/user"),
            erezept_topic: with_context_path(&context, EREZEPT_TOPIC),
        }
    }

    pub fn broker_prefixes(&self) -> &[String] {
        &self.broker_prefixes
    }

    pub fn application_prefix(&self) -> &str {
        &self.application_prefix
    }

    pub fn user_prefix(&self) -> &str {
        &self.user_prefix
    }

    /// Broadcast topic for prescription changes
    pub fn erezept_topic(&self) -> &str {
        &self.erezept_topic
    }

    /// Destination a client subscribes to for its personal replies
    pub fn user_destination(&self, queue: &str) -> String {
        format!("{}{}", self.user_prefix, queue)
    }

    /// Handler name of an application destination (`/app/erezept.list` → `erezept.list`)
    pub fn application_destination<'a>(&self, destination: &'a str) -> Option<&'a str> {
        destination
            .strip_prefix(self.application_prefix.as_str())?
            .strip_prefix('/')
            .filter(|rest| !rest.is_empty())
    }

    pub fn is_broker_destination(&self, destination: &str) -> bool {
        self.broker_prefixes
            .iter()
            .any(|prefix| matches_prefix(destination, prefix))
    }

    pub fn is_user_destination(&self, destination: &str) -> bool {
        matches_prefix(destination, &self.user_prefix)
    }
}

fn matches_prefix(destination: &str, prefix: &str) -> bool {
    destination
        .strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destinations_without_context_path() {
        let d = StompDestinations::new("");
        assert_eq!(d.broker_prefixes(), ["/topic", "/queue"]);
        assert_eq!(d.application_prefix(), "/app");
        assert_eq!(d.user_prefix(), "/user");
        assert_eq!(d.erezept_topic(), "/topic/erezept");
        assert_eq!(d.user_destination(EREZEPT_REPLY_QUEUE), "/user/queue/erezept");
    }

    #[test]
    fn test_destinations_with_context_path() {
        let d = StompDestinations::new("testfachdienst/");
        assert_eq!(
            d.broker_prefixes(),
            ["/testfachdienst/topic", "/queue", "/testfachdienst/queue"]
        );
        assert_eq!(d.application_prefix(), "/testfachdienst/app");
        assert_eq!(d.user_prefix(), "/testfachdienst/user");
        assert_eq!(d.erezept_topic(), "/testfachdienst/topic/erezept");
    }

    #[test]
    fn test_application_destination() {
        let d = StompDestinations::new("/ctx");
        assert_eq!(
            d.application_destination("/ctx/app/erezept.read.5"),
            Some("erezept.read.5")
        );
        assert_eq!(d.application_destination("/app/erezept.list"), None);
        assert_eq!(d.application_destination("/ctx/app"), None);
        assert_eq!(d.application_destination("/ctx/application/x"), None);
    }

    #[test]
    fn test_broker_destination_requires_segment_boundary() {
        let d = StompDestinations::new("");
        assert!(d.is_broker_destination("/topic/erezept"));
        assert!(d.is_broker_destination("/queue/erezept"));
        assert!(!d.is_broker_destination("/topics/erezept"));
        assert!(!d.is_broker_destination("/app/erezept.list"));
        assert!(d.is_user_destination("/user/queue/erezept"));
    }
}
