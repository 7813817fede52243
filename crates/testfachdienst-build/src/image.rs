//! Container image descriptor
//!
//! Renders either a Dockerfile for `docker build` or an OCI image config
//! document. The creation timestamp is taken when the descriptor is built,
//! so a descriptor is never reused across invocations.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value, json};
use thiserror::Error;

pub const DEFAULT_BASE_IMAGE: &str = "gcr.io/distroless/cc-debian12";
pub const DEFAULT_TARGET_IMAGE: &str =
    "your-docker-registry.example.org/zeta/testing/testfachdienst";
pub const DEFAULT_PORTS: [u16; 2] = [8080, 8081];
pub const DEFAULT_WORKING_DIR: &str = "/app";
pub const LATEST_TAG: &str = "latest";

pub const SERVER_BINARY: &str = "testfachdienst-server";
pub const IMAGE_TITLE: &str = "testfachdienst";

pub const LABEL_TITLE: &str = "org.opencontainers.image.title";
pub const LABEL_VERSION: &str = "org.opencontainers.image.version";

/// Environment variable carrying the memory budget into the container
pub const MAX_RAM_PERCENTAGE_ENV: &str = "TESTFACHDIENST__MEMORY__MAX_RAM_PERCENTAGE";
pub const DEFAULT_MAX_RAM_PERCENTAGE: &str = "75.0";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImageError {
    #[error("image must not run as root (uid 0)")]
    RootUser,
    #[error("image must expose at least one port")]
    NoPorts,
    #[error("image needs at least one tag")]
    NoTags,
    #[error("base image must not be empty")]
    EmptyBaseImage,
}

/// Execution identity inside the container
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageUser {
    pub uid: u32,
    pub gid: u32,
}

impl ImageUser {
    /// The `nonroot` user of the distroless images
    pub const NON_ROOT: ImageUser = ImageUser {
        uid: 65532,
        gid: 65532,
    };
}

impl Display for ImageUser {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.uid, self.gid)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImageDescriptor {
    pub base_image: String,
    pub target_image: String,
    pub tags: Vec<String>,
    pub ports: Vec<u16>,
    pub user: ImageUser,
    pub working_dir: String,
    pub environment: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    pub created: DateTime<Utc>,
    pub binary: String,
}

impl ImageDescriptor {
    /// Descriptor with the release defaults for `version`
    pub fn for_version(version: &str) -> Self {
        let environment = BTreeMap::from([(
            MAX_RAM_PERCENTAGE_ENV.to_string(),
            DEFAULT_MAX_RAM_PERCENTAGE.to_string(),
        )]);
        let labels = BTreeMap::from([
            (LABEL_TITLE.to_string(), IMAGE_TITLE.to_string()),
            (LABEL_VERSION.to_string(), version.to_string()),
        ]);

        Self {
            base_image: DEFAULT_BASE_IMAGE.to_string(),
            target_image: DEFAULT_TARGET_IMAGE.to_string(),
            tags: vec![version.to_string(), LATEST_TAG.to_string()],
            ports: DEFAULT_PORTS.to_vec(),
            user: ImageUser::NON_ROOT,
            working_dir: DEFAULT_WORKING_DIR.to_string(),
            environment,
            labels,
            created: Utc::now(),
            binary: SERVER_BINARY.to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), ImageError> {
        if self.user.uid == 0 {
            return Err(ImageError::RootUser);
        }
        if self.ports.is_empty() {
            return Err(ImageError::NoPorts);
        }
        if self.tags.is_empty() {
            return Err(ImageError::NoTags);
        }
        if self.base_image.trim().is_empty() {
            return Err(ImageError::EmptyBaseImage);
        }
        Ok(())
    }

    /// Fully qualified references, one per tag
    pub fn image_references(&self) -> Vec<String> {
        self.tags
            .iter()
            .map(|tag| format!("{}:{}", self.target_image, tag))
            .collect()
    }

    fn entrypoint(&self) -> String {
        format!("{}/{}", self.working_dir, self.binary)
    }

    fn created_rfc3339(&self) -> String {
        self.created.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    pub fn dockerfile(&self) -> Result<String, ImageError> {
        self.validate()?;

        let mut lines = vec![
            format!("FROM {}", self.base_image),
            format!("WORKDIR {}", self.working_dir),
            format!("COPY target/release/{} {}", self.binary, self.entrypoint()),
            format!("COPY conf {}/conf", self.working_dir),
        ];
        for (key, value) in &self.environment {
            lines.push(format!("ENV {}={}", key, value));
        }
        for (key, value) in &self.labels {
            lines.push(format!("LABEL {}=\"{}\"", key, value));
        }
        lines.push(format!(
            "LABEL org.opencontainers.image.created=\"{}\"",
            self.created_rfc3339()
        ));
        lines.push(format!(
            "EXPOSE {}",
            self.ports
                .iter()
                .map(u16::to_string)
                .collect::<Vec<_>>()
                .join(" ")
        ));
        lines.push(format!("USER {}", self.user));
        lines.push(format!("ENTRYPOINT [\"{}\"]", self.entrypoint()));

        let mut dockerfile = lines.join("\n");
        dockerfile.push('\n');
        Ok(dockerfile)
    }

    /// OCI image configuration (`config.json`)
    pub fn oci_config(&self) -> Result<Value, ImageError> {
        self.validate()?;

        let exposed_ports: Map<String, Value> = self
            .ports
            .iter()
            .map(|port| (format!("{}/tcp", port), json!({})))
            .collect();
        let env: Vec<String> = self
            .environment
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();

        Ok(json!({
            "created": self.created_rfc3339(),
            "architecture": "amd64",
            "os": "linux",
            "config": {
                "User": self.user.to_string(),
                "ExposedPorts": exposed_ports,
                "Env": env,
                "Entrypoint": [self.entrypoint()],
                "WorkingDir": self.working_dir,
                "Labels": self.labels,
            },
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_defaults() {
        let image = ImageDescriptor::for_version("0.1.3");
        assert_eq!(image.ports, vec![8080, 8081]);
        assert_eq!(image.user.to_string(), "65532:65532");
        assert_eq!(image.tags, vec!["0.1.3", "latest"]);
        assert_eq!(image.labels.get(LABEL_VERSION).unwrap(), "0.1.3");
        assert_eq!(
            image.image_references(),
            vec![
                format!("{}:0.1.3", DEFAULT_TARGET_IMAGE),
                format!("{}:latest", DEFAULT_TARGET_IMAGE),
            ]
        );
    }

    #[test]
    fn test_dockerfile() {
        let dockerfile = ImageDescriptor::for_version("0.1.3").dockerfile().unwrap();
        assert!(dockerfile.starts_with("FROM gcr.io/distroless/cc-debian12\n"));
        assert!(dockerfile.contains("WORKDIR /app\n"));
        assert!(dockerfile.contains("EXPOSE 8080 8081\n"));
        assert!(dockerfile.contains("USER 65532:65532\n"));
        assert!(dockerfile.contains("ENV TESTFACHDIENST__MEMORY__MAX_RAM_PERCENTAGE=75.0\n"));
        assert!(dockerfile.contains("LABEL org.opencontainers.image.title=\"testfachdienst\"\n"));
        assert!(dockerfile.ends_with("ENTRYPOINT [\"/app/testfachdienst-server\"]\n"));
    }

    #[test]
    fn test_oci_config() {
        let config = ImageDescriptor::for_version("0.1.3").oci_config().unwrap();
        assert_eq!(config["config"]["User"], "65532:65532");
        assert_eq!(config["config"]["WorkingDir"], "/app");
        let ports = config["config"]["ExposedPorts"].as_object().unwrap();
        assert_eq!(ports.len(), 2);
        assert!(ports.contains_key("8080/tcp"));
        assert!(ports.contains_key("8081/tcp"));
        assert_eq!(config["config"]["Labels"][LABEL_VERSION], "0.1.3");
    }

    #[test]
    fn test_rejects_root_and_missing_ports() {
        let mut image = ImageDescriptor::for_version("1.0.0");
        image.user = ImageUser { uid: 0, gid: 0 };
        assert_eq!(image.dockerfile(), Err(ImageError::RootUser));

        let mut image = ImageDescriptor::for_version("1.0.0");
        image.ports.clear();
        assert_eq!(image.oci_config().unwrap_err(), ImageError::NoPorts);
    }

    #[test]
    fn test_created_is_fresh_per_descriptor() {
        let first = ImageDescriptor::for_version("1.0.0");
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = ImageDescriptor::for_version("1.0.0");
        assert!(second.created > first.created);
    }
}
