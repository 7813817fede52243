//! Configuration management for the Testfachdienst server
//!
//! Values are layered from `conf/application.yml`, then environment variables
//! (`TESTFACHDIENST__SERVER__PORT=9090` maps to `server.port`), then CLI flags.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use config::{Config, ConfigError, Environment, File};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use testfachdienst_common::{
    APP_NAME, APP_VERSION, DEFAULT_MANAGEMENT_PORT, DEFAULT_SERVER_PORT, normalize_context_path,
};

use crate::model::tls::TlsConfig;
use crate::startup::{LoggingConfig, OtelConfig};
use crate::ws::broker::DEFAULT_OUTBOUND_QUEUE_CAPACITY;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "TESTFACHDIENST";

/// Separator between nested keys in environment variable names
pub const ENV_SEPARATOR: &str = "__";

/// Default in-memory database, shared by all pooled connections
pub const DEFAULT_DATABASE_URL: &str = "sqlite::memory:";

/// Default interval of the self-disclosure export job
pub const DEFAULT_EXPORT_INTERVAL_SECONDS: u64 = 60;

/// Default share of the container memory limit the process may budget for
pub const DEFAULT_MAX_RAM_PERCENTAGE: f64 = 75.0;

/// Command line arguments for the server
#[derive(Debug, Parser)]
#[command(name = "testfachdienst-server", version, about)]
pub struct Cli {
    /// Configuration file (optional, YAML)
    #[arg(
        short = 'c',
        long = "config",
        env = "TESTFACHDIENST_CONFIG",
        default_value = "conf/application.yml"
    )]
    pub config_file: String,
    /// HTTP port of the service
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,
    /// Port of the management server
    #[arg(long = "management-port")]
    pub management_port: Option<u16>,
    /// Context path all routes are mounted under
    #[arg(long = "context-path")]
    pub context_path: Option<String>,
    #[arg(long = "db-url", env = "DATABASE_URL")]
    pub database_url: Option<String>,
}

/// Settings of the OTLP self-disclosure log export
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelfDisclosureExportConfig {
    pub grpc_export_enabled: bool,
    pub grpc_host: String,
    pub http_export_enabled: bool,
    pub http_host: String,
    pub interval_seconds: u64,
}

impl Default for SelfDisclosureExportConfig {
    fn default() -> Self {
        Self {
            grpc_export_enabled: false,
            grpc_host: String::new(),
            http_export_enabled: false,
            http_host: String::new(),
            interval_seconds: DEFAULT_EXPORT_INTERVAL_SECONDS,
        }
    }
}

/// `TESTFACHDIENST__MEMORY__MAX_RAM_PERCENTAGE` maps to `memory.max_ram_percentage`
fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_SEPARATOR)
        .separator(ENV_SEPARATOR)
        .try_parsing(true)
}

/// Application configuration loaded from config files and environment
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    /// Parse CLI arguments and load the layered configuration
    pub fn new() -> Result<Self, ConfigError> {
        Self::load(Cli::parse())
    }

    pub fn load(args: Cli) -> Result<Self, ConfigError> {
        let mut config_builder = Config::builder()
            .add_source(File::with_name(&args.config_file).required(false))
            .add_source(environment());

        if let Some(v) = args.port {
            config_builder = config_builder.set_override("server.port", i64::from(v))?;
        }
        if let Some(v) = args.management_port {
            config_builder = config_builder.set_override("management.port", i64::from(v))?;
        }
        if let Some(v) = args.context_path {
            config_builder = config_builder.set_override("server.context_path", v)?;
        }
        if let Some(v) = args.database_url {
            config_builder = config_builder.set_override("db.url", v)?;
        }

        Ok(Configuration {
            config: config_builder.build()?,
        })
    }

    pub fn from_config(config: Config) -> Self {
        Configuration { config }
    }

    // ========================================================================
    // Server Configuration
    // ========================================================================

    pub fn server_address(&self) -> String {
        self.config
            .get_string("server.address")
            .unwrap_or("0.0.0.0".to_string())
    }

    pub fn server_port(&self) -> u16 {
        self.config
            .get_int("server.port")
            .unwrap_or(DEFAULT_SERVER_PORT.into()) as u16
    }

    /// Normalized context path, empty when the service is mounted at `/`
    pub fn server_context_path(&self) -> String {
        normalize_context_path(self.config.get_string("server.context_path").ok().as_deref())
    }

    pub fn tls_config(&self) -> TlsConfig {
        TlsConfig {
            enabled: self.config.get_bool("server.tls.enabled").unwrap_or(false),
            cert_path: self
                .config
                .get_string("server.tls.cert_path")
                .ok()
                .map(PathBuf::from),
            key_path: self
                .config
                .get_string("server.tls.key_path")
                .ok()
                .map(PathBuf::from),
            ca_cert_path: self
                .config
                .get_string("server.tls.ca_cert_path")
                .ok()
                .map(PathBuf::from),
            mtls_enabled: self
                .config
                .get_bool("server.tls.mtls_enabled")
                .unwrap_or(false),
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(
            self.config
                .get_int("server.shutdown_timeout_secs")
                .unwrap_or(30) as u64,
        )
    }

    pub fn workers(&self) -> Option<usize> {
        self.config
            .get_int("server.workers")
            .ok()
            .filter(|v| *v > 0)
            .map(|v| v as usize)
    }

    // ========================================================================
    // Management Configuration
    // ========================================================================

    pub fn management_enabled(&self) -> bool {
        self.config.get_bool("management.enabled").unwrap_or(true)
    }

    pub fn management_address(&self) -> String {
        self.config
            .get_string("management.address")
            .unwrap_or_else(|_| self.server_address())
    }

    pub fn management_port(&self) -> u16 {
        self.config
            .get_int("management.port")
            .unwrap_or(DEFAULT_MANAGEMENT_PORT.into()) as u16
    }

    // ========================================================================
    // Database Configuration
    // ========================================================================

    pub fn database_url(&self) -> String {
        self.config
            .get_string("db.url")
            .unwrap_or(DEFAULT_DATABASE_URL.to_string())
    }

    pub async fn database_connection(&self) -> anyhow::Result<DatabaseConnection> {
        let max_connections = self
            .config
            .get_int("db.pool.max_connections")
            .unwrap_or(10) as u32;
        let min_connections = self
            .config
            .get_int("db.pool.min_connections")
            .unwrap_or(1) as u32;
        let connect_timeout = self
            .config
            .get_int("db.pool.connect_timeout_secs")
            .unwrap_or(30) as u64;
        let acquire_timeout = self
            .config
            .get_int("db.pool.acquire_timeout_secs")
            .unwrap_or(8) as u64;
        let sqlx_logging = self
            .config
            .get_bool("db.pool.sqlx_logging")
            .unwrap_or(false);

        let url = self.database_url();
        let in_memory = url.starts_with("sqlite") && url.contains(":memory:");

        let mut opt = ConnectOptions::new(url);

        opt.max_connections(max_connections)
            .min_connections(min_connections.max(1))
            .connect_timeout(Duration::from_secs(connect_timeout))
            .acquire_timeout(Duration::from_secs(acquire_timeout))
            .sqlx_logging(sqlx_logging);

        // an in-memory database lives only as long as one of its connections
        if !in_memory {
            let idle_timeout = self
                .config
                .get_int("db.pool.idle_timeout_secs")
                .unwrap_or(600) as u64;
            let max_lifetime = self
                .config
                .get_int("db.pool.max_lifetime_secs")
                .unwrap_or(1800) as u64;
            opt.idle_timeout(Duration::from_secs(idle_timeout))
                .max_lifetime(Duration::from_secs(max_lifetime));
        }

        Ok(Database::connect(opt).await?)
    }

    // ========================================================================
    // Self-disclosure export Configuration
    // ========================================================================

    pub fn self_disclosure_export_config(&self) -> SelfDisclosureExportConfig {
        SelfDisclosureExportConfig {
            grpc_export_enabled: self
                .config
                .get_bool("otlp.export.logs.grpc.enabled")
                .unwrap_or(false),
            grpc_host: self
                .config
                .get_string("otlp.export.logs.grpc.host")
                .unwrap_or_default(),
            http_export_enabled: self
                .config
                .get_bool("otlp.export.logs.http.enabled")
                .unwrap_or(false),
            http_host: self
                .config
                .get_string("otlp.export.logs.http.host")
                .unwrap_or_default(),
            interval_seconds: self
                .config
                .get_int("otlp.export.logs.interval_seconds")
                .ok()
                .filter(|v| *v > 0)
                .map(|v| v as u64)
                .unwrap_or(DEFAULT_EXPORT_INTERVAL_SECONDS),
        }
    }

    /// Attributes attached to every self-disclosure record
    pub fn self_disclosure_resource_attributes(&self) -> BTreeMap<String, String> {
        self.config
            .get_table("self_disclosure.resource_attributes")
            .map(|table| {
                table
                    .into_iter()
                    .filter_map(|(k, v)| v.into_string().ok().map(|v| (k, v)))
                    .collect()
            })
            .unwrap_or_default()
    }

    // ========================================================================
    // Observability Configuration
    // ========================================================================

    /// Unparsable `logging.level` or `logging.rotation` values fall back to the defaults
    pub fn logging_config(&self) -> LoggingConfig {
        let defaults = LoggingConfig::default();
        LoggingConfig {
            log_dir: self
                .config
                .get_string("logging.dir")
                .ok()
                .filter(|d| !d.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.log_dir),
            console: self.config.get_bool("logging.console").unwrap_or(true),
            file: self.config.get_bool("logging.file").unwrap_or(true),
            level: self
                .config
                .get_string("logging.level")
                .ok()
                .and_then(|l| l.parse().ok())
                .unwrap_or(defaults.level),
            rotation: self
                .config
                .get_string("logging.rotation")
                .ok()
                .and_then(|r| r.parse().ok())
                .unwrap_or(defaults.rotation),
        }
    }

    /// Span export settings; the trace resource reuses the self-disclosure attributes
    pub fn otel_config(&self) -> OtelConfig {
        OtelConfig {
            enabled: self.config.get_bool("otel.enabled").unwrap_or(false),
            otlp_endpoint: self
                .config
                .get_string("otel.endpoint")
                .unwrap_or_else(|_| "http://localhost:4317".to_string()),
            service_name: self
                .config
                .get_string("otel.service_name")
                .unwrap_or_else(|_| APP_NAME.to_string()),
            service_version: self.version(),
            sampling_ratio: self
                .config
                .get_float("otel.sampling_ratio")
                .unwrap_or(1.0)
                .clamp(0.0, 1.0),
            export_timeout: Duration::from_secs(
                self.config
                    .get_int("otel.export_timeout_secs")
                    .ok()
                    .filter(|v| *v > 0)
                    .unwrap_or(10) as u64,
            ),
            resource_attributes: self.self_disclosure_resource_attributes(),
            pod_name: std::env::var("HOSTNAME").ok(),
        }
    }

    /// Per-session outbound STOMP queue size
    pub fn websocket_outbound_queue_capacity(&self) -> usize {
        self.config
            .get_int("websocket.outbound_queue_capacity")
            .ok()
            .filter(|v| *v > 0)
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_OUTBOUND_QUEUE_CAPACITY)
    }

    pub fn max_ram_percentage(&self) -> f64 {
        self.config
            .get_float("memory.max_ram_percentage")
            .ok()
            .filter(|v| *v > 0.0 && *v <= 100.0)
            .unwrap_or(DEFAULT_MAX_RAM_PERCENTAGE)
    }

    pub fn version(&self) -> String {
        APP_VERSION.to_string()
    }
}
