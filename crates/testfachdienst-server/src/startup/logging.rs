//! Console and file logging for the Testfachdienst
//!
//! Every event lands on the console and in `testfachdienst.log`. Events of
//! the two client channels and of the background jobs are also copied to a
//! channel file, so REST traffic, STOMP sessions and OTLP exports can be
//! read separately:
//!
//! | File              | Copied targets                                          |
//! |-------------------|---------------------------------------------------------|
//! | rest.log          | `api`, `middleware`, `error`                            |
//! | websocket.log     | `ws`                                                    |
//! | export.log        | `service::scheduler`, `service::export`, `service::self_disclosure` |
//! | persistence.log   | `testfachdienst_persistence`                            |

use std::path::PathBuf;
use std::str::FromStr;

use opentelemetry::trace::TracerProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use super::telemetry::{OtelConfig, init_tracer_provider};

/// Name of the log file receiving every event
pub const ROOT_LOG_FILE: &str = "testfachdienst.log";

pub const DEFAULT_LOG_DIR: &str = "logs";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Channel log files and the `tracing` targets copied into them
const CHANNEL_LOGS: &[(&str, &[&str])] = &[
    (
        "rest.log",
        &[
            "testfachdienst_server::api",
            "testfachdienst_server::middleware",
            "testfachdienst_server::error",
        ],
    ),
    ("websocket.log", &["testfachdienst_server::ws"]),
    (
        "export.log",
        &[
            "testfachdienst_server::service::scheduler",
            "testfachdienst_server::service::export",
            "testfachdienst_server::service::self_disclosure",
        ],
    ),
    ("persistence.log", &["testfachdienst_persistence"]),
];

/// How often log files roll over, `logging.rotation`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogRotation {
    #[default]
    Daily,
    Hourly,
    Never,
}

impl FromStr for LogRotation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "hourly" => Ok(Self::Hourly),
            "never" => Ok(Self::Never),
            other => Err(format!("unknown log rotation '{}'", other)),
        }
    }
}

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Never => Rotation::NEVER,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    pub log_dir: PathBuf,
    pub console: bool,
    pub file: bool,
    /// Level for console, root file and span export; `RUST_LOG` wins when set
    pub level: Level,
    pub rotation: LogRotation,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            console: true,
            file: true,
            level: Level::INFO,
            rotation: LogRotation::Daily,
        }
    }
}

/// Keeps the file writers and the span exporter alive
///
/// Call [`LoggingGuard::shutdown`] at the end of the shutdown sequence so
/// pending spans are exported while logging still works.
pub struct LoggingGuard {
    file_guards: Vec<WorkerGuard>,
    tracer_provider: Option<SdkTracerProvider>,
}

impl LoggingGuard {
    pub fn exports_spans(&self) -> bool {
        self.tracer_provider.is_some()
    }

    /// Flush pending spans, then the buffered log files
    pub fn shutdown(mut self) {
        if let Some(provider) = self.tracer_provider.take() {
            match provider.shutdown() {
                Ok(()) => tracing::info!("Span exporter flushed"),
                Err(e) => tracing::warn!(error = %e, "Span exporter did not shut down cleanly"),
            }
        }
        // dropping the worker guards writes out what is still buffered
        self.file_guards.clear();
    }
}

impl Drop for LoggingGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.tracer_provider.take() {
            let _ = provider.shutdown();
        }
    }
}

fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()))
}

fn file_layer(
    config: &LoggingConfig,
    file_name: &str,
    guards: &mut Vec<WorkerGuard>,
) -> impl Layer<Registry> + Send + Sync + use<> {
    let appender = RollingFileAppender::new(config.rotation.into(), &config.log_dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    guards.push(guard);
    fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_thread_names(true)
        .with_ansi(false)
}

fn channel_targets(targets: &[&str]) -> Targets {
    targets
        .iter()
        .fold(Targets::new(), |t, target| t.with_target(*target, LevelFilter::TRACE))
}

/// Install the global subscriber
///
/// Channel files capture every level of their targets. A span exporter that
/// fails to start is reported and skipped.
pub fn init_logging(
    config: &LoggingConfig,
    otel_config: &OtelConfig,
) -> anyhow::Result<LoggingGuard> {
    let mut guards = Vec::new();
    let mut layers: Vec<BoxedLayer> = Vec::new();

    if config.console {
        layers.push(Box::new(
            fmt::layer()
                .with_target(true)
                .with_thread_names(true)
                .with_filter(env_filter(config.level)),
        ));
    }

    if config.file {
        std::fs::create_dir_all(&config.log_dir)?;
        layers.push(Box::new(
            file_layer(config, ROOT_LOG_FILE, &mut guards).with_filter(env_filter(config.level)),
        ));
        for (file_name, targets) in CHANNEL_LOGS {
            layers.push(Box::new(
                file_layer(config, file_name, &mut guards).with_filter(channel_targets(targets)),
            ));
        }
    }

    let mut exporter_error = None;
    let tracer_provider = if otel_config.enabled {
        match init_tracer_provider(otel_config) {
            Ok(provider) => {
                let tracer = provider.tracer(otel_config.service_name.clone());
                layers.push(Box::new(
                    OpenTelemetryLayer::new(tracer).with_filter(LevelFilter::from(config.level)),
                ));
                Some(provider)
            }
            Err(e) => {
                exporter_error = Some(e);
                None
            }
        }
    } else {
        None
    };

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    if let Some(e) = exporter_error {
        tracing::warn!(endpoint = %otel_config.otlp_endpoint, error = %e, "Span export disabled");
    }
    if config.file {
        tracing::info!(
            log_dir = %config.log_dir.display(),
            rotation = ?config.rotation,
            channels = CHANNEL_LOGS.len(),
            "File logging initialized"
        );
    }

    Ok(LoggingGuard {
        file_guards: guards,
        tracer_provider,
    })
}
