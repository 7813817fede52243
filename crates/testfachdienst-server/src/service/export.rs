//! OTLP export of self-disclosure records
//!
//! The exporter is built on the first export and reused afterwards. gRPC is
//! preferred when both transports are enabled.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
use opentelemetry_proto::tonic::collector::logs::v1::logs_service_client::LogsServiceClient;
use opentelemetry_proto::tonic::common::v1::{
    AnyValue, InstrumentationScope, KeyValue, any_value,
};
use opentelemetry_proto::tonic::logs::v1::{LogRecord, ResourceLogs, ScopeLogs, SeverityNumber};
use opentelemetry_proto::tonic::resource::v1::Resource;
use parking_lot::Mutex;
use prost::Message;
use testfachdienst_common::{APP_NAME, APP_VERSION, TestfachdienstError};
use tonic::transport::{Channel, Endpoint};
use tracing::{debug, info};

use crate::model::config::SelfDisclosureExportConfig;
use crate::service::scheduler::Job;
use crate::service::self_disclosure::{SelfDisclosureRecord, SelfDisclosureService};

const HTTP_SCHEME: &str = "http://";
const HTTPS_SCHEME: &str = "https://";

/// Path of the OTLP/HTTP logs endpoint, appended when a host has no path
pub const OTLP_HTTP_LOGS_PATH: &str = "/v1/logs";

const EXPORT_TIMEOUT: Duration = Duration::from_secs(10);
const INSTRUMENTATION_SCOPE: &str = "testfachdienst.self-disclosure";

/// Sends log records to a collector
#[async_trait]
pub trait LogRecordExporter: Send + Sync {
    async fn export(&self, records: Vec<SelfDisclosureRecord>) -> anyhow::Result<()>;

    fn endpoint(&self) -> &str;
}

/// Creates exporters for a normalized endpoint
pub trait OtlpLogExporterFactory: Send + Sync {
    fn create_http_exporter(&self, endpoint: &str) -> anyhow::Result<Arc<dyn LogRecordExporter>>;

    fn create_grpc_exporter(&self, endpoint: &str) -> anyhow::Result<Arc<dyn LogRecordExporter>>;
}

/// Exporters speaking OTLP/HTTP (protobuf) and OTLP/gRPC
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultOtlpLogExporterFactory;

impl OtlpLogExporterFactory for DefaultOtlpLogExporterFactory {
    fn create_http_exporter(&self, endpoint: &str) -> anyhow::Result<Arc<dyn LogRecordExporter>> {
        Ok(Arc::new(HttpLogRecordExporter::new(endpoint)?))
    }

    fn create_grpc_exporter(&self, endpoint: &str) -> anyhow::Result<Arc<dyn LogRecordExporter>> {
        Ok(Arc::new(GrpcLogRecordExporter::new(endpoint)?))
    }
}

/// Build the OTLP request carrying `records`
pub fn to_export_request(records: &[SelfDisclosureRecord]) -> ExportLogsServiceRequest {
    let log_records = records
        .iter()
        .map(|record| {
            let time = record.timestamp.timestamp_nanos_opt().unwrap_or_default() as u64;
            LogRecord {
                time_unix_nano: time,
                observed_time_unix_nano: time,
                severity_number: SeverityNumber::Info as i32,
                severity_text: "INFO".to_string(),
                body: Some(string_value(&record.body)),
                attributes: record
                    .attributes
                    .iter()
                    .map(|(k, v)| key_value(k, v))
                    .collect(),
                ..Default::default()
            }
        })
        .collect();

    ExportLogsServiceRequest {
        resource_logs: vec![ResourceLogs {
            resource: Some(Resource {
                attributes: vec![
                    key_value("service.name", APP_NAME),
                    key_value("service.version", APP_VERSION),
                ],
                ..Default::default()
            }),
            scope_logs: vec![ScopeLogs {
                scope: Some(InstrumentationScope {
                    name: INSTRUMENTATION_SCOPE.to_string(),
                    version: APP_VERSION.to_string(),
                    ..Default::default()
                }),
                log_records,
                ..Default::default()
            }],
            ..Default::default()
        }],
        ..Default::default()
    }
}

fn string_value(value: &str) -> AnyValue {
    AnyValue {
        value: Some(any_value::Value::StringValue(value.to_string())),
    }
}

fn key_value(key: &str, value: &str) -> KeyValue {
    KeyValue {
        key: key.to_string(),
        value: Some(string_value(value)),
        ..Default::default()
    }
}

/// OTLP/HTTP exporter posting protobuf payloads
pub struct HttpLogRecordExporter {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpLogRecordExporter {
    pub fn new(endpoint: &str) -> anyhow::Result<Self> {
        let mut url = reqwest::Url::parse(endpoint)?;
        if url.path().is_empty() || url.path() == "/" {
            url.set_path(OTLP_HTTP_LOGS_PATH);
        }

        let client = reqwest::Client::builder().timeout(EXPORT_TIMEOUT).build()?;

        Ok(Self {
            endpoint: url.to_string(),
            client,
        })
    }
}

#[async_trait]
impl LogRecordExporter for HttpLogRecordExporter {
    async fn export(&self, records: Vec<SelfDisclosureRecord>) -> anyhow::Result<()> {
        let body = to_export_request(&records).encode_to_vec();

        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/x-protobuf")
            .body(body)
            .send()
            .await
            .map_err(|e| TestfachdienstError::ExportError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TestfachdienstError::ExportError(format!(
                "OTLP HTTP export to {} failed with status {}",
                self.endpoint, status
            ))
            .into());
        }
        Ok(())
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// OTLP/gRPC exporter on a lazily connected channel
pub struct GrpcLogRecordExporter {
    endpoint: String,
    client: LogsServiceClient<Channel>,
}

impl GrpcLogRecordExporter {
    pub fn new(endpoint: &str) -> anyhow::Result<Self> {
        let channel = Endpoint::from_shared(endpoint.to_string())?
            .timeout(EXPORT_TIMEOUT)
            .connect_lazy();

        Ok(Self {
            endpoint: endpoint.to_string(),
            client: LogsServiceClient::new(channel),
        })
    }
}

#[async_trait]
impl LogRecordExporter for GrpcLogRecordExporter {
    async fn export(&self, records: Vec<SelfDisclosureRecord>) -> anyhow::Result<()> {
        let mut client = self.client.clone();
        client
            .export(to_export_request(&records))
            .await
            .map_err(|status| {
                TestfachdienstError::ExportError(format!(
                    "OTLP gRPC export to {} failed: {}",
                    self.endpoint,
                    status.message()
                ))
            })?;
        Ok(())
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Periodic export of self-disclosure records
pub struct SelfDisclosureExportService {
    self_disclosure: SelfDisclosureService,
    config: SelfDisclosureExportConfig,
    exporter_factory: Arc<dyn OtlpLogExporterFactory>,
    log_exporter: Mutex<Option<Arc<dyn LogRecordExporter>>>,
    closed: AtomicBool,
}

impl SelfDisclosureExportService {
    pub fn new(self_disclosure: SelfDisclosureService, config: SelfDisclosureExportConfig) -> Self {
        Self::with_factory(
            self_disclosure,
            config,
            Arc::new(DefaultOtlpLogExporterFactory),
        )
    }

    pub fn with_factory(
        self_disclosure: SelfDisclosureService,
        config: SelfDisclosureExportConfig,
        exporter_factory: Arc<dyn OtlpLogExporterFactory>,
    ) -> Self {
        Self {
            self_disclosure,
            config,
            exporter_factory,
            log_exporter: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_enabled(&self) -> bool {
        (self.config.grpc_export_enabled || self.config.http_export_enabled)
            && !self.closed.load(Ordering::Acquire)
    }

    /// Release the exporter; later export calls do nothing
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if let Some(exporter) = self.log_exporter.lock().take() {
            info!(endpoint = exporter.endpoint(), "OTLP log exporter released");
        }
    }

    pub fn export_interval(&self) -> Duration {
        Duration::from_secs(self.config.interval_seconds)
    }

    /// Export one freshly generated record
    ///
    /// Does nothing while both transports are disabled.
    pub async fn export_self_disclosure(&self) -> anyhow::Result<()> {
        if !self.is_enabled() {
            debug!("OTLP export disabled; skipping self disclosure export");
            return Ok(());
        }

        let exporter = self.log_exporter()?;
        let record = self.self_disclosure.generate_self_disclosure_record();
        exporter.export(vec![record]).await?;
        debug!(endpoint = exporter.endpoint(), "Self disclosure exported");
        Ok(())
    }

    fn log_exporter(&self) -> anyhow::Result<Arc<dyn LogRecordExporter>> {
        let mut guard = self.log_exporter.lock();
        if let Some(exporter) = guard.as_ref() {
            return Ok(exporter.clone());
        }
        let exporter = self.setup_log_exporter()?;
        *guard = Some(exporter.clone());
        Ok(exporter)
    }

    fn setup_log_exporter(&self) -> anyhow::Result<Arc<dyn LogRecordExporter>> {
        if self.config.grpc_export_enabled && self.config.http_export_enabled {
            info!("Both OTLP HTTP and gRPC export are enabled; defaulting to gRPC exporter");
        }

        if self.config.grpc_export_enabled {
            let endpoint = normalize_endpoint(&self.config.grpc_host, "gRPC")?;
            return self.exporter_factory.create_grpc_exporter(&endpoint);
        }
        if self.config.http_export_enabled {
            let endpoint = normalize_endpoint(&self.config.http_host, "HTTP")?;
            return self.exporter_factory.create_http_exporter(&endpoint);
        }
        Err(TestfachdienstError::ConfigError("No OTLP exporter enabled".to_string()).into())
    }
}

#[async_trait]
impl Job for SelfDisclosureExportService {
    async fn run(&self) -> anyhow::Result<()> {
        self.export_self_disclosure().await
    }

    async fn on_shutdown(&self) {
        self.close();
    }
}

/// Prefix `http://` when the host carries no scheme
pub fn normalize_endpoint(endpoint: &str, exporter_type: &str) -> anyhow::Result<String> {
    let endpoint = endpoint.trim();
    if endpoint.is_empty() {
        return Err(TestfachdienstError::ConfigError(format!(
            "OTLP {} host must not be empty",
            exporter_type
        ))
        .into());
    }
    if endpoint.starts_with(HTTP_SCHEME) || endpoint.starts_with(HTTPS_SCHEME) {
        return Ok(endpoint.to_string());
    }

    let normalized = format!("{}{}", HTTP_SCHEME, endpoint);
    info!(
        "OTLP {} host '{}' missing scheme, defaulting to '{}'",
        exporter_type, endpoint, normalized
    );
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct RecordingExporter {
        exported: Mutex<Vec<SelfDisclosureRecord>>,
    }

    #[async_trait]
    impl LogRecordExporter for RecordingExporter {
        async fn export(&self, records: Vec<SelfDisclosureRecord>) -> anyhow::Result<()> {
            self.exported.lock().extend(records);
            Ok(())
        }

        fn endpoint(&self) -> &str {
            "recording"
        }
    }

    #[derive(Default)]
    struct FakeFactory {
        exporter: Arc<RecordingExporter>,
        http_calls: AtomicUsize,
        grpc_calls: AtomicUsize,
        endpoints: Mutex<Vec<String>>,
    }

    impl OtlpLogExporterFactory for FakeFactory {
        fn create_http_exporter(
            &self,
            endpoint: &str,
        ) -> anyhow::Result<Arc<dyn LogRecordExporter>> {
            self.http_calls.fetch_add(1, Ordering::SeqCst);
            self.endpoints.lock().push(endpoint.to_string());
            Ok(self.exporter.clone())
        }

        fn create_grpc_exporter(
            &self,
            endpoint: &str,
        ) -> anyhow::Result<Arc<dyn LogRecordExporter>> {
            self.grpc_calls.fetch_add(1, Ordering::SeqCst);
            self.endpoints.lock().push(endpoint.to_string());
            Ok(self.exporter.clone())
        }
    }

    fn config(grpc: bool, http: bool) -> SelfDisclosureExportConfig {
        SelfDisclosureExportConfig {
            grpc_export_enabled: grpc,
            grpc_host: "telemetry:4317".to_string(),
            http_export_enabled: http,
            http_host: "https://telemetry:4318/v1/logs".to_string(),
            interval_seconds: 30,
        }
    }

    fn service(
        config: SelfDisclosureExportConfig,
    ) -> (SelfDisclosureExportService, Arc<FakeFactory>) {
        let factory = Arc::new(FakeFactory::default());
        let self_disclosure = SelfDisclosureService::new(BTreeMap::from([(
            "tenant".to_string(),
            "zeta".to_string(),
        )]));
        let service =
            SelfDisclosureExportService::with_factory(self_disclosure, config, factory.clone());
        (service, factory)
    }

    #[tokio::test]
    async fn test_disabled_export_is_skipped() {
        let (service, factory) = service(config(false, false));
        service.export_self_disclosure().await.unwrap();
        assert_eq!(factory.http_calls.load(Ordering::SeqCst), 0);
        assert_eq!(factory.grpc_calls.load(Ordering::SeqCst), 0);
        assert!(factory.exporter.exported.lock().is_empty());
    }

    #[tokio::test]
    async fn test_grpc_preferred_when_both_enabled() {
        let (service, factory) = service(config(true, true));
        service.export_self_disclosure().await.unwrap();
        assert_eq!(factory.grpc_calls.load(Ordering::SeqCst), 1);
        assert_eq!(factory.http_calls.load(Ordering::SeqCst), 0);
        assert_eq!(factory.endpoints.lock()[0], "http://telemetry:4317");
    }

    #[tokio::test]
    async fn test_http_endpoint_with_scheme_is_kept() {
        let (service, factory) = service(config(false, true));
        service.export_self_disclosure().await.unwrap();
        assert_eq!(factory.http_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            factory.endpoints.lock()[0],
            "https://telemetry:4318/v1/logs"
        );
    }

    #[tokio::test]
    async fn test_exporter_is_created_once() {
        let (service, factory) = service(config(true, false));
        for _ in 0..3 {
            service.run().await.unwrap();
        }
        assert_eq!(factory.grpc_calls.load(Ordering::SeqCst), 1);

        let exported = factory.exporter.exported.lock();
        assert_eq!(exported.len(), 3);
        assert!(exported.iter().all(|r| r.body == "Selbstauskunft"));
        assert_eq!(exported[0].attributes["tenant"], "zeta");
    }

    #[tokio::test]
    async fn test_closed_service_stops_exporting() {
        let (service, factory) = service(config(true, false));
        service.run().await.unwrap();
        service.on_shutdown().await;
        assert!(!service.is_enabled());

        service.run().await.unwrap();
        assert_eq!(factory.grpc_calls.load(Ordering::SeqCst), 1);
        assert_eq!(factory.exporter.exported.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_blank_host_fails() {
        let mut cfg = config(true, false);
        cfg.grpc_host = "  ".to_string();
        let (service, _) = service(cfg);
        let err = service.export_self_disclosure().await.unwrap_err();
        assert!(err.to_string().contains("OTLP gRPC host must not be empty"));
    }

    #[test]
    fn test_normalize_endpoint() {
        assert_eq!(
            normalize_endpoint("collector:4318", "HTTP").unwrap(),
            "http://collector:4318"
        );
        assert_eq!(
            normalize_endpoint("https://collector", "HTTP").unwrap(),
            "https://collector"
        );
        assert!(normalize_endpoint("", "HTTP").is_err());
    }

    #[test]
    fn test_export_interval() {
        let (service, _) = service(config(false, false));
        assert_eq!(service.export_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_export_request_layout() {
        let record = SelfDisclosureRecord {
            body: "Selbstauskunft".to_string(),
            timestamp: chrono::Utc::now(),
            attributes: BTreeMap::from([("pod_name".to_string(), "pod-1".to_string())]),
        };
        let request = to_export_request(&[record]);
        let scope_logs = &request.resource_logs[0].scope_logs[0];
        let log = &scope_logs.log_records[0];

        assert_eq!(
            log.body,
            Some(AnyValue {
                value: Some(any_value::Value::StringValue("Selbstauskunft".to_string()))
            })
        );
        assert_eq!(log.attributes[0].key, "pod_name");
        assert!(log.time_unix_nano > 0);
    }

    #[tokio::test]
    async fn test_http_exporter_posts_protobuf() {
        use wiremock::matchers::{header, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/logs"))
            .and(header("content-type", "application/x-protobuf"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let exporter = HttpLogRecordExporter::new(&server.uri()).unwrap();
        assert!(exporter.endpoint().ends_with("/v1/logs"));

        let record = SelfDisclosureService::default().generate_self_disclosure_record();
        exporter.export(vec![record]).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let decoded = ExportLogsServiceRequest::decode(requests[0].body.as_slice()).unwrap();
        assert_eq!(
            decoded.resource_logs[0].scope_logs[0].log_records.len(),
            1
        );
    }

    #[tokio::test]
    async fn test_http_exporter_reports_collector_errors() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let exporter = HttpLogRecordExporter::new(&server.uri()).unwrap();
        let err = exporter
            .export(vec![SelfDisclosureService::default().generate_self_disclosure_record()])
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TestfachdienstError>(),
            Some(TestfachdienstError::ExportError(_))
        ));
    }
}
