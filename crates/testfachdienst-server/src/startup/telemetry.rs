//! Request trace export over OTLP/gRPC
//!
//! Spans recorded through `tracing` leave the process when `otel.enabled` is
//! set. The trace resource is tagged with the same attributes as the
//! self-disclosure records, so a collector can join both streams by service
//! instance. Sampling follows the caller's `traceparent` flag and falls back
//! to `otel.sampling_ratio` for requests that start a new trace.

use std::collections::BTreeMap;
use std::time::Duration;

use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource,
    trace::{RandomIdGenerator, Sampler, SdkTracerProvider},
};

use crate::service::self_disclosure::POD_NAME_ATTRIBUTE;

/// Resource attribute naming the pod, the same key OTel semantic conventions use
const K8S_POD_NAME: &str = "k8s.pod.name";

#[derive(Debug, Clone, PartialEq)]
pub struct OtelConfig {
    pub enabled: bool,
    pub otlp_endpoint: String,
    pub service_name: String,
    pub service_version: String,
    /// Share of new root traces kept, clamped to `0.0..=1.0`
    pub sampling_ratio: f64,
    pub export_timeout: Duration,
    /// `self_disclosure.resource_attributes`
    pub resource_attributes: BTreeMap<String, String>,
    /// Pod name from `HOSTNAME`, set once at startup
    pub pod_name: Option<String>,
}

impl OtelConfig {
    /// Sampler for spans without a sampled parent
    fn root_sampler(&self) -> Sampler {
        match self.sampling_ratio {
            r if r >= 1.0 => Sampler::AlwaysOn,
            r if r <= 0.0 => Sampler::AlwaysOff,
            r => Sampler::TraceIdRatioBased(r),
        }
    }

    /// Keep the decision of an incoming `traceparent`, sample new traces by ratio
    pub fn sampler(&self) -> Sampler {
        Sampler::ParentBased(Box::new(self.root_sampler()))
    }

    /// Resource attributes in export order
    ///
    /// Configured attributes cannot override the service identity.
    pub fn resource_key_values(&self) -> Vec<KeyValue> {
        let mut attributes: Vec<KeyValue> = self
            .resource_attributes
            .iter()
            .filter(|(k, _)| !matches!(k.as_str(), "service.name" | "service.version"))
            .map(|(k, v)| KeyValue::new(k.clone(), v.clone()))
            .collect();
        if let Some(pod) = self.pod_name.as_ref().filter(|p| !p.trim().is_empty()) {
            attributes.push(KeyValue::new(K8S_POD_NAME, pod.clone()));
            attributes.push(KeyValue::new(POD_NAME_ATTRIBUTE, pod.clone()));
        }
        attributes.push(KeyValue::new("service.name", self.service_name.clone()));
        attributes.push(KeyValue::new(
            "service.version",
            self.service_version.clone(),
        ));
        attributes
    }

    pub fn resource(&self) -> Resource {
        Resource::builder_empty()
            .with_attributes(self.resource_key_values())
            .build()
    }
}

/// Build the span exporter pipeline; the logging layer owns the returned provider
pub(crate) fn init_tracer_provider(config: &OtelConfig) -> anyhow::Result<SdkTracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&config.otlp_endpoint)
        .with_timeout(config.export_timeout)
        .build()?;

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_sampler(config.sampler())
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(config.resource())
        .build())
}
