//! Request spans, request ids and HTTP metrics
//!
//! Every request runs inside an `http_request` span. A W3C `traceparent`
//! sent by the caller becomes the parent of that span, so exported traces
//! continue the caller's trace. The `X-Request-Id` header is echoed back,
//! or generated when the caller did not send one.

use std::future::{Future, Ready, ready};
use std::pin::Pin;
use std::task::{Context, Poll};

use actix_web::{
    Error, HttpMessage, HttpRequest,
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderMap, HeaderName, HeaderValue},
};
use opentelemetry::propagation::{Extractor, TextMapPropagator};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use tracing::{Instrument, Span, debug, info_span};
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::metrics::{self, Timer};

pub const X_REQUEST_ID: &str = "x-request-id";

/// Id of the current request, stored in the request extensions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    /// The caller's id if it is a usable header value, otherwise a new UUID
    fn from_headers(headers: &HeaderMap) -> Self {
        let sent = headers
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty() && v.len() <= 128);
        Self(match sent {
            Some(id) => id.to_string(),
            None => uuid::Uuid::new_v4().to_string(),
        })
    }
}

/// Read access to the request id from handlers
pub trait RequestIdExt {
    fn request_id(&self) -> Option<String>;
}

impl RequestIdExt for HttpRequest {
    fn request_id(&self) -> Option<String> {
        self.extensions().get::<RequestId>().map(|id| id.0.clone())
    }
}

struct HeaderExtractor<'a>(&'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(HeaderName::as_str).collect()
    }
}

/// Remote parent from `traceparent`/`tracestate`, empty when absent or malformed
fn remote_parent(headers: &HeaderMap) -> opentelemetry::Context {
    TraceContextPropagator::new().extract(&HeaderExtractor(headers))
}

/// Which surface served the request, used as span field
fn channel(path: &str) -> &'static str {
    if path.ends_with("/ws") {
        "websocket"
    } else if path.starts_with("/actuator") {
        "management"
    } else {
        "rest"
    }
}

/// Route pattern as metrics label so ids do not explode cardinality
fn metric_path<B>(res: &ServiceResponse<B>) -> String {
    res.request()
        .match_pattern()
        .unwrap_or_else(|| "unmatched".to_string())
}

#[derive(Default)]
pub struct TracingMiddleware;

impl TracingMiddleware {
    pub fn new() -> Self {
        Self
    }
}

impl<S, B> Transform<S, ServiceRequest> for TracingMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = TracingMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(TracingMiddlewareService { service }))
    }
}

pub struct TracingMiddlewareService<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for TracingMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let request_id = RequestId::from_headers(req.headers());
        let method = req.method().to_string();
        let path = req.path().to_string();

        let span = info_span!(
            "http_request",
            otel.name = %format!("{} {}", method, path),
            request_id = %request_id.0,
            channel = channel(&path),
            http.method = %method,
            http.target = %path,
            http.user_agent = req
                .headers()
                .get("user-agent")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-"),
            net.peer.ip = req.connection_info().realip_remote_addr().unwrap_or("-"),
            http.status_code = tracing::field::Empty,
        );
        // the result only reports a span without an OpenTelemetry layer
        let _ = span.set_parent(remote_parent(req.headers()));

        let header_value = HeaderValue::from_str(&request_id.0).ok();
        req.extensions_mut().insert(request_id);

        let timer = Timer::new();
        let fut = self.service.call(req);

        Box::pin(
            async move {
                let mut res = fut.await?;

                let status = res.status().as_u16();
                Span::current().record("http.status_code", status);
                if let Some(value) = header_value {
                    res.headers_mut()
                        .insert(HeaderName::from_static(X_REQUEST_ID), value);
                }
                metrics::record_http_request(
                    &method,
                    &metric_path(&res),
                    status,
                    timer.elapsed_secs(),
                );
                debug!(status, elapsed = timer.elapsed_secs(), "Request completed");

                Ok(res)
            }
            .instrument(span),
        )
    }
}
