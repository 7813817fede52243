//! Management endpoints under `/actuator`

use actix_web::{HttpResponse, Responder, Scope, get, web};
use serde::Serialize;
use testfachdienst_common::APP_NAME;
use tracing::warn;
use utoipa::ToSchema;

use crate::model::app_state::AppState;
use crate::startup::MemoryLimitSource;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthStatus {
    #[schema(example = "UP")]
    pub status: String,
}

impl HealthStatus {
    pub fn up() -> Self {
        Self {
            status: "UP".to_string(),
        }
    }

    pub fn down() -> Self {
        Self {
            status: "DOWN".to_string(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MemoryInfo {
    pub limit_bytes: u64,
    pub max_ram_percentage: f64,
    pub budget_bytes: u64,
    pub source: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InfoResponse {
    pub app: AppInfo,
    pub memory: MemoryInfo,
}

fn source_name(source: MemoryLimitSource) -> &'static str {
    match source {
        MemoryLimitSource::CgroupV2 => "cgroup-v2",
        MemoryLimitSource::CgroupV1 => "cgroup-v1",
        MemoryLimitSource::Host => "host",
    }
}

async fn database_health(data: &AppState) -> HttpResponse {
    match data.erezept_service.health_check().await {
        Ok(()) => HttpResponse::Ok().json(HealthStatus::up()),
        Err(e) => {
            warn!(error = %e, "Database health check failed");
            HttpResponse::ServiceUnavailable().json(HealthStatus::down())
        }
    }
}

/// Overall health, DOWN when the database is unreachable
#[utoipa::path(
    get,
    path = "/actuator/health",
    tag = "actuator",
    responses(
        (status = 200, description = "Service is up", body = HealthStatus),
        (status = 503, description = "Service is down", body = HealthStatus)
    )
)]
#[get("/health")]
pub async fn health(data: web::Data<AppState>) -> impl Responder {
    database_health(&data).await
}

#[get("/health/liveness")]
pub async fn liveness() -> impl Responder {
    web::Json(HealthStatus::up())
}

#[get("/health/readiness")]
pub async fn readiness(data: web::Data<AppState>) -> impl Responder {
    database_health(&data).await
}

/// Application name, version and memory budget
#[utoipa::path(
    get,
    path = "/actuator/info",
    tag = "actuator",
    responses((status = 200, description = "Application info", body = InfoResponse))
)]
#[get("/info")]
pub async fn info(data: web::Data<AppState>) -> impl Responder {
    let budget = &data.memory_budget;
    web::Json(InfoResponse {
        app: AppInfo {
            name: APP_NAME.to_string(),
            version: data.configuration.version(),
        },
        memory: MemoryInfo {
            limit_bytes: budget.limit_bytes,
            max_ram_percentage: budget.max_ram_percentage,
            budget_bytes: budget.budget_bytes(),
            source: source_name(budget.source).to_string(),
        },
    })
}

/// Prometheus text exposition
#[get("/prometheus")]
pub async fn prometheus(data: web::Data<AppState>) -> impl Responder {
    match &data.metrics_handle {
        Some(handle) => HttpResponse::Ok()
            .content_type(PROMETHEUS_CONTENT_TYPE)
            .body(handle.render()),
        None => HttpResponse::NotFound().finish(),
    }
}

pub fn routes() -> Scope {
    web::scope("/actuator")
        .service(health)
        .service(liveness)
        .service(readiness)
        .service(info)
        .service(prometheus)
}
