//! OpenAPI documentation for the Testfachdienst REST API
//!
//! Served as JSON on `/v3/api-docs`, with Swagger UI on `/swagger-ui/` when the
//! `swagger` feature is enabled.

use actix_web::{Responder, get, web};
use testfachdienst_api::{
    DeleteConfirmation, Erezept, ErezeptStatus, HelloZetaResource, JobInfo, WebSocketErrorResponse,
};
use utoipa::OpenApi;

use crate::api::actuator::{AppInfo, HealthStatus, InfoResponse, MemoryInfo};
use crate::model::response::ErrorResult;
use crate::service::scheduler::RecurringJobInfo;

/// Path of the OpenAPI document, relative to the context path
pub const API_DOCS_PATH: &str = "/v3/api-docs";

#[derive(OpenApi)]
#[openapi(
    info(
        title = "ZETA Testfachdienst API",
        description = "Prescription (ERezept) test resource server behind the ZETA guard"
    ),
    tags(
        (name = "erezept", description = "Prescription management"),
        (name = "hello", description = "Greeting"),
        (name = "jobs", description = "Recurring jobs"),
        (name = "actuator", description = "Management endpoints (management port)")
    ),
    paths(
        crate::api::erezept::list,
        crate::api::erezept::get_by_id,
        crate::api::erezept::get_by_prescription_id,
        crate::api::erezept::create,
        crate::api::erezept::update,
        crate::api::erezept::delete_by_id,
        crate::api::hello::hello_zeta,
        crate::api::jobs::info,
        crate::api::jobs::list,
        crate::api::actuator::health,
        crate::api::actuator::info,
    ),
    components(schemas(
        Erezept,
        ErezeptStatus,
        ErrorResult,
        HelloZetaResource,
        JobInfo,
        RecurringJobInfo,
        HealthStatus,
        AppInfo,
        MemoryInfo,
        InfoResponse,
        WebSocketErrorResponse,
        DeleteConfirmation,
    ))
)]
pub struct ApiDoc;

/// Generated document with the package version filled in
pub fn api_doc() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.info.version = testfachdienst_common::APP_VERSION.to_string();
    doc
}

#[get("/v3/api-docs")]
pub async fn api_docs() -> impl Responder {
    web::Json(api_doc())
}

/// Configure Swagger UI for the actix-web app
#[cfg(feature = "swagger")]
pub fn configure_swagger(cfg: &mut web::ServiceConfig, context_path: &str) {
    use utoipa_swagger_ui::{Config, SwaggerUi};

    cfg.service(
        SwaggerUi::new("/swagger-ui/{_:.*}")
            .config(Config::from(format!("{}{}", context_path, API_DOCS_PATH))),
    );
}

/// Configure Swagger UI for the actix-web app (no-op when swagger feature is disabled)
#[cfg(not(feature = "swagger"))]
pub fn configure_swagger(_cfg: &mut web::ServiceConfig, _context_path: &str) {}
