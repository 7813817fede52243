// API module organization
// REST resources, management endpoints and API documentation

pub mod actuator;
pub mod asyncapi;
pub mod erezept;
pub mod hello;
pub mod jobs;
pub mod openapi;

use actix_web::web;

/// Register every endpoint of the main server below the context path
pub fn configure_main(cfg: &mut web::ServiceConfig, context_path: &str) {
    cfg.service(erezept::routes())
        .service(hello::hello_zeta)
        .service(jobs::routes())
        .service(openapi::api_docs)
        .service(asyncapi::springwolf_docs)
        .service(crate::ws::stomp_endpoint);
    openapi::configure_swagger(cfg, context_path);
}

/// Register the management endpoints
pub fn configure_management(cfg: &mut web::ServiceConfig) {
    cfg.service(actuator::routes());
}
