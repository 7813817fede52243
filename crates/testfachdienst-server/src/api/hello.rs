use actix_web::{Responder, get, web};
use testfachdienst_api::HelloZetaResource;

use crate::model::app_state::AppState;

/// Greeting of the service
#[utoipa::path(
    get,
    path = "/hellozeta",
    tag = "hello",
    responses((status = 200, description = "Greeting", body = HelloZetaResource))
)]
#[get("/hellozeta")]
pub async fn hello_zeta(data: web::Data<AppState>) -> impl Responder {
    web::Json(data.hello_zeta_service.hello_zeta_resource())
}
