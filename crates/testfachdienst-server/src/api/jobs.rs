//! Recurring job endpoints under `/jobs`

use actix_web::{Responder, Scope, get, web};
use testfachdienst_api::JobInfo;

use crate::model::app_state::AppState;
use crate::service::scheduler::RecurringJobInfo;

/// Liveness of the job subsystem
#[utoipa::path(
    get,
    path = "/jobs/info",
    tag = "jobs",
    responses((status = 200, description = "Job subsystem status", body = JobInfo))
)]
#[get("/info")]
pub async fn info() -> impl Responder {
    web::Json(JobInfo {
        status: "fantastic!".to_string(),
    })
}

/// Snapshot of every registered recurring job
#[utoipa::path(
    get,
    path = "/jobs",
    tag = "jobs",
    responses((status = 200, description = "Recurring jobs", body = Vec<RecurringJobInfo>))
)]
#[get("")]
pub async fn list(data: web::Data<AppState>) -> impl Responder {
    web::Json(data.scheduler.jobs())
}

pub fn routes() -> Scope {
    web::scope("/jobs").service(info).service(list)
}
