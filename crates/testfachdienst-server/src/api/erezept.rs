//! Prescription REST resource under `/api/erezept`

use actix_web::{
    HttpRequest, HttpResponse, Responder, Scope, delete, get, http::header, post, put, web,
};
use testfachdienst_api::{Erezept, field_errors};
use testfachdienst_common::{EREZEPT_API_PATH, TestfachdienstError, with_context_path};
use tracing::{debug, info, warn};
use validator::{Validate, ValidationErrors};

use crate::error::{ApiError, ApiResultExt};
use crate::metrics::record_erezept_operation;
use crate::model::app_state::AppState;
use crate::model::response::ErrorResult;

/// Body returned when a prescription identifier is already taken
pub const DUPLICATE_PRESCRIPTION_ID: &str = "PrescriptionId already exists";

/// Reject malformed JSON with the regular error body
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, req| {
        ApiError::new(TestfachdienstError::InvalidPayload(err.to_string()), req.path()).into()
    })
}

/// Reject path segments that do not parse as an id with a 400 error body
pub fn path_config() -> web::PathConfig {
    web::PathConfig::default().error_handler(|err, req| {
        ApiError::new(TestfachdienstError::InvalidPayload(err.to_string()), req.path()).into()
    })
}

fn validated(
    body: Erezept,
    req: &HttpRequest,
    check: fn(&Erezept) -> Result<(), ValidationErrors>,
) -> Result<Erezept, ApiError> {
    check(&body)
        .map_err(|e| TestfachdienstError::Validation(field_errors(&e)))
        .or_api_error(req)?;
    Ok(body)
}

/// List all prescriptions
#[utoipa::path(
    get,
    path = "/api/erezept",
    tag = "erezept",
    responses(
        (status = 200, description = "All prescriptions", body = Vec<Erezept>)
    )
)]
#[get("")]
pub async fn list(req: HttpRequest, data: web::Data<AppState>) -> Result<impl Responder, ApiError> {
    debug!("List all E-Rezepte");
    let all = data.erezept_service.find_all().await.or_api_error(&req)?;
    record_erezept_operation("rest", "list", "success");
    Ok(web::Json(all))
}

/// Get a prescription by id
#[utoipa::path(
    get,
    path = "/api/erezept/{id}",
    tag = "erezept",
    params(("id" = i64, Path, description = "Prescription id")),
    responses(
        (status = 200, description = "Prescription found", body = Erezept),
        (status = 404, description = "Prescription not found")
    )
)]
#[get("/{id}")]
pub async fn get_by_id(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    match data.erezept_service.find_by_id(id).await.or_api_error(&req)? {
        Some(found) => {
            record_erezept_operation("rest", "read", "success");
            Ok(HttpResponse::Ok().json(found))
        }
        None => {
            info!("E-Rezept not found: id={}", id);
            record_erezept_operation("rest", "read", "404");
            Ok(HttpResponse::NotFound().finish())
        }
    }
}

/// Get a prescription by its prescription identifier
#[utoipa::path(
    get,
    path = "/api/erezept/by-prescription/{prescriptionId}",
    tag = "erezept",
    params(("prescriptionId" = String, Path, description = "Prescription identifier")),
    responses(
        (status = 200, description = "Prescription found", body = Erezept),
        (status = 404, description = "Prescription not found")
    )
)]
#[get("/by-prescription/{prescription_id}")]
pub async fn get_by_prescription_id(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let prescription_id = path.into_inner();
    let found = data
        .erezept_service
        .find_by_prescription_id(&prescription_id)
        .await
        .or_api_error(&req)?;

    Ok(match found {
        Some(found) => HttpResponse::Ok().json(found),
        None => {
            info!("E-Rezept not found: prescriptionId={}", prescription_id);
            HttpResponse::NotFound().finish()
        }
    })
}

/// Create a prescription
#[utoipa::path(
    post,
    path = "/api/erezept",
    tag = "erezept",
    request_body = Erezept,
    responses(
        (status = 201, description = "Prescription created", body = Erezept,
            headers(("Location" = String, description = "URI of the new prescription"))),
        (status = 400, description = "Validation failed", body = ErrorResult),
        (status = 409, description = "PrescriptionId already exists", body = String)
    )
)]
#[post("")]
pub async fn create(
    req: HttpRequest,
    data: web::Data<AppState>,
    body: web::Json<Erezept>,
) -> Result<HttpResponse, ApiError> {
    let request = validated(body.into_inner(), &req, Erezept::validate_for_create)?;
    info!("Create E-Rezept prescriptionId={}", request.prescription_id);

    let prescription_id = request.prescription_id.clone();
    let Some(created) = data.erezept_service.create(request).await.or_api_error(&req)? else {
        warn!("Duplicate prescriptionId={}", prescription_id);
        record_erezept_operation("rest", "create", "409");
        return Ok(HttpResponse::Conflict()
            .content_type("text/plain; charset=utf-8")
            .body(DUPLICATE_PRESCRIPTION_ID));
    };

    record_erezept_operation("rest", "create", "success");
    let location = with_context_path(
        &data.context_path,
        &format!("{}/{}", EREZEPT_API_PATH, created.id.unwrap_or_default()),
    );
    Ok(HttpResponse::Created()
        .insert_header((header::LOCATION, location))
        .json(created))
}

/// Update medication, dosage, expiry and status of a prescription
#[utoipa::path(
    put,
    path = "/api/erezept/{id}",
    tag = "erezept",
    params(("id" = i64, Path, description = "Prescription id")),
    request_body = Erezept,
    responses(
        (status = 200, description = "Prescription updated", body = Erezept),
        (status = 400, description = "Validation failed", body = ErrorResult),
        (status = 404, description = "Prescription not found")
    )
)]
#[put("/{id}")]
pub async fn update(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<i64>,
    body: web::Json<Erezept>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let request = validated(body.into_inner(), &req, Erezept::validate)?;

    match data.erezept_service.update(id, request).await.or_api_error(&req)? {
        Some(updated) => {
            record_erezept_operation("rest", "update", "success");
            Ok(HttpResponse::Ok().json(updated))
        }
        None => {
            warn!("Update failed; E-Rezept not found id={}", id);
            record_erezept_operation("rest", "update", "404");
            Ok(HttpResponse::NotFound().finish())
        }
    }
}

/// Delete a prescription
#[utoipa::path(
    delete,
    path = "/api/erezept/{id}",
    tag = "erezept",
    params(("id" = i64, Path, description = "Prescription id")),
    responses(
        (status = 204, description = "Prescription deleted"),
        (status = 404, description = "Prescription not found")
    )
)]
#[delete("/{id}")]
pub async fn delete_by_id(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    if data
        .erezept_service
        .delete_if_exists(id)
        .await
        .or_api_error(&req)?
    {
        record_erezept_operation("rest", "delete", "success");
        Ok(HttpResponse::NoContent().finish())
    } else {
        warn!("Delete failed; E-Rezept not found id={}", id);
        record_erezept_operation("rest", "delete", "404");
        Ok(HttpResponse::NotFound().finish())
    }
}

pub fn routes() -> Scope {
    web::scope(EREZEPT_API_PATH)
        .app_data(json_config())
        .app_data(path_config())
        .service(list)
        .service(create)
        .service(get_by_prescription_id)
        .service(get_by_id)
        .service(update)
        .service(delete_by_id)
}
