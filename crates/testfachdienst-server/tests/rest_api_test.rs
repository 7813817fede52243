// Integration tests for the prescription REST API
// Runs the full main application against an in-memory database

mod common;

use actix_web::http::StatusCode;
use actix_web::test;
use serde_json::{Value, json};

use common::{app_state, erezept_json};

#[actix_web::test]
async fn test_hello_zeta_with_security_headers() {
    let app = main_app!(app_state("").await);

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/hellozeta").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get("X-Frame-Options").unwrap(), "SAMEORIGIN");
    assert_eq!(resp.headers().get("X-Content-Type-Options").unwrap(), "nosniff");
    assert_eq!(resp.headers().get("Pragma").unwrap(), "no-cache");

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({"message": "Hello ZETA!"}));
}

#[actix_web::test]
async fn test_create_read_and_list() {
    let app = main_app!(app_state("").await);

    let req = test::TestRequest::post()
        .uri("/api/erezept")
        .set_json(erezept_json("RX-2025-000123"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let location = resp
        .headers()
        .get("Location")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let created: Value = test::read_body_json(resp).await;
    let id = created["id"].as_i64().unwrap();
    assert_eq!(location, format!("/api/erezept/{}", id));
    assert_eq!(created["status"], "CREATED");

    let found: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri(&location).to_request(),
    )
    .await;
    assert_eq!(found["prescriptionId"], "RX-2025-000123");

    let by_prescription: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get()
            .uri("/api/erezept/by-prescription/RX-2025-000123")
            .to_request(),
    )
    .await;
    assert_eq!(by_prescription["id"], id);

    let all: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/api/erezept").to_request(),
    )
    .await;
    assert_eq!(all.as_array().unwrap().len(), 1);
}

#[actix_web::test]
async fn test_create_ignores_supplied_id() {
    let app = main_app!(app_state("").await);
    let mut body = erezept_json("RX-ID");
    body["id"] = json!(999);

    let created: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/api/erezept")
            .set_json(body)
            .to_request(),
    )
    .await;
    assert_ne!(created["id"], 999);
}

#[actix_web::test]
async fn test_missing_returns_empty_404() {
    let app = main_app!(app_state("").await);

    for uri in ["/api/erezept/42", "/api/erezept/by-prescription/RX-NONE"] {
        let resp = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert!(test::read_body(resp).await.is_empty());
    }
}

#[actix_web::test]
async fn test_duplicate_prescription_id_conflicts() {
    let app = main_app!(app_state("").await);
    let create = || {
        test::TestRequest::post()
            .uri("/api/erezept")
            .set_json(erezept_json("RX-DUP"))
            .to_request()
    };

    assert_eq!(test::call_service(&app, create()).await.status(), StatusCode::CREATED);
    let resp = test::call_service(&app, create()).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(test::read_body(resp).await, "PrescriptionId already exists");
}

#[actix_web::test]
async fn test_validation_errors() {
    let app = main_app!(app_state("").await);
    let mut body = erezept_json("RX-BAD");
    body["medicationName"] = json!("  ");
    body["issuedAt"] = Value::Null;

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/erezept")
            .set_json(body)
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let error: Value = test::read_body_json(resp).await;
    assert_eq!(error["status"], 400);
    assert_eq!(error["error"], "Bad Request");
    assert_eq!(error["message"], "Validation failed");
    assert_eq!(error["path"], "/api/erezept");
    assert_eq!(error["errors"]["medicationName"], "must not be blank");
    assert_eq!(error["errors"]["issuedAt"], "must not be null");
    assert!(error["timestamp"].is_string());
}

#[actix_web::test]
async fn test_malformed_json_is_bad_request() {
    let app = main_app!(app_state("").await);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/erezept")
            .insert_header(("content-type", "application/json"))
            .set_payload("{\"medicationName\": ")
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let error: Value = test::read_body_json(resp).await;
    assert_eq!(error["status"], 400);
    assert!(error.get("errors").is_none());
}

#[actix_web::test]
async fn test_update_keeps_status_when_unset() {
    let app = main_app!(app_state("").await);
    let mut body = erezept_json("RX-UPD");
    body["status"] = json!("SIGNED");
    let created: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/api/erezept")
            .set_json(body)
            .to_request(),
    )
    .await;
    let id = created["id"].as_i64().unwrap();

    let mut change = erezept_json("RX-IGNORED");
    change["dosage"] = json!("0-0-1");
    change["status"] = Value::Null;
    let resp = test::call_service(
        &app,
        test::TestRequest::put()
            .uri(&format!("/api/erezept/{}", id))
            .set_json(change)
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let updated: Value = test::read_body_json(resp).await;
    assert_eq!(updated["dosage"], "0-0-1");
    assert_eq!(updated["status"], "SIGNED");
    assert_eq!(updated["prescriptionId"], "RX-UPD");

    let resp = test::call_service(
        &app,
        test::TestRequest::put()
            .uri("/api/erezept/4711")
            .set_json(erezept_json("RX-X"))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_update_without_issued_at() {
    let app = main_app!(app_state("").await);
    let created: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/api/erezept")
            .set_json(erezept_json("RX-NO-ISSUED"))
            .to_request(),
    )
    .await;

    let mut change = erezept_json("RX-NO-ISSUED");
    change.as_object_mut().unwrap().remove("issuedAt");
    change["dosage"] = json!("1-1-1");
    let resp = test::call_service(
        &app,
        test::TestRequest::put()
            .uri(&format!("/api/erezept/{}", created["id"]))
            .set_json(change)
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let updated: Value = test::read_body_json(resp).await;
    assert_eq!(updated["dosage"], "1-1-1");
    assert_eq!(updated["issuedAt"], created["issuedAt"]);
}

#[actix_web::test]
async fn test_non_numeric_id_is_bad_request() {
    let app = main_app!(app_state("").await);

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/api/erezept/abc").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let error: Value = test::read_body_json(resp).await;
    assert_eq!(error["status"], 400);
    assert_eq!(error["error"], "Bad Request");
    assert_eq!(error["path"], "/api/erezept/abc");

    let resp = test::call_service(
        &app,
        test::TestRequest::put()
            .uri("/api/erezept/12x")
            .set_json(erezept_json("RX-PATH"))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = test::call_service(
        &app,
        test::TestRequest::delete().uri("/api/erezept/x").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_delete() {
    let app = main_app!(app_state("").await);
    let created: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/api/erezept")
            .set_json(erezept_json("RX-DEL"))
            .to_request(),
    )
    .await;
    let uri = format!("/api/erezept/{}", created["id"]);

    let resp = test::call_service(&app, test::TestRequest::delete().uri(&uri).to_request()).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    let resp = test::call_service(&app, test::TestRequest::delete().uri(&uri).to_request()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_context_path() {
    let app = main_app!(app_state("/testfachdienst").await);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/testfachdienst/api/erezept")
            .set_json(erezept_json("RX-CTX"))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let location = resp.headers().get("Location").unwrap().to_str().unwrap();
    assert!(location.starts_with("/testfachdienst/api/erezept/"));

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/hellozeta").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_jobs_endpoints() {
    let app = main_app!(app_state("").await);

    let info: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/jobs/info").to_request(),
    )
    .await;
    assert_eq!(info, json!({"status": "fantastic!"}));

    let jobs: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/jobs").to_request(),
    )
    .await;
    assert_eq!(jobs, json!([]));
}

#[actix_web::test]
async fn test_api_documentation() {
    let app = main_app!(app_state("").await);

    let openapi: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/v3/api-docs").to_request(),
    )
    .await;
    assert!(openapi["paths"]["/api/erezept"].is_object());

    let asyncapi: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/springwolf/docs").to_request(),
    )
    .await;
    assert_eq!(
        asyncapi["channels"]["erezept.topic"]["address"],
        "/topic/erezept"
    );
}
