// Integration tests for the management (actuator) endpoints

mod common;

use actix_web::http::StatusCode;
use actix_web::test;
use serde_json::{Value, json};

use common::app_state;

#[actix_web::test]
async fn test_health_is_up() {
    let app = management_app!(app_state("").await);

    for uri in [
        "/actuator/health",
        "/actuator/health/liveness",
        "/actuator/health/readiness",
    ] {
        let resp = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK, "{}", uri);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({"status": "UP"}));
    }
}

#[actix_web::test]
async fn test_info_reports_memory_budget() {
    let app = management_app!(app_state("").await);

    let info: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/actuator/info").to_request(),
    )
    .await;
    assert_eq!(info["app"]["name"], "testfachdienst");
    assert_eq!(info["memory"]["limitBytes"], 1024 * 1024 * 1024);
    assert_eq!(info["memory"]["budgetBytes"], 805_306_368);
    assert_eq!(info["memory"]["source"], "host");
}

#[actix_web::test]
async fn test_prometheus_without_recorder() {
    let app = management_app!(app_state("").await);

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/actuator/prometheus").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
