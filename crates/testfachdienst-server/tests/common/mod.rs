// Shared fixtures for the server integration tests
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, Utc};
use config::Config;
use sea_orm::{ConnectOptions, Database};
use serde_json::{Value, json};
use testfachdienst_persistence::{ErezeptPersistence, SqlPersistService, ensure_schema};
use testfachdienst_server::model::app_state::AppState;
use testfachdienst_server::model::config::Configuration;
use testfachdienst_server::service::scheduler::JobScheduler;
use testfachdienst_server::startup::{MemoryBudget, MemoryLimitSource};

pub async fn persistence() -> Arc<dyn ErezeptPersistence> {
    let mut opt = ConnectOptions::new("sqlite::memory:");
    opt.max_connections(1).sqlx_logging(false);
    let db = Database::connect(opt).await.unwrap();
    ensure_schema(&db).await.unwrap();
    Arc::new(SqlPersistService::new(db))
}

/// Application state over a fresh in-memory database
pub async fn app_state(context_path: &str) -> Arc<AppState> {
    let config = Config::builder()
        .set_override("server.context_path", context_path)
        .unwrap()
        .build()
        .unwrap();

    Arc::new(AppState::new(
        Configuration::from_config(config),
        persistence().await,
        Arc::new(JobScheduler::new()),
        None,
        MemoryBudget::new(1024 * 1024 * 1024, 75.0, MemoryLimitSource::Host),
    ))
}

/// A valid prescription request body
pub fn erezept_json(prescription_id: &str) -> Value {
    json!({
        "medicationName": "Ibuprofen 400 mg",
        "dosage": "1 tablet, 3x daily after meals",
        "issuedAt": (Utc::now() - Duration::hours(1)).to_rfc3339(),
        "expiresAt": (Utc::now() + Duration::days(30)).to_rfc3339(),
        "patientId": "PAT-123456",
        "practitionerId": "PRAC-98765",
        "prescriptionId": prescription_id,
    })
}

/// Build the main application the way the main server does
#[macro_export]
macro_rules! main_app {
    ($state:expr) => {{
        let state: std::sync::Arc<testfachdienst_server::AppState> = $state;
        let context_path = state.context_path.clone();
        actix_web::test::init_service(
            actix_web::App::new()
                .wrap(testfachdienst_server::middleware::security_headers())
                .wrap(testfachdienst_server::middleware::TracingMiddleware::new())
                .app_data(actix_web::web::Data::from(state))
                .service(actix_web::web::scope(&context_path.clone()).configure(move |cfg| {
                    testfachdienst_server::api::configure_main(cfg, &context_path)
                })),
        )
        .await
    }};
}

/// Build the management application
#[macro_export]
macro_rules! management_app {
    ($state:expr) => {{
        let state: std::sync::Arc<testfachdienst_server::AppState> = $state;
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data(actix_web::web::Data::from(state))
                .configure(testfachdienst_server::api::configure_management),
        )
        .await
    }};
}
