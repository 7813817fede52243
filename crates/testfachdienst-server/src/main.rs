//! Main entry point of the ZETA Testfachdienst.
//!
//! Loads configuration, initializes logging and metrics, connects the
//! database, schedules the self-disclosure export and runs the main and
//! management HTTP servers until a shutdown signal arrives.

use std::sync::Arc;

use testfachdienst_persistence::{ErezeptPersistence, SqlPersistService, ensure_schema};
use testfachdienst_server::{
    metrics,
    model::{app_state::AppState, config::Configuration},
    service::{
        export::SelfDisclosureExportService, scheduler::JobScheduler,
        self_disclosure::SelfDisclosureService,
    },
    startup::{self, BudgetAllocator, MemoryBudget, ServerTask, ServiceLifecycle, ShutdownCause},
};
use tracing::{error, info};

#[global_allocator]
static ALLOCATOR: BudgetAllocator = cap::Cap::new(std::alloc::System, usize::MAX);

/// Id of the recurring OTLP self-disclosure export
const SELF_DISCLOSURE_JOB_ID: &str = "self-disclosure-export";

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let configuration = Configuration::new()?;

    let otel_config = configuration.otel_config();
    let logging_guard = startup::init_logging(&configuration.logging_config(), &otel_config)?;
    if logging_guard.exports_spans() {
        info!(endpoint = %otel_config.otlp_endpoint, "Span export enabled");
    }

    let metrics_handle = match metrics::install_prometheus_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            error!("Failed to install Prometheus recorder: {}", e);
            None
        }
    };

    let memory_budget = MemoryBudget::detect(configuration.max_ram_percentage());
    memory_budget.log_summary();
    memory_budget.enforce(&ALLOCATOR)?;

    let db = configuration.database_connection().await?;
    ensure_schema(&db).await?;
    let persistence: Arc<dyn ErezeptPersistence> = Arc::new(SqlPersistService::new(db));

    let scheduler = Arc::new(JobScheduler::new());
    let app_state = Arc::new(AppState::new(
        configuration.clone(),
        persistence,
        scheduler.clone(),
        metrics_handle,
        memory_budget,
    ));

    let export_service = SelfDisclosureExportService::new(
        SelfDisclosureService::new(configuration.self_disclosure_resource_attributes()),
        configuration.self_disclosure_export_config(),
    );
    scheduler.create_recurrently(
        SELF_DISCLOSURE_JOB_ID,
        export_service.export_interval(),
        Arc::new(export_service),
    )?;

    let main = ServerTask::spawn("main", startup::main_server(app_state.clone())?);
    let management = if configuration.management_enabled() {
        Some(ServerTask::spawn(
            "management",
            startup::management_server(app_state.clone())?,
        ))
    } else {
        None
    };

    info!(
        version = %configuration.version(),
        context_path = %app_state.context_path,
        "Testfachdienst started"
    );

    let lifecycle = ServiceLifecycle::new(
        main,
        management,
        scheduler,
        configuration.shutdown_timeout(),
    );
    let cause = lifecycle.run_until(startup::shutdown_requested()).await;

    if cause == ShutdownCause::MainServerExited {
        error!("Main server exited unexpectedly");
    }
    info!("Shutdown complete");
    logging_guard.shutdown();
    Ok(())
}
