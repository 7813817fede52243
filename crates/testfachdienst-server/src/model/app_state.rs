//! Application state management
//!
//! This module defines the central application state shared across all handlers.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use testfachdienst_persistence::ErezeptPersistence;

use crate::model::config::Configuration;
use crate::service::erezept::ErezeptService;
use crate::service::hello::HelloZetaService;
use crate::service::scheduler::JobScheduler;
use crate::startup::MemoryBudget;
use crate::ws::{ErezeptWsController, StompBroker, StompDestinations};

/// Application state shared across all handlers
pub struct AppState {
    pub configuration: Configuration,
    /// Normalized context path, empty when mounted at `/`
    pub context_path: String,
    pub erezept_service: ErezeptService,
    pub hello_zeta_service: HelloZetaService,
    pub broker: Arc<StompBroker>,
    pub destinations: StompDestinations,
    pub ws_controller: ErezeptWsController,
    pub scheduler: Arc<JobScheduler>,
    /// Renders the Prometheus exposition; absent when no recorder is installed
    pub metrics_handle: Option<PrometheusHandle>,
    pub memory_budget: MemoryBudget,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("configuration", &self.configuration)
            .field("context_path", &self.context_path)
            .field("erezept_service", &"<ErezeptService>")
            .field("broker_sessions", &self.broker.session_count())
            .field("destinations", &self.destinations)
            .field("scheduler_jobs", &self.scheduler.jobs().len())
            .field("metrics_handle", &self.metrics_handle.is_some())
            .field("memory_budget", &self.memory_budget)
            .finish()
    }
}

impl AppState {
    /// Wire services, broker and STOMP controller on top of a persistence backend
    pub fn new(
        configuration: Configuration,
        persistence: Arc<dyn ErezeptPersistence>,
        scheduler: Arc<JobScheduler>,
        metrics_handle: Option<PrometheusHandle>,
        memory_budget: MemoryBudget,
    ) -> Self {
        let context_path = configuration.server_context_path();
        let erezept_service = ErezeptService::new(persistence);
        let broker = Arc::new(StompBroker::with_queue_capacity(
            configuration.websocket_outbound_queue_capacity(),
        ));
        let destinations = StompDestinations::new(&context_path);
        let ws_controller = ErezeptWsController::new(
            erezept_service.clone(),
            broker.clone(),
            destinations.clone(),
        );

        Self {
            configuration,
            context_path,
            erezept_service,
            hello_zeta_service: HelloZetaService,
            broker,
            destinations,
            ws_controller,
            scheduler,
            metrics_handle,
            memory_budget,
        }
    }
}
