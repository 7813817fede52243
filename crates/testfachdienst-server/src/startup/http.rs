//! HTTP server setup for the main and management servers.

use std::sync::Arc;

use actix_web::{App, HttpServer, dev::Server, web};
use tracing::{info, warn};

use crate::api;
use crate::middleware::{TracingMiddleware, security_headers};
use crate::model::app_state::AppState;
use crate::model::tls::validate_tls_config;

/// Creates and binds the main HTTP server.
///
/// Serves the prescription API, greeting, jobs, API documentation and the
/// STOMP WebSocket endpoint below the configured context path. Binds with
/// rustls when TLS is enabled.
pub fn main_server(app_state: Arc<AppState>) -> anyhow::Result<Server> {
    let configuration = &app_state.configuration;
    let address = configuration.server_address();
    let port = configuration.server_port();
    let context_path = app_state.context_path.clone();
    let tls = configuration.tls_config();
    let workers = configuration.workers();
    let shutdown_timeout = configuration.shutdown_timeout();

    let state = app_state.clone();
    let mut server = HttpServer::new(move || {
        let context_path = context_path.clone();
        App::new()
            .wrap(security_headers())
            .wrap(TracingMiddleware::new())
            .app_data(web::Data::from(state.clone()))
            .service(
                web::scope(&context_path.clone())
                    .configure(move |cfg| api::configure_main(cfg, &context_path)),
            )
    })
    .disable_signals()
    .shutdown_timeout(shutdown_timeout.as_secs());

    if let Some(workers) = workers {
        server = server.workers(workers);
    }

    let server = if tls.enabled {
        let validation = validate_tls_config(&tls);
        for warning in &validation.warnings {
            warn!("{}", warning);
        }
        if !validation.valid {
            anyhow::bail!("Invalid TLS configuration: {}", validation.errors.join("; "));
        }
        info!(
            address = %address,
            port,
            mtls = tls.is_mtls_configured(),
            "Starting main HTTPS server"
        );
        server.bind_rustls_0_23((address, port), tls.create_server_config()?)?
    } else {
        info!(address = %address, port, "Starting main HTTP server");
        server.bind((address, port))?
    };

    Ok(server.run())
}

/// Creates and binds the management server (actuator endpoints and metrics).
pub fn management_server(app_state: Arc<AppState>) -> anyhow::Result<Server> {
    let address = app_state.configuration.management_address();
    let port = app_state.configuration.management_port();
    let shutdown_timeout = app_state.configuration.shutdown_timeout();
    info!(address = %address, port, "Starting management server");

    let state = app_state.clone();
    Ok(HttpServer::new(move || {
        App::new()
            .wrap(TracingMiddleware::new())
            .app_data(web::Data::from(state.clone()))
            .configure(api::configure_management)
    })
    .disable_signals()
    .shutdown_timeout(shutdown_timeout.as_secs())
    .workers(1)
    .bind((address, port))?
    .run())
}
