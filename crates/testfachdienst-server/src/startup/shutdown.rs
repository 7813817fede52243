//! Ordered shutdown of the Testfachdienst
//!
//! The service runs until SIGTERM, Ctrl+C or an unexpected exit of the main
//! server. It then stops in this order:
//!
//! 1. main server: no new prescription requests or STOMP sessions
//! 2. job scheduler: a self-disclosure export in flight may finish
//! 3. management server: health stays reachable while draining
//!
//! Every step is bounded by `server.shutdown_timeout_secs`.

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use actix_web::dev::{Server, ServerHandle};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::service::scheduler::JobScheduler;

/// Why the service left its run loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownCause {
    Signal,
    MainServerExited,
}

/// A spawned actix server together with its control handle
pub struct ServerTask {
    name: &'static str,
    handle: ServerHandle,
    task: JoinHandle<io::Result<()>>,
}

impl ServerTask {
    pub fn spawn(name: &'static str, server: Server) -> Self {
        let handle = server.handle();
        Self {
            name,
            handle,
            task: actix_web::rt::spawn(server),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Stop accepting connections and wait up to `timeout` for open requests
    pub async fn stop(self, timeout: Duration) {
        if tokio::time::timeout(timeout, self.handle.stop(true))
            .await
            .is_err()
        {
            warn!(server = self.name, "Graceful stop timed out after {:?}", timeout);
        }
        log_exit(self.name, self.task.await);
    }
}

fn log_exit(name: &str, result: Result<io::Result<()>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(())) => info!(server = name, "Server stopped"),
        Ok(Err(e)) => error!(server = name, "Server terminated with error: {}", e),
        Err(e) => error!(server = name, "Server task failed: {}", e),
    }
}

/// Everything that has to be stopped before the process exits
pub struct ServiceLifecycle {
    main: ServerTask,
    management: Option<ServerTask>,
    scheduler: Arc<JobScheduler>,
    timeout: Duration,
}

impl ServiceLifecycle {
    pub fn new(
        main: ServerTask,
        management: Option<ServerTask>,
        scheduler: Arc<JobScheduler>,
        timeout: Duration,
    ) -> Self {
        Self {
            main,
            management,
            scheduler,
            timeout,
        }
    }

    /// Serve until `signal` resolves or the main server exits, then stop in order
    pub async fn run_until<F>(mut self, signal: F) -> ShutdownCause
    where
        F: Future<Output = ()>,
    {
        let cause = tokio::select! {
            result = &mut self.main.task => {
                log_exit(self.main.name, result);
                ShutdownCause::MainServerExited
            }
            _ = signal => ShutdownCause::Signal,
        };
        info!(?cause, "Shutting down");

        if cause == ShutdownCause::Signal {
            self.main.stop(self.timeout).await;
        }
        self.scheduler.shutdown(self.timeout).await;
        if let Some(management) = self.management {
            management.stop(self.timeout).await;
        }
        cause
    }
}

/// Resolve on Ctrl+C or SIGTERM
///
/// A handler that cannot be installed is logged and never fires.
pub async fn shutdown_requested() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
