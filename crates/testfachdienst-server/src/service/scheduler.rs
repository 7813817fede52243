//! Recurring background jobs
//!
//! Each job runs on its own tokio task at a fixed interval. Runs of one job
//! never overlap, and a failing run is logged and counted without stopping
//! later runs. On shutdown a run in progress may finish within the grace
//! period before the job's own shutdown hook is called.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::metrics;

/// Work executed by the scheduler
#[async_trait]
pub trait Job: Send + Sync {
    async fn run(&self) -> anyhow::Result<()>;

    /// Called once after the final run when the scheduler shuts down
    async fn on_shutdown(&self) {}
}

/// Snapshot of a registered recurring job
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecurringJobInfo {
    pub id: String,
    pub interval_seconds: u64,
    pub runs: u64,
    pub failures: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[derive(Default)]
struct JobStats {
    runs: AtomicU64,
    failures: AtomicU64,
    last_run: Mutex<Option<DateTime<Utc>>>,
    last_error: Mutex<Option<String>>,
}

struct RecurringJob {
    interval: Duration,
    stats: Arc<JobStats>,
    job: Arc<dyn Job>,
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Registry of recurring jobs keyed by id
#[derive(Default)]
pub struct JobScheduler {
    jobs: DashMap<String, RecurringJob>,
}

impl JobScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `job` every `interval`, the first time one interval from now
    ///
    /// Registering an id again replaces the previous job.
    pub fn create_recurrently(
        &self,
        id: &str,
        interval: Duration,
        job: Arc<dyn Job>,
    ) -> anyhow::Result<()> {
        if interval.is_zero() {
            anyhow::bail!("Interval of recurring job '{}' must be positive", id);
        }

        let stats = Arc::new(JobStats::default());
        let (stop, stopped) = watch::channel(false);
        let handle = tokio::spawn(run_recurring(
            id.to_string(),
            interval,
            job.clone(),
            stats.clone(),
            stopped,
        ));

        let previous = self.jobs.insert(
            id.to_string(),
            RecurringJob {
                interval,
                stats,
                job,
                stop,
                handle,
            },
        );
        if let Some(previous) = previous {
            previous.handle.abort();
            info!(job_id = id, "Replaced recurring job");
        }

        info!(
            job_id = id,
            interval_secs = interval.as_secs(),
            "Recurring job scheduled"
        );
        Ok(())
    }

    /// Stop and remove a job, returning whether it was registered
    pub fn delete(&self, id: &str) -> bool {
        match self.jobs.remove(id) {
            Some((_, job)) => {
                job.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Registered jobs ordered by id
    pub fn jobs(&self) -> Vec<RecurringJobInfo> {
        let mut jobs: Vec<RecurringJobInfo> = self
            .jobs
            .iter()
            .map(|entry| {
                let job = entry.value();
                RecurringJobInfo {
                    id: entry.key().clone(),
                    interval_seconds: job.interval.as_secs(),
                    runs: job.stats.runs.load(Ordering::Relaxed),
                    failures: job.stats.failures.load(Ordering::Relaxed),
                    last_run: *job.stats.last_run.lock(),
                    last_error: job.stats.last_error.lock().clone(),
                }
            })
            .collect();
        jobs.sort_by(|a, b| a.id.cmp(&b.id));
        jobs
    }

    /// Stop every job, letting runs in progress finish within `grace`
    ///
    /// Runs still busy at the deadline are aborted. Each job's
    /// [`Job::on_shutdown`] hook is called either way.
    pub async fn shutdown(&self, grace: Duration) {
        let ids: Vec<String> = self.jobs.iter().map(|entry| entry.key().clone()).collect();
        let stopping: Vec<(String, RecurringJob)> =
            ids.into_iter().filter_map(|id| self.jobs.remove(&id)).collect();
        for (_, job) in &stopping {
            let _ = job.stop.send(true);
        }

        let deadline = Instant::now() + grace;
        for (id, mut job) in stopping {
            if tokio::time::timeout_at(deadline, &mut job.handle).await.is_err() {
                job.handle.abort();
                warn!(job_id = %id, "Recurring job aborted after grace period");
            }
            job.job.on_shutdown().await;
            debug!(job_id = %id, "Recurring job stopped");
        }
        info!("Job scheduler stopped");
    }
}

async fn run_recurring(
    id: String,
    interval: Duration,
    job: Arc<dyn Job>,
    stats: Arc<JobStats>,
    mut stopped: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = stopped.changed() => break,
            _ = ticker.tick() => {}
        }

        let started = std::time::Instant::now();
        let result = job.run().await;
        stats.runs.fetch_add(1, Ordering::Relaxed);
        *stats.last_run.lock() = Some(Utc::now());

        match result {
            Ok(()) => {
                *stats.last_error.lock() = None;
                metrics::record_job_run(&id, true, started.elapsed());
                debug!(job_id = %id, "Recurring job succeeded");
            }
            Err(e) => {
                stats.failures.fetch_add(1, Ordering::Relaxed);
                *stats.last_error.lock() = Some(e.to_string());
                metrics::record_job_run(&id, false, started.elapsed());
                warn!(job_id = %id, error = %e, "Recurring job failed");
            }
        }
    }
}
