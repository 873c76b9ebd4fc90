//! Periodic refresh jobs.
//!
//! Each registered job gets its own task that runs the job once immediately
//! and then on every interval tick, after an optional random delay of up to
//! `jitter`. Jobs share nothing with each other; a slow job only delays its
//! own next tick. Shutdown is broadcast: a job that is mid-run finishes the run
//! and then exits.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use futures::{StreamExt, stream::FuturesUnordered};
use rand::Rng;
use thiserror::Error;
use tokio::{
    sync::broadcast,
    task::JoinHandle,
    time::{MissedTickBehavior, interval, sleep, timeout},
};
use tracing::{debug, error, info, warn};

use crate::metrics::internal::Telemetry;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("job '{name}' has a non-positive interval of {seconds}s")]
    InvalidPeriod { name: String, seconds: i64 },

    #[error("no collector is scheduled or collected on scrape")]
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Ok,
    Degraded,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Ok => "ok",
            RunStatus::Degraded => "degraded",
        }
    }
}

#[async_trait]
pub trait Job: Send + Sync {
    async fn run(&self) -> RunStatus;
}

#[derive(Clone)]
pub struct JobSpec {
    pub name: String,
    pub interval_seconds: i64,
    pub jitter: Duration,
    pub job: Arc<dyn Job>,
}

impl std::fmt::Debug for JobSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobSpec")
            .field("name", &self.name)
            .field("interval_seconds", &self.interval_seconds)
            .field("jitter", &self.jitter)
            .finish_non_exhaustive()
    }
}

struct Registered {
    name: String,
    period: Duration,
    jitter: Duration,
    job: Arc<dyn Job>,
}

#[derive(Default)]
pub struct Scheduler {
    jobs: Vec<Registered>,
    telemetry: Option<Telemetry>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn add_job(&mut self, spec: JobSpec) -> Result<(), ScheduleError> {
        let seconds = u64::try_from(spec.interval_seconds)
            .ok()
            .filter(|s| *s > 0)
            .ok_or_else(|| ScheduleError::InvalidPeriod {
                name: spec.name.clone(),
                seconds: spec.interval_seconds,
            })?;

        info!(
            event.name = "scheduler.job_registered",
            job.name = %spec.name,
            job.interval_seconds = seconds,
            job.jitter_seconds = spec.jitter.as_secs(),
            "registered periodic job"
        );

        self.jobs.push(Registered {
            name: spec.name,
            period: Duration::from_secs(seconds),
            jitter: spec.jitter,
            job: spec.job,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Spawns one task per job on the current runtime.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, _) = broadcast::channel(1);
        let tasks = self
            .jobs
            .into_iter()
            .map(|registered| {
                let name = registered.name.clone();
                let shutdown_rx = shutdown_tx.subscribe();
                let telemetry = self.telemetry.clone();
                (name, tokio::spawn(run_job(registered, shutdown_rx, telemetry)))
            })
            .collect();

        SchedulerHandle { shutdown_tx, tasks }
    }
}

async fn run_job(
    registered: Registered,
    mut shutdown_rx: broadcast::Receiver<()>,
    telemetry: Option<Telemetry>,
) {
    let Registered {
        name,
        period,
        jitter,
        job,
    } = registered;
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        // shutdown wins over a tick that is ready at the same time
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            _ = ticker.tick() => {}
        }

        let delay = random_delay(jitter);
        if !delay.is_zero() {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                _ = sleep(delay) => {}
            }
        }

        let started = Instant::now();
        let status = job.run().await;
        if let Some(telemetry) = &telemetry {
            telemetry.record_job_run(&name, status);
        }
        debug!(
            event.name = "scheduler.job_finished",
            job.name = %name,
            job.status = status.as_str(),
            duration_ms = started.elapsed().as_millis(),
            "job run finished"
        );
    }

    debug!(event.name = "scheduler.job_stopped", job.name = %name, "job stopped");
}

fn random_delay(jitter: Duration) -> Duration {
    if jitter.is_zero() {
        return Duration::ZERO;
    }
    let millis = u64::try_from(jitter.as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(rand::rng().random_range(0..=millis))
}

/// Result of [`SchedulerHandle::shutdown`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShutdownResult {
    Graceful { jobs_stopped: usize },
    ForcedCancellation { jobs_cancelled: usize },
}

pub struct SchedulerHandle {
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<(String, JoinHandle<()>)>,
}

impl SchedulerHandle {
    pub fn job_count(&self) -> usize {
        self.tasks.len()
    }

    /// Signals every job to stop and waits up to `grace` for in-flight runs to
    /// finish before aborting the rest.
    pub async fn shutdown(self, grace: Duration) -> ShutdownResult {
        info!(
            event.name = "scheduler.shutdown_started",
            jobs = self.tasks.len(),
            timeout_seconds = grace.as_secs(),
            "stopping scheduled jobs"
        );
        let _ = self.shutdown_tx.send(());

        let aborts: Vec<_> = self
            .tasks
            .iter()
            .map(|(name, handle)| (name.clone(), handle.abort_handle()))
            .collect();
        let total = self.tasks.len();

        let mut pending: FuturesUnordered<_> = self
            .tasks
            .into_iter()
            .map(|(name, handle)| async move { (name, handle.await) })
            .collect();

        let drained = timeout(grace, async {
            while let Some((name, result)) = pending.next().await {
                if let Err(e) = result {
                    error!(
                        event.name = "scheduler.job_panicked",
                        job.name = %name,
                        error.message = ?e,
                        "job task ended abnormally"
                    );
                }
            }
        })
        .await;

        match drained {
            Ok(()) => ShutdownResult::Graceful { jobs_stopped: total },
            Err(_) => {
                let mut cancelled = 0;
                for (name, abort) in aborts {
                    if !abort.is_finished() {
                        abort.abort();
                        cancelled += 1;
                        warn!(
                            event.name = "scheduler.job_cancelled",
                            job.name = %name,
                            "job did not stop in time and was cancelled"
                        );
                    }
                }
                ShutdownResult::ForcedCancellation {
                    jobs_cancelled: cancelled,
                }
            }
        }
    }
}
