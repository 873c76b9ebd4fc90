//! Exporter self-metrics.

use std::time::Duration;

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

use crate::scheduler::RunStatus;

const NAMESPACE: &str = "es_exporter";

/// Handles to the exporter's own metrics. Cloning shares the underlying series.
#[derive(Clone, Debug)]
pub struct Telemetry {
    collect_duration: HistogramVec,
    job_runs: IntCounterVec,
}

impl Telemetry {
    pub fn new() -> Result<Self, prometheus::Error> {
        let collect_duration = HistogramVec::new(
            HistogramOpts::new(
                "collect_duration_seconds",
                "Time spent fetching and translating one collector's statistics",
            )
            .namespace(NAMESPACE)
            .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &["collector"],
        )?;

        let job_runs = IntCounterVec::new(
            Opts::new("job_runs_total", "Total number of scheduled job runs by outcome")
                .namespace(NAMESPACE),
            &["job", "status"],
        )?;

        Ok(Self {
            collect_duration,
            job_runs,
        })
    }

    pub fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.collect_duration.clone()))?;
        registry.register(Box::new(self.job_runs.clone()))?;
        Ok(())
    }

    pub fn observe_collect(&self, collector: &str, elapsed: Duration) {
        self.collect_duration
            .with_label_values(&[collector])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_job_run(&self, job: &str, status: RunStatus) {
        self.job_runs
            .with_label_values(&[job, status.as_str()])
            .inc();
    }
}
