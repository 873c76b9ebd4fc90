//! Collectors turning cluster responses into gauge families.
//!
//! A [`Source`] knows how to fetch one response and translate it into
//! samples. [`SourceCollector`] wraps a source with the failure handling and
//! the collection discipline: fetch on every scrape, or serve the snapshot
//! left behind by the last scheduled run. Consumers cannot tell which one is
//! in effect.

mod build;
pub mod cluster_health;
pub mod indices;
pub mod nodes;
pub mod opts;
pub mod query;

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

pub use build::{Assembly, BuildError, assemble};

use crate::{
    blocklist::Blocklist,
    client::{FetchError, Params},
    flatten::NameStyle,
    metrics::internal::Telemetry,
    registry::PullSource,
    sample::{GaugeFamily, MetricSample, group},
    scheduler::{Job, JobSpec, RunStatus},
};

/// The `<key>_up` family reporting whether the last fetch succeeded.
pub fn up_family(key: &str, succeeded: bool) -> GaugeFamily {
    GaugeFamily::scalar(
        &format!("{key}_up"),
        format!("Did the {key} fetch succeed."),
        if succeeded { 1.0 } else { 0.0 },
    )
}

#[async_trait]
pub trait Source: Send + Sync {
    /// Identifier used as metric prefix, job name and registry key.
    fn key(&self) -> &str;

    async fn fetch_raw(&self) -> Result<Value, FetchError>;

    /// Translates a response into samples, applying the blocklist.
    fn build_samples(&self, raw: &Value) -> Result<Vec<MetricSample>, FetchError>;
}

/// Per-source request settings resolved from configuration.
#[derive(Debug)]
pub struct SourceSettings {
    pub params: Params,
    pub timeout: Duration,
    pub blocklist: Blocklist,
    pub name_style: NameStyle,
}

impl SourceSettings {
    pub fn new(timeout: Duration) -> Self {
        Self {
            params: Params::new(),
            timeout,
            blocklist: Blocklist::empty(),
            name_style: NameStyle::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionMode {
    OnScrape,
    Scheduled {
        interval_seconds: i64,
        jitter: Duration,
    },
    /// Registered, never scheduled, skipped on scrape.
    Disabled,
}

pub struct SourceCollector {
    source: Box<dyn Source>,
    mode: CollectionMode,
    snapshot: ArcSwapOption<Vec<GaugeFamily>>,
    telemetry: Option<Telemetry>,
}

impl SourceCollector {
    pub fn new(source: Box<dyn Source>, mode: CollectionMode) -> Self {
        Self {
            source,
            mode,
            snapshot: ArcSwapOption::empty(),
            telemetry: None,
        }
    }

    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn key(&self) -> &str {
        self.source.key()
    }

    pub fn mode(&self) -> &CollectionMode {
        &self.mode
    }

    /// Fetches and translates once. Never fails: any error degrades the
    /// output to a single `<key>_up` of zero.
    pub async fn get_metric(&self) -> Vec<GaugeFamily> {
        self.fetch_families().await.0
    }

    async fn fetch_families(&self) -> (Vec<GaugeFamily>, RunStatus) {
        let key = self.key();
        let started = Instant::now();
        let result = match self.source.fetch_raw().await {
            Ok(raw) => self.source.build_samples(&raw),
            Err(e) => Err(e),
        };
        if let Some(telemetry) = &self.telemetry {
            telemetry.observe_collect(key, started.elapsed());
        }

        match result {
            Ok(samples) => {
                let mut families = group(samples);
                families.push(up_family(key, true));
                debug!(
                    event.name = "collector.fetched",
                    collector.key = %key,
                    families = families.len(),
                    "collected metrics"
                );
                (families, RunStatus::Ok)
            }
            Err(e) if e.is_timeout() => {
                warn!(
                    event.name = "collector.fetch_timeout",
                    collector.key = %key,
                    error.message = %e,
                    "fetch timed out"
                );
                (vec![up_family(key, false)], RunStatus::Degraded)
            }
            Err(e) => {
                warn!(
                    event.name = "collector.fetch_failed",
                    collector.key = %key,
                    error.message = %e,
                    "fetch failed"
                );
                (vec![up_family(key, false)], RunStatus::Degraded)
            }
        }
    }

    /// Recomputes the snapshot. Called by the scheduled job.
    pub async fn refresh(&self) -> RunStatus {
        let (families, status) = self.fetch_families().await;
        self.snapshot.store(Some(Arc::new(families)));
        status
    }

    pub fn snapshot(&self) -> Option<Arc<Vec<GaugeFamily>>> {
        self.snapshot.load_full()
    }

    pub async fn collect(&self) -> Vec<GaugeFamily> {
        match self.mode {
            CollectionMode::OnScrape => self.get_metric().await,
            CollectionMode::Scheduled { .. } => self
                .snapshot
                .load_full()
                .map(|families| Vec::clone(&families))
                .unwrap_or_default(),
            CollectionMode::Disabled => Vec::new(),
        }
    }

    /// The refresh job for a scheduled collector.
    pub fn job_spec(self: &Arc<Self>) -> Option<JobSpec> {
        match self.mode {
            CollectionMode::Scheduled {
                interval_seconds,
                jitter,
            } => Some(JobSpec {
                name: self.key().to_string(),
                interval_seconds,
                jitter,
                job: self.clone(),
            }),
            _ => None,
        }
    }
}

#[async_trait]
impl Job for SourceCollector {
    async fn run(&self) -> RunStatus {
        self.refresh().await
    }
}

#[async_trait]
impl PullSource for SourceCollector {
    fn key(&self) -> &str {
        self.source.key()
    }

    async fn collect(&self) -> Vec<GaugeFamily> {
        SourceCollector::collect(self).await
    }

    async fn collect_now(&self) -> Vec<GaugeFamily> {
        self.get_metric().await
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use serde_json::json;

    use super::{CollectionMode, SourceCollector, SourceSettings, cluster_health::ClusterHealth};
    use crate::{
        client::{
            Endpoint, EsClient,
            fake::{FakeClient, Reply},
        },
        sample::GaugeFamily,
        scheduler::RunStatus,
    };

    fn health() -> serde_json::Value {
        json!({"cluster_name": "c1", "status": "green", "timed_out": false, "number_of_nodes": 3})
    }

    fn collector(client: Arc<FakeClient>, mode: CollectionMode) -> SourceCollector {
        let client: Arc<dyn EsClient> = client;
        let source = ClusterHealth::new(client, SourceSettings::new(Duration::from_secs(10)));
        SourceCollector::new(Box::new(source), mode)
    }

    fn names(families: &[GaugeFamily]) -> Vec<&str> {
        families.iter().map(|f| f.name()).collect()
    }

    fn scheduled() -> CollectionMode {
        CollectionMode::Scheduled {
            interval_seconds: 30,
            jitter: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn on_scrape_fetches_on_every_collect() {
        let client = Arc::new(FakeClient::new().with(Endpoint::ClusterHealth, Reply::Body(health())));
        let collector = collector(client.clone(), CollectionMode::OnScrape);

        collector.collect().await;
        let families = collector.collect().await;

        assert_eq!(client.calls(Endpoint::ClusterHealth), 2);
        assert_eq!(names(&families).last(), Some(&"es_cluster_up"));
        assert_eq!(families.last().unwrap().value(&[]), Some(1.0));
    }

    #[tokio::test]
    async fn scheduled_collect_serves_the_snapshot_only() {
        let client = Arc::new(FakeClient::new().with(Endpoint::ClusterHealth, Reply::Body(health())));
        let collector = collector(client.clone(), scheduled());

        assert!(collector.collect().await.is_empty());
        assert_eq!(client.total_calls(), 0);

        assert_eq!(collector.refresh().await, RunStatus::Ok);
        for _ in 0..3 {
            let families = collector.collect().await;
            assert!(names(&families).contains(&"es_cluster_number_of_nodes"));
        }
        assert_eq!(client.total_calls(), 1);
    }

    #[tokio::test]
    async fn timeout_degrades_to_a_single_up_gauge() {
        let client = Arc::new(FakeClient::new().with(Endpoint::ClusterHealth, Reply::Timeout));
        let collector = collector(client, CollectionMode::OnScrape);

        let families = collector.collect().await;
        assert_eq!(names(&families), vec!["es_cluster_up"]);
        assert_eq!(families[0].value(&[]), Some(0.0));
        assert_eq!(families[0].help(), "Did the es_cluster fetch succeed.");
    }

    #[tokio::test]
    async fn other_failures_degrade_the_same_way() {
        let client = Arc::new(FakeClient::new().with(Endpoint::ClusterHealth, Reply::Status(503)));
        let collector = collector(client.clone(), scheduled());

        assert_eq!(collector.refresh().await, RunStatus::Degraded);
        let families = collector.collect().await;
        assert_eq!(names(&families), vec!["es_cluster_up"]);
        assert_eq!(families[0].value(&[]), Some(0.0));

        client.set(Endpoint::ClusterHealth, Reply::Body(health()));
        assert_eq!(collector.refresh().await, RunStatus::Ok);
        assert_eq!(collector.collect().await.last().unwrap().value(&[]), Some(1.0));
    }

    #[tokio::test]
    async fn disabled_collectors_are_skipped_but_collectable_on_demand() {
        let client = Arc::new(FakeClient::new().with(Endpoint::ClusterHealth, Reply::Body(health())));
        let collector = Arc::new(collector(client.clone(), CollectionMode::Disabled));

        assert!(collector.collect().await.is_empty());
        assert!(collector.job_spec().is_none());
        assert_eq!(client.total_calls(), 0);

        let families = crate::registry::PullSource::collect_now(collector.as_ref()).await;
        assert_eq!(names(&families).last(), Some(&"es_cluster_up"));
        assert_eq!(client.total_calls(), 1);
    }

    #[test]
    fn scheduled_collectors_expose_a_job() {
        let client = Arc::new(FakeClient::new());
        let collector = Arc::new(collector(client, scheduled()));
        let spec = collector.job_spec().unwrap();
        assert_eq!(spec.name, "es_cluster");
        assert_eq!(spec.interval_seconds, 30);
    }
}
