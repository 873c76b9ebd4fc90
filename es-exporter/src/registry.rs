//! Exposition registry iterated by the metrics server.
//!
//! Holds the pull sources registered at startup next to a plain Prometheus
//! [`Registry`] for the exporter's own metrics. A scrape collects every source
//! concurrently and encodes the union. There is no global registry: the
//! instance is built in `main` and handed to the server as router state.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures::future::join_all;
use prometheus::{Registry, TextEncoder, proto::MetricFamily};
use tracing::{debug, error};

use crate::{metrics::error::MetricsError, sample::GaugeFamily};

/// Anything that can be asked for its current gauge families.
#[async_trait]
pub trait PullSource: Send + Sync {
    fn key(&self) -> &str;

    /// Families for a regular scrape.
    async fn collect(&self) -> Vec<GaugeFamily>;

    /// Families computed right now, bypassing any schedule.
    async fn collect_now(&self) -> Vec<GaugeFamily> {
        self.collect().await
    }
}

#[derive(Default)]
pub struct ExpositionRegistry {
    registry: Registry,
    sources: RwLock<Vec<Arc<dyn PullSource>>>,
}

impl ExpositionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry holding the exporter's own metrics.
    pub fn internal(&self) -> &Registry {
        &self.registry
    }

    pub fn register(&self, source: Arc<dyn PullSource>) -> Result<(), MetricsError> {
        let mut sources = self.sources.write().map_err(|_| MetricsError::Poisoned)?;
        if sources.iter().any(|s| s.key() == source.key()) {
            return Err(MetricsError::DuplicateSource(source.key().to_string()));
        }
        debug!(
            event.name = "registry.source_registered",
            collector.key = %source.key(),
            "pull source registered"
        );
        sources.push(source);
        Ok(())
    }

    pub fn keys(&self) -> Vec<String> {
        self.snapshot().iter().map(|s| s.key().to_string()).collect()
    }

    pub fn source(&self, key: &str) -> Option<Arc<dyn PullSource>> {
        self.snapshot().into_iter().find(|s| s.key() == key)
    }

    fn snapshot(&self) -> Vec<Arc<dyn PullSource>> {
        match self.sources.read() {
            Ok(sources) => sources.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Collects every registered source plus the internal registry.
    pub async fn gather(&self) -> Vec<MetricFamily> {
        let sources = self.snapshot();
        let collected = join_all(sources.iter().map(|source| source.collect())).await;

        let mut families = self.registry.gather();
        families.extend(
            collected
                .iter()
                .flatten()
                .flat_map(GaugeFamily::to_metric_families),
        );
        families
    }

    /// Renders a full scrape in the Prometheus text format.
    pub async fn render(&self) -> Result<String, MetricsError> {
        encode(self.gather().await).await
    }

    /// Renders a single source collected on demand. `None` if no source is
    /// registered under `key`.
    pub async fn render_source(&self, key: &str) -> Option<Result<String, MetricsError>> {
        let source = self.source(key)?;
        let families: Vec<MetricFamily> = source
            .collect_now()
            .await
            .iter()
            .flat_map(GaugeFamily::to_metric_families)
            .collect();
        Some(encode(families).await)
    }
}

async fn encode(families: Vec<MetricFamily>) -> Result<String, MetricsError> {
    match tokio::task::spawn_blocking(move || TextEncoder::new().encode_to_string(&families)).await {
        Ok(result) => Ok(result?),
        Err(e) => {
            error!(
                event.name = "metrics.encode_failed",
                error.message = %e,
                "encoding task panicked"
            );
            Err(MetricsError::EncodeTask(e.to_string()))
        }
    }
}
