//! Metrics derived from user-defined search queries.
//!
//! Each configured query runs as its own job and publishes its families into a
//! store shared by all queries. Scrapes read the store and never search.
//! A family keeps its last published value until the same name is published
//! again, unless the owning query opts into `evict_stale`.

use std::{
    collections::HashSet,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    aggregation::flatten_aggregations,
    blocklist::Blocklist,
    client::{Endpoint, EsClient, FetchError},
    collector::{opts::QueryOptions, up_family},
    interval::IntervalLiteral,
    metrics::internal::Telemetry,
    registry::PullSource,
    sample::GaugeFamily,
    scheduler::{Job, RunStatus},
};

/// Registry key of the query collector.
pub const KEY: &str = "es_query";

/// Resolves a metric-name template against the query definition and removes
/// every `*`, so index patterns can be used inside names.
pub fn resolve_metric_name(opts: &QueryOptions) -> String {
    opts.metric
        .replace("{name}", &opts.name)
        .replace("{index}", &opts.index)
        .replace("{doc}", &opts.doc)
        .replace("{interval}", &literal_text(&opts.interval))
        .replace("{timeout}", &literal_text(&opts.timeout))
        .replace('*', "")
}

fn literal_text(literal: &Option<IntervalLiteral>) -> String {
    literal.as_ref().map(ToString::to_string).unwrap_or_default()
}

fn describe(doc: &str, what: &str) -> String {
    format!("{doc} {what}").trim().to_string()
}

struct Published {
    owner: String,
    family: GaugeFamily,
}

/// Name-to-family map shared by every query. Later publications of the same
/// name overwrite earlier ones, whichever query made them.
#[derive(Default)]
pub struct QueryStore {
    families: DashMap<String, Published>,
}

impl QueryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `families` for `owner`. With `evict`, families previously
    /// published by `owner` and missing from this batch are removed first.
    pub fn publish(&self, owner: &str, families: Vec<GaugeFamily>, evict: bool) {
        if evict {
            let fresh: HashSet<String> = families.iter().map(|f| f.name().to_string()).collect();
            self.families
                .retain(|name, published| published.owner != owner || fresh.contains(name));
        }
        for family in families {
            self.families.insert(
                family.name().to_string(),
                Published {
                    owner: owner.to_string(),
                    family,
                },
            );
        }
    }

    /// Every published family, ordered by name.
    pub fn families(&self) -> Vec<GaugeFamily> {
        let mut families: Vec<GaugeFamily> = self
            .families
            .iter()
            .map(|entry| entry.value().family.clone())
            .collect();
        families.sort_by(|a, b| a.name().cmp(b.name()));
        families
    }

    pub fn len(&self) -> usize {
        self.families.len()
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }
}

pub struct QueryJob {
    name: String,
    index: String,
    body: Value,
    metric: String,
    doc: String,
    timeout: Duration,
    evict_stale: bool,
    client: Arc<dyn EsClient>,
    blocklist: Arc<Blocklist>,
    store: Arc<QueryStore>,
    telemetry: Option<Telemetry>,
}

impl QueryJob {
    pub fn new(
        opts: &QueryOptions,
        timeout: Duration,
        client: Arc<dyn EsClient>,
        blocklist: Arc<Blocklist>,
        store: Arc<QueryStore>,
    ) -> Self {
        Self {
            name: opts.name.clone(),
            index: opts.index.clone(),
            body: opts.query_json.clone(),
            metric: resolve_metric_name(opts),
            doc: opts.doc.clone(),
            timeout,
            evict_stale: opts.evict_stale,
            client,
            blocklist,
            store,
            telemetry: None,
        }
    }

    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolved metric-name prefix of this query's families.
    pub fn metric(&self) -> &str {
        &self.metric
    }

    /// Translates a search response. `None` means the cluster reported the
    /// search as timed out and nothing should be published.
    fn build_families(&self, response: &Value) -> Result<Option<Vec<GaugeFamily>>, FetchError> {
        if response
            .get("timed_out")
            .and_then(Value::as_bool)
            .unwrap_or(false)
        {
            return Ok(None);
        }

        let took = response
            .get("took")
            .and_then(Value::as_f64)
            .ok_or_else(|| FetchError::decode(Endpoint::Search, "missing 'took'"))?;
        let hits = match response.pointer("/hits/total") {
            Some(Value::Object(total)) => total.get("value").and_then(Value::as_f64),
            Some(total) => total.as_f64(),
            None => None,
        }
        .ok_or_else(|| FetchError::decode(Endpoint::Search, "missing 'hits.total'"))?;

        let mut families = vec![
            GaugeFamily::scalar(
                &format!("{}_total_milliseconds", self.metric),
                describe(&self.doc, "total_milliseconds"),
                took,
            ),
            GaugeFamily::scalar(
                &format!("{}_hits_total", self.metric),
                describe(&self.doc, "hits_total"),
                hits,
            ),
        ];

        if let Some(aggregations) = response.get("aggregations") {
            let name = format!("{}_aggregations", self.metric);
            let mut family: Option<(Vec<String>, GaugeFamily)> = None;
            for bucket in flatten_aggregations(aggregations) {
                let label_names = bucket.label_names();
                let (expected, family) = family.get_or_insert_with(|| {
                    let help = format!("custom query {}", label_names.join(","));
                    (
                        label_names.iter().map(|n| n.to_string()).collect(),
                        GaugeFamily::new(&name, describe(&self.doc, &help), label_names.iter().copied()),
                    )
                });
                let same_labels = expected.iter().map(String::as_str).eq(label_names.iter().copied());
                if !same_labels || !family.push(bucket.label_values(), bucket.doc_count) {
                    debug!(
                        event.name = "query.bucket_skipped",
                        query.name = %self.name,
                        "bucket labels differ from the first bucket"
                    );
                }
            }
            families.extend(family.map(|(_, family)| family));
        }

        families.retain(|family| !self.blocklist.is_blocked(family.name()));
        Ok(Some(families))
    }

    /// Runs the search once and publishes the outcome.
    pub async fn run_once(&self) -> RunStatus {
        let started = Instant::now();
        let result = self
            .client
            .search(&self.index, &self.body, self.timeout)
            .await
            .and_then(|response| self.build_families(&response));
        if let Some(telemetry) = &self.telemetry {
            telemetry.observe_collect(&self.name, started.elapsed());
        }

        let (families, status) = match result {
            Ok(Some(mut families)) => {
                families.push(up_family(&self.metric, true));
                (families, RunStatus::Ok)
            }
            Ok(None) => {
                warn!(
                    event.name = "query.timed_out",
                    query.name = %self.name,
                    "cluster reported the search as timed out"
                );
                (vec![up_family(&self.metric, false)], RunStatus::Degraded)
            }
            Err(e) if e.is_timeout() => {
                warn!(
                    event.name = "collector.fetch_timeout",
                    query.name = %self.name,
                    error.message = %e,
                    "search timed out"
                );
                (vec![up_family(&self.metric, false)], RunStatus::Degraded)
            }
            Err(e) => {
                warn!(
                    event.name = "collector.fetch_failed",
                    query.name = %self.name,
                    error.message = %e,
                    "search failed"
                );
                (vec![up_family(&self.metric, false)], RunStatus::Degraded)
            }
        };

        let evict = self.evict_stale && status == RunStatus::Ok;
        self.store.publish(&self.name, families, evict);
        status
    }
}

#[async_trait]
impl Job for QueryJob {
    async fn run(&self) -> RunStatus {
        self.run_once().await
    }
}

/// Pull source over the shared query store.
pub struct QueryCollector {
    store: Arc<QueryStore>,
    jobs: Vec<Arc<QueryJob>>,
}

impl QueryCollector {
    pub fn new(store: Arc<QueryStore>, jobs: Vec<Arc<QueryJob>>) -> Self {
        Self { store, jobs }
    }

    pub fn jobs(&self) -> &[Arc<QueryJob>] {
        &self.jobs
    }

    pub fn store(&self) -> &QueryStore {
        &self.store
    }
}

#[async_trait]
impl PullSource for QueryCollector {
    fn key(&self) -> &str {
        KEY
    }

    async fn collect(&self) -> Vec<GaugeFamily> {
        self.store.families()
    }

    /// Runs every query, including unscheduled ones, before reading the store.
    async fn collect_now(&self) -> Vec<GaugeFamily> {
        join_all(self.jobs.iter().map(|job| job.run_once())).await;
        self.store.families()
    }
}
