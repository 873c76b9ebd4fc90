//! Assembly of collectors and jobs from configuration.

use std::{fmt, sync::Arc, time::Duration};

use thiserror::Error;
use tracing::{debug, info};

use crate::{
    blocklist::{Blocklist, BlocklistError},
    client::EsClient,
    collector::{
        CollectionMode, Source, SourceCollector, SourceSettings,
        cluster_health::{self, ClusterHealth},
        indices::{self, Indices},
        nodes::{self, Nodes},
        opts::{GlobalOptions, SourceOptions},
        query::{QueryCollector, QueryJob, QueryStore},
    },
    interval::{IntervalError, IntervalLiteral},
    metrics::internal::Telemetry,
    registry::PullSource,
    runtime::conf::Conf,
    scheduler::{JobSpec, ScheduleError, Scheduler},
};

type Constructor = fn(Arc<dyn EsClient>, SourceSettings) -> Box<dyn Source>;

/// Configuration section name to collector constructor, in registration order.
const REGISTRATIONS: [(&str, Constructor); 3] = [
    (cluster_health::KEY, ClusterHealth::boxed),
    (nodes::KEY, Nodes::boxed),
    (indices::KEY, Indices::boxed),
];

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("{scope}.{field}: {source}")]
    Interval {
        scope: String,
        field: &'static str,
        #[source]
        source: IntervalError,
    },

    #[error("{scope}.{field} must be {expected}, got {seconds}s")]
    OutOfRange {
        scope: String,
        field: &'static str,
        expected: &'static str,
        seconds: i64,
    },

    #[error("{scope}.blocklist: {source}")]
    Blocklist {
        scope: String,
        #[source]
        source: BlocklistError,
    },

    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

/// Collectors built from configuration, ready to be registered for exposition.
pub struct Assembly {
    pub collectors: Vec<Arc<SourceCollector>>,
    pub queries: Option<Arc<QueryCollector>>,
}

impl Assembly {
    pub fn pull_sources(&self) -> Vec<Arc<dyn PullSource>> {
        let mut sources: Vec<Arc<dyn PullSource>> = self
            .collectors
            .iter()
            .map(|c| c.clone() as Arc<dyn PullSource>)
            .collect();
        if let Some(queries) = &self.queries {
            sources.push(queries.clone());
        }
        sources
    }
}

impl fmt::Debug for Assembly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Assembly")
            .field(
                "collectors",
                &self.collectors.iter().map(|c| c.key()).collect::<Vec<_>>(),
            )
            .field("queries", &self.queries.is_some())
            .finish()
    }
}

fn seconds(scope: &str, field: &'static str, literal: &IntervalLiteral) -> Result<i64, BuildError> {
    literal.seconds().map_err(|source| BuildError::Interval {
        scope: scope.to_string(),
        field,
        source,
    })
}

fn timeout(scope: &str, own: Option<&IntervalLiteral>, global: &IntervalLiteral) -> Result<Duration, BuildError> {
    let value = seconds(scope, "timeout", own.unwrap_or(global))?;
    u64::try_from(value)
        .ok()
        .filter(|s| *s > 0)
        .map(Duration::from_secs)
        .ok_or_else(|| BuildError::OutOfRange {
            scope: scope.to_string(),
            field: "timeout",
            expected: "positive",
            seconds: value,
        })
}

fn jitter(scope: &str, own: Option<&IntervalLiteral>, global: &IntervalLiteral) -> Result<Duration, BuildError> {
    let value = seconds(scope, "jitter", own.unwrap_or(global))?;
    u64::try_from(value)
        .map(Duration::from_secs)
        .map_err(|_| BuildError::OutOfRange {
            scope: scope.to_string(),
            field: "jitter",
            expected: "non-negative",
            seconds: value,
        })
}

fn mode(scope: &str, opts: &SourceOptions, global: &GlobalOptions) -> Result<CollectionMode, BuildError> {
    match &opts.interval {
        None => Ok(CollectionMode::OnScrape),
        Some(literal) if literal.is_disable() => Ok(CollectionMode::Disabled),
        Some(literal) => Ok(CollectionMode::Scheduled {
            interval_seconds: seconds(scope, "interval", literal)?,
            jitter: jitter(scope, opts.jitter.as_ref(), &global.jitter)?,
        }),
    }
}

fn blocklist(scope: &str, global: &[String], own: &[String]) -> Result<Blocklist, BuildError> {
    Blocklist::new(global, own).map_err(|source| BuildError::Blocklist {
        scope: scope.to_string(),
        source,
    })
}

/// Builds every configured collector and registers the periodic ones with
/// `scheduler`. Sections absent from the configuration are skipped.
pub fn assemble(
    conf: &Conf,
    client: Arc<dyn EsClient>,
    telemetry: Option<Telemetry>,
    scheduler: &mut Scheduler,
) -> Result<Assembly, BuildError> {
    let global = &conf.global;
    let mut collectors = Vec::new();

    for (key, constructor) in REGISTRATIONS {
        let Some(opts) = conf.source(key) else {
            debug!(
                event.name = "collector.not_configured",
                collector.key = key,
                "collector section absent, not registering"
            );
            continue;
        };

        let settings = SourceSettings {
            params: opts.params.clone(),
            timeout: timeout(key, opts.timeout.as_ref(), &global.timeout)?,
            blocklist: blocklist(key, &global.blocklist, &opts.blocklist)?,
            name_style: opts.name_style,
        };
        let mode = mode(key, opts, global)?;
        info!(
            event.name = "collector.registered",
            collector.key = key,
            collector.mode = ?mode,
            "collector registered"
        );

        let mut collector = SourceCollector::new(constructor(client.clone(), settings), mode);
        if let Some(telemetry) = &telemetry {
            collector = collector.with_telemetry(telemetry.clone());
        }
        let collector = Arc::new(collector);
        if let Some(spec) = collector.job_spec() {
            scheduler.add_job(spec)?;
        }
        collectors.push(collector);
    }

    let queries = if conf.metrics.is_empty() {
        None
    } else {
        let store = Arc::new(QueryStore::new());
        let shared_blocklist = Arc::new(blocklist("global", &global.blocklist, &[])?);
        let mut jobs = Vec::with_capacity(conf.metrics.len());

        for query in &conf.metrics {
            let scope = format!("metrics.{}", query.name);
            let mut job = QueryJob::new(
                query,
                timeout(&scope, query.timeout.as_ref(), &global.timeout)?,
                client.clone(),
                shared_blocklist.clone(),
                store.clone(),
            );
            if let Some(telemetry) = &telemetry {
                job = job.with_telemetry(telemetry.clone());
            }
            let job = Arc::new(job);

            let interval = query.interval.as_ref().unwrap_or(&global.interval);
            if interval.is_disable() {
                info!(
                    event.name = "query.unscheduled",
                    query.name = %query.name,
                    "query interval disabled, runs on direct collection only"
                );
            } else {
                scheduler.add_job(JobSpec {
                    name: query.name.clone(),
                    interval_seconds: seconds(&scope, "interval", interval)?,
                    jitter: jitter(&scope, query.jitter.as_ref(), &global.jitter)?,
                    job: job.clone(),
                })?;
            }
            jobs.push(job);
        }
        Some(Arc::new(QueryCollector::new(store, jobs)))
    };

    let on_scrape = collectors
        .iter()
        .any(|c| *c.mode() == CollectionMode::OnScrape);
    if scheduler.is_empty() && !on_scrape {
        return Err(ScheduleError::Empty.into());
    }

    Ok(Assembly {
        collectors,
        queries,
    })
}
