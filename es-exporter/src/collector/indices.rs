use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    client::{Endpoint, EsClient, FetchError},
    collector::{Source, SourceSettings},
    flatten::flatten_with_style,
    sample::MetricSample,
};

pub const KEY: &str = "es_indices";

/// Name under which the cluster-wide totals are reported.
pub const ALL: &str = "_all";

const CONTEXTS: [&str; 2] = ["primaries", "total"];

/// `GET /_stats`: every index plus the `_all` aggregate, each flattened once
/// for primaries and once for all shard copies.
pub struct Indices {
    client: Arc<dyn EsClient>,
    settings: SourceSettings,
}

impl Indices {
    pub fn new(client: Arc<dyn EsClient>, settings: SourceSettings) -> Self {
        Self { client, settings }
    }

    pub fn boxed(client: Arc<dyn EsClient>, settings: SourceSettings) -> Box<dyn Source> {
        Box::new(Self::new(client, settings))
    }

    fn index_samples(&self, index: &str, stats: &Value, samples: &mut Vec<MetricSample>) {
        let prefix = format!("{KEY}_");
        for context in CONTEXTS {
            let Some(section) = stats.get(context) else {
                continue;
            };
            for metric in flatten_with_style(&prefix, section, "", self.settings.name_style) {
                if self.settings.blocklist.is_blocked(&metric.name) {
                    continue;
                }
                samples.push(
                    MetricSample::new(metric.name, metric.doc, metric.value)
                        .with_label("index", index)
                        .with_label("context", context),
                );
            }
        }
    }
}

#[async_trait]
impl Source for Indices {
    fn key(&self) -> &str {
        KEY
    }

    async fn fetch_raw(&self) -> Result<Value, FetchError> {
        self.client
            .indices_stats(&self.settings.params, self.settings.timeout)
            .await
    }

    fn build_samples(&self, raw: &Value) -> Result<Vec<MetricSample>, FetchError> {
        let indices = raw
            .get("indices")
            .and_then(Value::as_object)
            .ok_or_else(|| FetchError::decode(Endpoint::IndicesStats, "missing 'indices' object"))?;

        let mut samples = Vec::new();
        for (index, stats) in indices {
            self.index_samples(index, stats, &mut samples);
        }
        if let Some(all) = raw.get(ALL) {
            self.index_samples(ALL, all, &mut samples);
        }
        Ok(samples)
    }
}
