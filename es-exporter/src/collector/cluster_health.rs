use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    client::{Endpoint, EsClient, FetchError},
    collector::{Source, SourceSettings},
    sample::MetricSample,
};

pub const KEY: &str = "es_cluster";

/// Fields describing the response rather than the cluster.
const DROPPED: [&str; 2] = ["cluster_name", "timed_out"];

/// Maps a health colour to its ordinal; unknown colours count as red.
pub fn status_ordinal(status: &str) -> f64 {
    match status {
        "green" => 0.0,
        "yellow" => 1.0,
        _ => 2.0,
    }
}

/// `GET /_cluster/health`: one sample per numeric top-level field, labeled by
/// cluster name, with the status colour mapped to an ordinal.
pub struct ClusterHealth {
    client: Arc<dyn EsClient>,
    settings: SourceSettings,
}

impl ClusterHealth {
    pub fn new(client: Arc<dyn EsClient>, settings: SourceSettings) -> Self {
        Self { client, settings }
    }

    pub fn boxed(client: Arc<dyn EsClient>, settings: SourceSettings) -> Box<dyn Source> {
        Box::new(Self::new(client, settings))
    }
}

#[async_trait]
impl Source for ClusterHealth {
    fn key(&self) -> &str {
        KEY
    }

    async fn fetch_raw(&self) -> Result<Value, FetchError> {
        self.client
            .cluster_health(&self.settings.params, self.settings.timeout)
            .await
    }

    fn build_samples(&self, raw: &Value) -> Result<Vec<MetricSample>, FetchError> {
        let health = raw
            .as_object()
            .ok_or_else(|| FetchError::decode(Endpoint::ClusterHealth, "expected an object"))?;
        let cluster_name = health
            .get("cluster_name")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let samples = health
            .iter()
            .filter(|(field, _)| !DROPPED.contains(&field.as_str()))
            .filter_map(|(field, value)| {
                let value = match (field.as_str(), value) {
                    ("status", Value::String(status)) => status_ordinal(status),
                    (_, Value::Number(n)) => n.as_f64()?,
                    _ => return None,
                };
                Some((field, value))
            })
            .map(|(field, value)| {
                MetricSample::new(format!("{KEY}_{field}"), field.as_str(), value)
                    .with_label("cluster_name", cluster_name)
            })
            .filter(|sample| !self.settings.blocklist.is_blocked(&sample.name))
            .collect();

        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use serde_json::json;

    use super::{ClusterHealth, status_ordinal};
    use crate::{
        blocklist::Blocklist,
        client::fake::FakeClient,
        collector::{Source, SourceSettings},
        sample::MetricSample,
    };

    fn source(blocklist: Blocklist) -> ClusterHealth {
        ClusterHealth::new(
            Arc::new(FakeClient::new()),
            SourceSettings {
                blocklist,
                ..SourceSettings::new(Duration::from_secs(10))
            },
        )
    }

    fn find<'a>(samples: &'a [MetricSample], name: &str) -> Option<&'a MetricSample> {
        samples.iter().find(|s| s.name == name)
    }

    #[test]
    fn maps_status_and_numeric_fields() {
        let raw = json!({
            "cluster_name": "c1",
            "status": "yellow",
            "timed_out": false,
            "number_of_nodes": 3
        });
        let samples = source(Blocklist::empty()).build_samples(&raw).unwrap();

        assert_eq!(samples.len(), 2);
        let status = find(&samples, "es_cluster_status").unwrap();
        assert_eq!(status.value, 1.0);
        assert_eq!(status.labels, vec![("cluster_name".to_string(), "c1".to_string())]);
        assert_eq!(status.help, "status");
        assert_eq!(find(&samples, "es_cluster_number_of_nodes").unwrap().value, 3.0);
        assert!(find(&samples, "es_cluster_cluster_name").is_none());
        assert!(find(&samples, "es_cluster_timed_out").is_none());
    }

    #[test]
    fn unknown_status_counts_as_red() {
        assert_eq!(status_ordinal("green"), 0.0);
        assert_eq!(status_ordinal("yellow"), 1.0);
        assert_eq!(status_ordinal("red"), 2.0);
        assert_eq!(status_ordinal("purple"), 2.0);
    }

    #[test]
    fn nested_and_non_numeric_fields_are_ignored() {
        let raw = json!({
            "cluster_name": "c1",
            "status": "green",
            "active_shards_percent_as_number": 100.0,
            "indices": {"i1": {"status": "green"}},
            "discovered_master": true
        });
        let samples = source(Blocklist::empty()).build_samples(&raw).unwrap();
        let names: Vec<_> = samples.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["es_cluster_status", "es_cluster_active_shards_percent_as_number"]
        );
    }

    #[test]
    fn blocklist_applies() {
        let blocklist = Blocklist::new(["es_cluster_active"], Vec::<String>::new()).unwrap();
        let raw = json!({"cluster_name": "c1", "status": "green", "active_shards": 5, "number_of_nodes": 1});
        let samples = source(blocklist).build_samples(&raw).unwrap();
        assert!(find(&samples, "es_cluster_active_shards").is_none());
        assert!(find(&samples, "es_cluster_number_of_nodes").is_some());
    }

    #[test]
    fn non_object_response_is_a_decode_error() {
        assert!(source(Blocklist::empty()).build_samples(&json!([])).is_err());
    }
}
