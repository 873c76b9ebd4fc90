use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    client::{Endpoint, EsClient, FetchError},
    collector::{Source, SourceSettings},
    flatten::{NameStyle, flatten_with_style},
    sample::MetricSample,
};

pub const KEY: &str = "es_node";

/// Role flags reported as 0/1 in the `es_node_role` family.
pub const ROLES: [&str; 4] = ["data", "ingest", "master", "ml"];

/// Sections of a node's stats that are flattened into samples.
pub const GROUPS: [&str; 12] = [
    "indices",
    "os",
    "process",
    "jvm",
    "thread_pool",
    "fs",
    "transport",
    "http",
    "breakers",
    "script",
    "discovery",
    "ingest",
];

/// `GET /_nodes/stats`: per node, one role family and the flattened stats
/// sections, all labeled by node name, node id and transport address.
pub struct Nodes {
    client: Arc<dyn EsClient>,
    settings: SourceSettings,
}

impl Nodes {
    pub fn new(client: Arc<dyn EsClient>, settings: SourceSettings) -> Self {
        Self { client, settings }
    }

    pub fn boxed(client: Arc<dyn EsClient>, settings: SourceSettings) -> Box<dyn Source> {
        Box::new(Self::new(client, settings))
    }

    fn node_samples(&self, node_id: &str, node: &Value, samples: &mut Vec<MetricSample>) {
        let labels = [
            ("node", str_field(node, "name")),
            ("node_id", node_id),
            ("instance", str_field(node, "transport_address")),
        ];

        let role_metric = format!("{KEY}_role");
        if !self.settings.blocklist.is_blocked(&role_metric) {
            let roles: Vec<&str> = node
                .get("roles")
                .and_then(Value::as_array)
                .map(|roles| roles.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            for role in ROLES {
                samples.push(
                    MetricSample::new(
                        role_metric.clone(),
                        "node role",
                        if roles.contains(&role) { 1.0 } else { 0.0 },
                    )
                    .with_labels(labels)
                    .with_label("role", role),
                );
            }
        }

        for group in GROUPS {
            let Some(section) = node.get(group) else {
                continue;
            };
            // path names start at the group so `os.cpu` and `process.cpu` stay apart
            let prefix = match self.settings.name_style {
                NameStyle::Leaf => format!("{KEY}_"),
                NameStyle::Path => format!("{KEY}_{group}_"),
            };
            for metric in flatten_with_style(&prefix, section, group, self.settings.name_style) {
                if self.settings.blocklist.is_blocked(&metric.name) {
                    continue;
                }
                samples.push(
                    MetricSample::new(metric.name, metric.doc, metric.value).with_labels(labels),
                );
            }
        }
    }
}

fn str_field<'a>(node: &'a Value, field: &str) -> &'a str {
    node.get(field).and_then(Value::as_str).unwrap_or_default()
}

#[async_trait]
impl Source for Nodes {
    fn key(&self) -> &str {
        KEY
    }

    async fn fetch_raw(&self) -> Result<Value, FetchError> {
        self.client
            .nodes_stats(&self.settings.params, self.settings.timeout)
            .await
    }

    fn build_samples(&self, raw: &Value) -> Result<Vec<MetricSample>, FetchError> {
        let nodes = raw
            .get("nodes")
            .and_then(Value::as_object)
            .ok_or_else(|| FetchError::decode(Endpoint::NodesStats, "missing 'nodes' object"))?;

        let mut samples = Vec::new();
        for (node_id, node) in nodes {
            self.node_samples(node_id, node, &mut samples);
        }
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use serde_json::{Value, json};

    use super::Nodes;
    use crate::{
        blocklist::Blocklist,
        client::fake::FakeClient,
        collector::{Source, SourceSettings},
        flatten::NameStyle,
        runtime::conf::Conf,
        sample::{MetricSample, group},
    };

    fn response() -> Value {
        json!({
            "_nodes": {"total": 1, "successful": 1, "failed": 0},
            "cluster_name": "c1",
            "nodes": {
                "abc123": {
                    "timestamp": 1700000000000_i64,
                    "name": "node-1",
                    "transport_address": "10.0.0.1:9300",
                    "roles": ["data", "master"],
                    "jvm": {"timestamp": 1700000000000_i64, "mem": {"heap_used_in_bytes": 1024}, "uptime_in_millis": 5},
                    "os": {"cpu": {"percent": 7}},
                    "fs": {"data": [{"free_in_bytes": 50}]}
                }
            }
        })
    }

    fn source(blocklist: Blocklist, name_style: NameStyle) -> Nodes {
        Nodes::new(
            Arc::new(FakeClient::new()),
            SourceSettings {
                blocklist,
                name_style,
                ..SourceSettings::new(Duration::from_secs(10))
            },
        )
    }

    fn find<'a>(samples: &'a [MetricSample], name: &str) -> Vec<&'a MetricSample> {
        samples.iter().filter(|s| s.name == name).collect()
    }

    #[test]
    fn emits_role_flags_with_node_labels() {
        let samples = source(Blocklist::empty(), NameStyle::Leaf)
            .build_samples(&response())
            .unwrap();
        let roles = find(&samples, "es_node_role");
        assert_eq!(roles.len(), 4);

        let flag = |role: &str| {
            roles
                .iter()
                .find(|s| s.labels.iter().any(|(k, v)| k == "role" && v == role))
                .map(|s| s.value)
        };
        assert_eq!(flag("data"), Some(1.0));
        assert_eq!(flag("ingest"), Some(0.0));
        assert_eq!(flag("master"), Some(1.0));
        assert_eq!(flag("ml"), Some(0.0));

        let label_names: Vec<_> = roles[0].labels.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(label_names, vec!["node", "node_id", "instance", "role"]);
        assert_eq!(roles[0].labels[0].1, "node-1");
        assert_eq!(roles[0].labels[1].1, "abc123");
        assert_eq!(roles[0].labels[2].1, "10.0.0.1:9300");
    }

    #[test]
    fn flattens_known_groups_and_skips_missing_ones() {
        let samples = source(Blocklist::empty(), NameStyle::Leaf)
            .build_samples(&response())
            .unwrap();

        let heap = find(&samples, "es_node_heap_used_in_bytes");
        assert_eq!(heap.len(), 1);
        assert_eq!(heap[0].value, 1024.0);
        assert_eq!(heap[0].help, "jvm mem heap_used_in_bytes");
        assert_eq!(heap[0].labels.len(), 3);

        assert_eq!(find(&samples, "es_node_percent")[0].value, 7.0);
        assert_eq!(find(&samples, "es_node_free_in_bytes")[0].value, 50.0);
        assert!(find(&samples, "es_node_timestamp").is_empty());
    }

    #[test]
    fn blocklist_drops_prefixes() {
        let blocklist = Blocklist::new(["es_node_heap", "es_node_role"], Vec::<String>::new()).unwrap();
        let samples = source(blocklist, NameStyle::Leaf)
            .build_samples(&response())
            .unwrap();
        assert!(find(&samples, "es_node_heap_used_in_bytes").is_empty());
        assert!(find(&samples, "es_node_role").is_empty());
        assert!(!find(&samples, "es_node_uptime_in_millis").is_empty());
    }

    #[test]
    fn path_style_qualifies_names() {
        let samples = source(Blocklist::empty(), NameStyle::Path)
            .build_samples(&response())
            .unwrap();
        assert!(!find(&samples, "es_node_jvm_mem_heap_used_in_bytes").is_empty());
        assert!(!find(&samples, "es_node_os_cpu_percent").is_empty());
        assert!(!find(&samples, "es_node_fs_data_free_in_bytes").is_empty());
        assert!(find(&samples, "es_node_cpu_percent").is_empty());
    }

    #[test]
    fn path_style_keeps_equal_leaves_of_different_groups_apart() {
        let mut raw = response();
        raw["nodes"]["abc123"]["process"] = json!({"cpu": {"percent": 93}});

        let samples = source(Blocklist::empty(), NameStyle::Path)
            .build_samples(&raw)
            .unwrap();
        assert_eq!(find(&samples, "es_node_os_cpu_percent")[0].value, 7.0);
        assert_eq!(find(&samples, "es_node_process_cpu_percent")[0].value, 93.0);

        let families = group(samples);
        let os = families.iter().find(|f| f.name() == "es_node_os_cpu_percent").unwrap();
        assert_eq!(os.value(&["node-1", "abc123", "10.0.0.1:9300"]), Some(7.0));
        let process = families
            .iter()
            .find(|f| f.name() == "es_node_process_cpu_percent")
            .unwrap();
        assert_eq!(process.value(&["node-1", "abc123", "10.0.0.1:9300"]), Some(93.0));
    }

    #[test]
    fn example_config_blocklist_matches_node_series() {
        let conf: Conf =
            serde_yaml::from_str(include_str!("../../../config.example.yaml")).unwrap();
        let opts = conf.es_node.unwrap();
        let blocklist = Blocklist::new(&conf.global.blocklist, &opts.blocklist).unwrap();

        let mut raw = response();
        raw["nodes"]["abc123"]["jvm"]["buffer_pools"] = json!({"direct": {"count": 12}});
        let samples = source(blocklist, opts.name_style).build_samples(&raw).unwrap();

        assert!(find(&samples, "es_node_jvm_buffer_pools_direct_count").is_empty());
        assert!(!find(&samples, "es_node_jvm_mem_heap_used_in_bytes").is_empty());
    }

    #[test]
    fn samples_group_into_consistent_families() {
        let samples = source(Blocklist::empty(), NameStyle::Leaf)
            .build_samples(&response())
            .unwrap();
        let families = group(samples);
        let role = families.iter().find(|f| f.name() == "es_node_role").unwrap();
        assert_eq!(role.len(), 4);
        assert_eq!(role.value(&["node-1", "abc123", "10.0.0.1:9300", "master"]), Some(1.0));
    }

    #[test]
    fn missing_nodes_is_a_decode_error() {
        let err = source(Blocklist::empty(), NameStyle::Leaf)
            .build_samples(&json!({"cluster_name": "c1"}))
            .unwrap_err();
        assert!(err.to_string().contains("nodes.stats"));
    }
}
