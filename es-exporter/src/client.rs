//! Wire client for the cluster's stats and search APIs.
//!
//! Collectors talk to the cluster through [`EsClient`]. Every call carries a
//! per-request timeout and resolves to the decoded JSON body or a
//! [`FetchError`]. Request parameters from configuration are forwarded as
//! query-string entries, except for the few that address a path segment.

mod error;
#[cfg(test)]
pub(crate) mod fake;
mod http;
pub mod opts;

use std::{collections::BTreeMap, fmt, time::Duration};

use async_trait::async_trait;
use serde_json::Value;

pub use error::FetchError;
pub use http::HttpClient;

/// Free-form request parameters as written under a source's `params` key.
pub type Params = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    ClusterHealth,
    NodesStats,
    IndicesStats,
    Search,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::ClusterHealth => "cluster.health",
            Endpoint::NodesStats => "nodes.stats",
            Endpoint::IndicesStats => "indices.stats",
            Endpoint::Search => "search",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub endpoint: Endpoint,
    pub path: String,
    pub query: Vec<(String, String)>,
    /// Present only for search requests, which are sent as `POST`.
    pub body: Option<Value>,
}

impl ApiRequest {
    /// `GET /_cluster/health[/{index}]`
    pub fn cluster_health(params: &Params) -> Self {
        let mut query = QueryParams::new(params);
        let index = query.lift("index");
        let path = match index {
            Some(index) => format!("/_cluster/health/{index}"),
            None => "/_cluster/health".to_string(),
        };
        Self::get(Endpoint::ClusterHealth, path, query)
    }

    /// `GET /_nodes[/{node_id}]/stats[/{metric}[/{index_metric}]]`
    ///
    /// `index_metric` is only meaningful when `metric` selects the indices
    /// section; otherwise it is dropped.
    pub fn nodes_stats(params: &Params) -> Self {
        let mut query = QueryParams::new(params);
        let node_id = query.lift("node_id");
        let metric = query.lift("metric");
        let index_metric = query.lift("index_metric");

        let mut path = String::from("/_nodes");
        if let Some(node_id) = node_id {
            path.push('/');
            path.push_str(&node_id);
        }
        path.push_str("/stats");
        if let Some(metric) = metric {
            let selects_indices = metric == "indices" || metric == "_all";
            path.push('/');
            path.push_str(&metric);
            if let (true, Some(index_metric)) = (selects_indices, index_metric) {
                path.push('/');
                path.push_str(&index_metric);
            }
        }
        Self::get(Endpoint::NodesStats, path, query)
    }

    /// `GET /[{index}/]_stats[/{metric}]`
    pub fn indices_stats(params: &Params) -> Self {
        let mut query = QueryParams::new(params);
        let index = query.lift("index");
        let metric = query.lift("metric");

        let mut path = String::new();
        if let Some(index) = index {
            path.push('/');
            path.push_str(&index);
        }
        path.push_str("/_stats");
        if let Some(metric) = metric {
            path.push('/');
            path.push_str(&metric);
        }
        Self::get(Endpoint::IndicesStats, path, query)
    }

    /// `POST /{index}/_search`
    pub fn search(index: &str, body: &Value) -> Self {
        let index = index.trim_matches('/');
        let path = if index.is_empty() {
            "/_search".to_string()
        } else {
            format!("/{index}/_search")
        };
        Self {
            endpoint: Endpoint::Search,
            path,
            query: Vec::new(),
            body: Some(body.clone()),
        }
    }

    fn get(endpoint: Endpoint, path: String, query: QueryParams) -> Self {
        Self {
            endpoint,
            path,
            query: query.into_pairs(),
            body: None,
        }
    }
}

struct QueryParams(BTreeMap<String, String>);

impl QueryParams {
    fn new(params: &Params) -> Self {
        Self(
            params
                .iter()
                .filter_map(|(k, v)| param_value(v).map(|v| (k.clone(), v)))
                .collect(),
        )
    }

    /// Removes `name` from the query string so it can address a path segment.
    fn lift(&mut self, name: &str) -> Option<String> {
        self.0.remove(name).filter(|v| !v.is_empty())
    }

    fn into_pairs(self) -> Vec<(String, String)> {
        self.0.into_iter().collect()
    }
}

/// Stringifies a parameter value the way the cluster expects it: lists are
/// comma-joined, `null` omits the parameter.
fn param_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(param_value)
                .collect::<Vec<_>>()
                .join(","),
        ),
        Value::Object(_) => Some(value.to_string()),
    }
}

#[async_trait]
pub trait EsClient: Send + Sync {
    /// Sends `request` and decodes the JSON response body.
    async fn execute(&self, request: &ApiRequest, timeout: Duration) -> Result<Value, FetchError>;

    async fn cluster_health(&self, params: &Params, timeout: Duration) -> Result<Value, FetchError> {
        self.execute(&ApiRequest::cluster_health(params), timeout)
            .await
    }

    async fn nodes_stats(&self, params: &Params, timeout: Duration) -> Result<Value, FetchError> {
        self.execute(&ApiRequest::nodes_stats(params), timeout).await
    }

    async fn indices_stats(&self, params: &Params, timeout: Duration) -> Result<Value, FetchError> {
        self.execute(&ApiRequest::indices_stats(params), timeout)
            .await
    }

    async fn search(
        &self,
        index: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<Value, FetchError> {
        self.execute(&ApiRequest::search(index, body), timeout)
            .await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ApiRequest, Endpoint, Params};

    fn params(value: serde_json::Value) -> Params {
        serde_json::from_value(value).unwrap()
    }

    fn query(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn cluster_health_forwards_params() {
        let request = ApiRequest::cluster_health(&params(json!({"level": "cluster", "local": true})));
        assert_eq!(request.endpoint, Endpoint::ClusterHealth);
        assert_eq!(request.path, "/_cluster/health");
        assert_eq!(request.query, query(&[("level", "cluster"), ("local", "true")]));
        assert!(request.body.is_none());
    }

    #[test]
    fn nodes_stats_lifts_path_parameters() {
        let request = ApiRequest::nodes_stats(&params(json!({
            "node_id": "_local",
            "metric": "indices",
            "index_metric": ["docs", "store"],
            "level": "node"
        })));
        assert_eq!(request.path, "/_nodes/_local/stats/indices/docs,store");
        assert_eq!(request.query, query(&[("level", "node")]));
    }

    #[test]
    fn nodes_stats_ignores_index_metric_for_other_metrics() {
        let request = ApiRequest::nodes_stats(&params(json!({
            "metric": ["jvm", "os"],
            "index_metric": "docs"
        })));
        assert_eq!(request.path, "/_nodes/stats/jvm,os");
        assert!(request.query.is_empty());

        let request = ApiRequest::nodes_stats(&Params::new());
        assert_eq!(request.path, "/_nodes/stats");
    }

    #[test]
    fn indices_stats_lifts_index_and_metric() {
        let request = ApiRequest::indices_stats(&params(json!({
            "index": "logs-*",
            "metric": "docs",
            "expand_wildcards": "open"
        })));
        assert_eq!(request.path, "/logs-*/_stats/docs");
        assert_eq!(request.query, query(&[("expand_wildcards", "open")]));

        assert_eq!(ApiRequest::indices_stats(&Params::new()).path, "/_stats");
    }

    #[test]
    fn search_posts_the_body() {
        let body = json!({"size": 0});
        let request = ApiRequest::search("logs-*", &body);
        assert_eq!(request.endpoint, Endpoint::Search);
        assert_eq!(request.path, "/logs-*/_search");
        assert_eq!(request.body, Some(body.clone()));
        assert_eq!(ApiRequest::search("", &body).path, "/_search");
    }

    #[test]
    fn null_params_are_omitted() {
        let request = ApiRequest::cluster_health(&params(json!({"level": null})));
        assert!(request.query.is_empty());
    }
}
