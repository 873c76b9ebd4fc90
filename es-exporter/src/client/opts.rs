use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClusterOptions {
    /// Cluster hosts, tried in order. A missing scheme defaults to `http://`.
    pub hosts: Vec<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Verify TLS certificates presented by the cluster.
    pub verify_certs: bool,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            hosts: vec!["http://127.0.0.1:9200".to_string()],
            username: None,
            password: None,
            verify_certs: false,
        }
    }
}
