use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{client::Params, flatten::NameStyle, interval::IntervalLiteral};

/// Defaults shared by every collector and query.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct GlobalOptions {
    /// Default refresh interval for queries, in seconds or as an interval expression.
    pub interval: IntervalLiteral,
    /// Default per-request timeout.
    pub timeout: IntervalLiteral,
    /// Default upper bound of the random delay added to each scheduled run.
    pub jitter: IntervalLiteral,
    /// Name-prefix patterns dropped from every collector's output.
    pub blocklist: Vec<String>,
}

impl Default for GlobalOptions {
    fn default() -> Self {
        Self {
            interval: IntervalLiteral::Seconds(60),
            timeout: IntervalLiteral::Seconds(10),
            jitter: IntervalLiteral::Seconds(0),
            blocklist: Vec::new(),
        }
    }
}

/// Per-collector section (`es_cluster`, `es_node`, `es_indices`).
///
/// Without `interval` the collector fetches on every scrape. With
/// `interval: disable` it is registered but never scheduled.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SourceOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<IntervalLiteral>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<IntervalLiteral>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jitter: Option<IntervalLiteral>,
    pub blocklist: Vec<String>,
    /// Request parameters forwarded to the wire client.
    pub params: Params,
    pub name_style: NameStyle,
}

/// One entry of the `metrics` list.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct QueryOptions {
    pub name: String,
    pub index: String,
    #[serde(alias = "body")]
    pub query_json: Value,
    /// Metric-name template; `{name}`, `{index}`, `{doc}`, `{interval}` and
    /// `{timeout}` are substituted, then every `*` is removed.
    pub metric: String,
    #[serde(default)]
    pub doc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<IntervalLiteral>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<IntervalLiteral>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jitter: Option<IntervalLiteral>,
    /// Drop families this query produced earlier but not in its latest run.
    #[serde(default)]
    pub evict_stale: bool,
}
