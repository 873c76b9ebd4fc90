//! Prometheus exporter for Elasticsearch.
//!
//! Cluster health, node, index and search statistics are fetched over HTTP,
//! flattened into gauge families and served in the Prometheus text format.
//! Each collector either fetches on every scrape or is refreshed by a
//! scheduled job whose latest snapshot the scrape reads.

pub mod aggregation;
pub mod blocklist;
pub mod client;
pub mod collector;
pub mod flatten;
pub mod interval;
pub mod metrics;
pub mod registry;
pub mod runtime;
pub mod sample;
pub mod scheduler;
