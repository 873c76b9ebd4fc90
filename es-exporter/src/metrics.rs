//! HTTP exposition of collected metrics and the exporter's own telemetry.

pub mod error;
pub mod internal;
pub mod opts;
pub mod server;
