use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::Level;

use crate::{
    client::opts::ClusterOptions,
    collector::{
        cluster_health, indices, nodes,
        opts::{GlobalOptions, QueryOptions, SourceOptions},
    },
    metrics::opts::ServerOptions,
    runtime::{cli::Cli, conf::conf_serde::level},
};

pub mod conf_serde;

/// Configuration file picked up when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Prefix of environment variables layered over the configuration file.
/// Nested keys are separated by `__` (e.g. `ES_EXPORTER_SERVER__PORT`).
pub const ENV_PREFIX: &str = "ES_EXPORTER_";

/// Environment keys owned by the CLI, which maps them onto nested fields.
const CLI_ENV_KEYS: [&str; 4] = ["config_path", "es_cluster", "listen_address", "listen_port"];

/// Application configuration.
///
/// A collector section (`es_cluster`, `es_node`, `es_indices`) that is absent
/// leaves that collector unregistered. An empty section (`es_node: {}`)
/// registers it with the defaults, fetching on every scrape.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Conf {
    /// Path of the configuration file this instance was loaded from.
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    #[serde(with = "level")]
    pub log_level: Level,

    /// Log level applied to the job scheduler only.
    #[serde(with = "level")]
    pub scheduler_log_level: Level,

    /// Cluster connection.
    pub cluster: ClusterOptions,

    /// Metrics server.
    pub server: ServerOptions,

    /// Defaults shared by every collector and query.
    pub global: GlobalOptions,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub es_cluster: Option<SourceOptions>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub es_node: Option<SourceOptions>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub es_indices: Option<SourceOptions>,

    /// Search-backed metrics.
    pub metrics: Vec<QueryOptions>,
}

impl Default for Conf {
    fn default() -> Self {
        Self {
            config_path: None,
            log_level: Level::INFO,
            scheduler_log_level: Level::WARN,
            cluster: ClusterOptions::default(),
            server: ServerOptions::default(),
            global: GlobalOptions::default(),
            es_cluster: None,
            es_node: None,
            es_indices: None,
            metrics: Vec::new(),
        }
    }
}

impl Conf {
    /// Builds the configuration from defaults, the YAML file, `ES_EXPORTER_`
    /// environment variables and finally the CLI flags, each layer overriding
    /// the previous one.
    ///
    /// The file is `cli.config` when given, otherwise `./config.yaml` if it
    /// exists. Running without any file is allowed.
    pub fn new(cli: Cli) -> Result<(Self, Cli), ConfError> {
        let mut figment = Figment::new().merge(Serialized::defaults(Conf::default()));

        let config_path = match &cli.config {
            Some(path) => {
                validate_config_path(path)?;
                Some(path.clone())
            }
            None => Some(PathBuf::from(DEFAULT_CONFIG_PATH)).filter(|p| p.is_file()),
        };
        if let Some(path) = &config_path {
            figment = figment.merge(Yaml::file(path));
        }

        figment = figment.merge(
            Env::prefixed(ENV_PREFIX)
                .ignore(&CLI_ENV_KEYS)
                .split("__"),
        );
        figment = merge_cli(figment, &cli);

        let mut conf: Conf = figment.extract()?;
        conf.config_path = config_path;
        Ok((conf, cli))
    }

    /// The section configuring the collector registered under `key`.
    pub fn source(&self, key: &str) -> Option<&SourceOptions> {
        match key {
            cluster_health::KEY => self.es_cluster.as_ref(),
            nodes::KEY => self.es_node.as_ref(),
            indices::KEY => self.es_indices.as_ref(),
            _ => None,
        }
    }
}

fn merge_cli(mut figment: Figment, cli: &Cli) -> Figment {
    if let Some(hosts) = &cli.es_cluster {
        figment = figment.merge(Serialized::default("cluster.hosts", hosts));
    }
    if let Some(address) = &cli.listen_address {
        figment = figment.merge(Serialized::default("server.listen_address", address));
    }
    if let Some(port) = cli.listen_port {
        figment = figment.merge(Serialized::default("server.port", port));
    }
    if let Some(level) = cli.log_level {
        figment = figment.merge(Serialized::default("log_level", level.as_str()));
    }
    if let Some(level) = cli.scheduler_log_level {
        figment = figment.merge(Serialized::default("scheduler_log_level", level.as_str()));
    }
    figment
}

/// Validates that the given path points to an existing file with a supported extension.
///
/// # Errors
///
/// * `ConfError::NoConfigFile` - If the path does not exist.
/// * `ConfError::InvalidConfigPath` - If the path points to a directory.
/// * `ConfError::InvalidExtension` - If the file extension is not `yaml` or `yml`.
fn validate_config_path(path: &Path) -> Result<(), ConfError> {
    if !path.is_file() {
        if path.exists() {
            return Err(ConfError::InvalidConfigPath(
                path.to_string_lossy().into_owned(),
            ));
        }
        return Err(ConfError::NoConfigFile(path.to_string_lossy().into_owned()));
    }

    match path.extension().and_then(|s| s.to_str()) {
        Some("yaml") | Some("yml") => Ok(()),
        Some(ext) => Err(ConfError::InvalidExtension(ext.to_string())),
        None => Err(ConfError::InvalidExtension("none".to_string())),
    }
}

#[derive(Debug, Error)]
pub enum ConfError {
    #[error("config file '{0}' does not exist")]
    NoConfigFile(String),

    #[error("path '{0}' is not a valid file")]
    InvalidConfigPath(String),

    #[error("invalid file extension '.{0}', expected 'yaml' or 'yml'")]
    InvalidExtension(String),

    #[error("configuration error: {0}")]
    Extraction(#[source] Box<figment::Error>),
}

impl From<figment::Error> for ConfError {
    fn from(e: figment::Error) -> Self {
        ConfError::Extraction(Box::new(e))
    }
}
