use std::path::PathBuf;

use clap::Parser;
use tracing::Level;

/// Command-line overrides. Every flag is optional so that an unset flag never
/// shadows the configuration file or the environment.
#[derive(Parser, Debug, Default)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Set the path to the configuration file (e.g., "config.yaml").
    #[arg(short, long, value_name = "FILE", env = "ES_EXPORTER_CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// Comma-separated cluster hosts (e.g., "http://es-1:9200,http://es-2:9200").
    #[arg(
        long = "es-cluster",
        value_name = "HOSTS",
        env = "ES_EXPORTER_ES_CLUSTER",
        value_delimiter = ','
    )]
    pub es_cluster: Option<Vec<String>>,

    /// Address the metrics server listens on.
    #[arg(long, value_name = "ADDRESS", env = "ES_EXPORTER_LISTEN_ADDRESS")]
    pub listen_address: Option<String>,

    /// Port the metrics server listens on.
    #[arg(long, value_name = "PORT", env = "ES_EXPORTER_LISTEN_PORT")]
    pub listen_port: Option<u16>,

    /// Set the application's log level (e.g., "debug", "warn").
    #[arg(short, long, value_name = "LEVEL", env = "ES_EXPORTER_LOG_LEVEL")]
    pub log_level: Option<Level>,

    /// Log level of the job scheduler.
    #[arg(long, value_name = "LEVEL", env = "ES_EXPORTER_SCHEDULER_LOG_LEVEL")]
    pub scheduler_log_level: Option<Level>,
}
