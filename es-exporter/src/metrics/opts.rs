use std::{net::Ipv4Addr, time::Duration};

use serde::{Deserialize, Serialize};

use crate::runtime::conf::conf_serde::duration;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerOptions {
    /// The network address the metrics server will listen on.
    pub listen_address: String,
    /// The port the metrics server will listen on.
    pub port: u16,
    /// How long scheduled jobs get to finish their current run on shutdown.
    #[serde(with = "duration")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            listen_address: Ipv4Addr::UNSPECIFIED.to_string(),
            port: 9206,
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl ServerOptions {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.listen_address, self.port)
    }
}
