use std::time::Duration;

use thiserror::Error;

use crate::client::Endpoint;

/// Failures of a single wire call. Collectors never propagate these; they
/// degrade to an `up` gauge of zero.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{endpoint} timed out after {timeout:?}")]
    Timeout { endpoint: Endpoint, timeout: Duration },

    #[error("{endpoint} transport error: {source}")]
    Transport {
        endpoint: Endpoint,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        endpoint: Endpoint,
        status: u16,
        body: String,
    },

    #[error("{endpoint} returned an unusable body: {message}")]
    Decode { endpoint: Endpoint, message: String },

    #[error("no cluster hosts configured")]
    NoHosts,
}

impl FetchError {
    pub fn decode(endpoint: Endpoint, message: impl Into<String>) -> Self {
        Self::Decode {
            endpoint,
            message: message.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout { .. })
    }
}
