use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use tracing::{debug, warn};

use crate::client::{ApiRequest, EsClient, FetchError, opts::ClusterOptions};

/// `reqwest`-backed client over one or more cluster hosts.
///
/// Hosts are tried in order until one answers. Only connection-level failures
/// move on to the next host; a timeout or an HTTP error status is final.
#[derive(Clone, Debug)]
pub struct HttpClient {
    http: Client,
    hosts: Vec<String>,
    username: Option<String>,
    password: Option<String>,
}

impl HttpClient {
    pub fn new(opts: &ClusterOptions) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .danger_accept_invalid_certs(!opts.verify_certs)
            .build()?;

        Ok(Self {
            http,
            hosts: opts
                .hosts
                .iter()
                .map(|h| normalize_host(h))
                .filter(|h| !h.is_empty())
                .collect(),
            username: opts.username.clone(),
            password: opts.password.clone(),
        })
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    fn build(&self, host: &str, request: &ApiRequest, timeout: Duration) -> RequestBuilder {
        let url = format!("{host}{}", request.path);
        let mut builder = match &request.body {
            Some(body) => self.http.post(url).json(body),
            None => self.http.get(url),
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(username) = &self.username {
            builder = builder.basic_auth(username, self.password.as_ref());
        }
        builder.timeout(timeout)
    }
}

fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.is_empty() || host.contains("://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}

#[async_trait]
impl EsClient for HttpClient {
    async fn execute(&self, request: &ApiRequest, timeout: Duration) -> Result<Value, FetchError> {
        let endpoint = request.endpoint;
        let mut last_error = None;

        for host in &self.hosts {
            debug!(
                event.name = "client.request",
                es.endpoint = %endpoint,
                server.address = %host,
                url.path = %request.path,
                "sending request"
            );

            let response = match self.build(host, request, timeout).send().await {
                Ok(response) => response,
                Err(e) if e.is_timeout() => return Err(FetchError::Timeout { endpoint, timeout }),
                Err(e) => {
                    warn!(
                        event.name = "client.host_failed",
                        es.endpoint = %endpoint,
                        server.address = %host,
                        error.message = %e,
                        "request failed, trying next host"
                    );
                    last_error = Some(FetchError::Transport {
                        endpoint,
                        source: e,
                    });
                    continue;
                }
            };

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(FetchError::Status {
                    endpoint,
                    status: status.as_u16(),
                    body,
                });
            }

            return match response.json::<Value>().await {
                Ok(body) => Ok(body),
                Err(e) if e.is_timeout() => Err(FetchError::Timeout { endpoint, timeout }),
                Err(e) => Err(FetchError::decode(endpoint, e.to_string())),
            };
        }

        Err(last_error.unwrap_or(FetchError::NoHosts))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{HttpClient, normalize_host};
    use crate::client::{EsClient, FetchError, Params, opts::ClusterOptions};

    #[test]
    fn normalizes_hosts() {
        assert_eq!(normalize_host("localhost:9200"), "http://localhost:9200");
        assert_eq!(normalize_host("https://es:9200/"), "https://es:9200");
        assert_eq!(normalize_host("  "), "");
    }

    #[test]
    fn drops_blank_hosts() {
        let client = HttpClient::new(&ClusterOptions {
            hosts: vec!["es1:9200".into(), "".into(), "http://es2:9200".into()],
            ..ClusterOptions::default()
        })
        .unwrap();
        assert_eq!(client.hosts(), ["http://es1:9200", "http://es2:9200"]);
    }

    #[tokio::test]
    async fn no_hosts_is_an_error() {
        let client = HttpClient::new(&ClusterOptions {
            hosts: Vec::new(),
            ..ClusterOptions::default()
        })
        .unwrap();
        let err = client
            .cluster_health(&Params::new(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::NoHosts));
    }
}
