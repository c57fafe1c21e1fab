//! Shared endpoint-failover HTTP plumbing.

use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{ApiError, Result};

/// Optional TLS material for talking to a TLS-enabled cluster.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the CA certificate (PEM).
    pub ca_file: String,
    /// Path to the client certificate (PEM).
    pub cert_file: String,
    /// Path to the client private key (PEM).
    pub key_file: String,
}

/// A blocking HTTP client bound to an ordered endpoint list.
///
/// Endpoints are bare `host:port` pairs; the scheme is derived from
/// whether TLS material was supplied. Each request walks the endpoint
/// list in order and returns the first success.
pub struct HttpClient {
    endpoints: Vec<String>,
    scheme: &'static str,
    inner: reqwest::blocking::Client,
}

impl HttpClient {
    /// Builds a client over `endpoints` with a per-call timeout.
    pub fn new(
        endpoints: Vec<String>,
        timeout: Duration,
        tls: Option<&TlsConfig>,
    ) -> Result<Self> {
        let mut builder = reqwest::blocking::Client::builder().timeout(timeout);
        let scheme = if let Some(tls) = tls {
            let ca = std::fs::read(&tls.ca_file)
                .map_err(|e| ApiError::Tls(format!("{}: {}", tls.ca_file, e)))?;
            let cert = std::fs::read(&tls.cert_file)
                .map_err(|e| ApiError::Tls(format!("{}: {}", tls.cert_file, e)))?;
            let key = std::fs::read(&tls.key_file)
                .map_err(|e| ApiError::Tls(format!("{}: {}", tls.key_file, e)))?;
            let mut identity = cert;
            identity.extend_from_slice(&key);
            builder = builder
                .add_root_certificate(
                    reqwest::Certificate::from_pem(&ca)
                        .map_err(|e| ApiError::Tls(e.to_string()))?,
                )
                .identity(
                    reqwest::Identity::from_pem(&identity)
                        .map_err(|e| ApiError::Tls(e.to_string()))?,
                );
            "https"
        } else {
            "http"
        };

        Ok(Self {
            endpoints,
            scheme,
            inner: builder.build()?,
        })
    }

    /// The ordered endpoint list this client walks.
    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    fn url(&self, endpoint: &str, path: &str) -> String {
        format!("{}://{}/{}", self.scheme, endpoint, path)
    }

    /// Runs `f` against each endpoint in order until one succeeds.
    fn try_endpoints<T>(
        &self,
        path: &str,
        f: impl Fn(&str) -> Result<T>,
    ) -> Result<T> {
        let mut last: Option<(String, String)> = None;
        for endpoint in &self.endpoints {
            let url = self.url(endpoint, path);
            match f(&url) {
                Ok(v) => return Ok(v),
                Err(e) => {
                    warn!(url = %url, error = %e, "Endpoint failed, trying next");
                    last = Some((endpoint.clone(), e.to_string()));
                }
            }
        }
        let (endpoint, reason) = last.unwrap_or_else(|| {
            ("<none>".to_string(), "no endpoints configured".to_string())
        });
        Err(ApiError::AllEndpointsFailed { endpoint, reason })
    }

    fn check_status(url: &str, resp: reqwest::blocking::Response) -> Result<String> {
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        if !status.is_success() {
            return Err(ApiError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    /// GET a JSON document.
    pub fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.try_endpoints(path, |url| {
            debug!(url = %url, "GET");
            let body = Self::check_status(url, self.inner.get(url).send()?)?;
            serde_json::from_str(&body).map_err(|e| ApiError::payload(url, e.to_string()))
        })
    }

    /// POST a JSON body, discarding the response.
    pub fn post_json(&self, path: &str, body: &serde_json::Value) -> Result<()> {
        self.try_endpoints(path, |url| {
            debug!(url = %url, "POST");
            Self::check_status(url, self.inner.post(url).json(body).send()?)?;
            Ok(())
        })
    }

    /// POST with an empty body, discarding the response.
    pub fn post_empty(&self, path: &str) -> Result<()> {
        self.try_endpoints(path, |url| {
            debug!(url = %url, "POST");
            Self::check_status(url, self.inner.post(url).send()?)?;
            Ok(())
        })
    }

    /// DELETE a resource, discarding the response.
    pub fn delete(&self, path: &str) -> Result<()> {
        self.try_endpoints(path, |url| {
            debug!(url = %url, "DELETE");
            Self::check_status(url, self.inner.delete(url).send()?)?;
            Ok(())
        })
    }

    /// GET returning the raw body, for probes that only care about
    /// reachability.
    pub fn get_text(&self, path: &str) -> Result<String> {
        self.try_endpoints(path, |url| {
            Self::check_status(url, self.inner.get(url).send()?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_scheme_without_tls() {
        let client =
            HttpClient::new(vec!["10.0.0.1:2379".to_string()], Duration::from_secs(2), None)
                .unwrap();
        assert_eq!(client.url("10.0.0.1:2379", "pd/health"), "http://10.0.0.1:2379/pd/health");
    }

    #[test]
    fn test_all_endpoints_failed_names_last() {
        let client = HttpClient::new(
            vec!["127.0.0.1:1".to_string(), "127.0.0.1:2".to_string()],
            Duration::from_millis(200),
            None,
        )
        .unwrap();
        let err = client.get_text("status").unwrap_err();
        match err {
            ApiError::AllEndpointsFailed { endpoint, .. } => {
                assert_eq!(endpoint, "127.0.0.1:2");
            }
            other => panic!("unexpected error variant: {other}"),
        }
    }
}
