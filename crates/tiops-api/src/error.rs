use thiserror::Error;

/// Result type for API clients.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Errors raised by the control-plane HTTP clients.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Every configured endpoint failed; the message carries the last
    /// failure.
    #[error("all endpoints failed, last error on {endpoint}: {reason}")]
    AllEndpointsFailed {
        /// The endpoint tried last.
        endpoint: String,
        /// The last failure.
        reason: String,
    },

    /// The server answered with a non-success status.
    #[error("request to {url} failed with status {status}: {body}")]
    Status {
        /// The full request URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Response body, may be empty.
        body: String,
    },

    /// The response body did not match the expected shape.
    #[error("malformed response from {url}: {reason}")]
    Payload {
        /// The full request URL.
        url: String,
        /// What went wrong while decoding.
        reason: String,
    },

    /// No PD leader is currently elected.
    #[error("cluster has no PD leader")]
    NoLeader,

    /// No store registered under the given address.
    #[error("no store found with address {0}")]
    StoreNotFound(String),

    /// TLS material could not be loaded.
    #[error("failed to load TLS configuration: {0}")]
    Tls(String),

    /// Error from the underlying HTTP stack.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ApiError {
    /// Creates a payload error.
    pub fn payload(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Payload {
            url: url.into(),
            reason: reason.into(),
        }
    }
}
