use std::time::Duration;

/// Failures that stop a whole run or a whole subject pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("failed to launch browser session")]
    LaunchFailure(#[source] anyhow::Error),
    #[error("index page for {subject} did not load within {}s", .timeout.as_secs())]
    NavigationTimeout { subject: String, timeout: Duration },
    #[error("browser error while resolving {subject}")]
    Browser {
        subject: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Why a single detail-page GET failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("server answered with HTTP {0}")]
    Status(u16),
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("failed to read response body: {0}")]
    Body(String),
    #[error("could not resolve link {0}")]
    InvalidUrl(String),
    #[error("request failed: {0}")]
    Other(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_connect() || err.is_request() {
            FetchError::Connect(err.to_string())
        } else if let Some(status) = err.status() {
            FetchError::Status(status.as_u16())
        } else if err.is_body() || err.is_decode() {
            FetchError::Body(err.to_string())
        } else {
            FetchError::Other(err.to_string())
        }
    }
}
