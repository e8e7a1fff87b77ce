use std::time::Duration;

use reqwest::{Client, Response};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::InspectorConfig;

const POOL_MAX_IDLE_PER_HOST: usize = 1024;
const KEEP_ALIVE_SECS: u64 = 30;
const CONNECT_TIMEOUT_SECS: u64 = 30;
const REDIRECT_LIMIT: usize = 10;

/// HTTP client for the fetch stage.
///
/// Wraps a pooled reqwest client and carries the retry settings so fetch
/// tasks only need the URL and a cancellation token.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    retry_attempts: u8,
    retry_delay: Duration,
}

impl HttpClient {
    pub fn new(cfg: &InspectorConfig) -> Result<Self, FetchError> {
        let redirect_policy = if cfg.do_not_follow_redirects {
            reqwest::redirect::Policy::none()
        } else {
            reqwest::redirect::Policy::limited(REDIRECT_LIMIT)
        };

        let client = Client::builder()
            .user_agent(format!("links/{}", env!("CARGO_PKG_VERSION")))
            .timeout(cfg.request_timeout)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .tcp_keepalive(Duration::from_secs(KEEP_ALIVE_SECS))
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .http2_adaptive_window(true)
            .redirect(redirect_policy)
            .build()
            .map_err(|e| FetchError::ClientBuild(e.to_string()))?;

        Ok(Self {
            client,
            retry_attempts: cfg.retry_attempts,
            retry_delay: cfg.retry_delay,
        })
    }

    /// GET with retry on connection-reset-by-peer.
    ///
    /// `retryAttempts` is the maximum number of attempts; zero behaves as a
    /// single attempt. Only reset-by-peer failures are retried, spaced by
    /// `retryDelay`; any other error surfaces immediately. Cancellation
    /// aborts both the in-flight request and the back-off wait.
    pub async fn fetch(
        &self,
        url: &Url,
        cancel: &CancellationToken,
    ) -> Result<Response, FetchError> {
        let max_attempts = self.retry_attempts.max(1);
        let mut attempt: u8 = 0;

        loop {
            match self.get(url, cancel).await {
                Ok(response) => return Ok(response),
                Err(FetchError::ConnectionReset) if attempt + 1 < max_attempts => {
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(FetchError::ConnectionReset),
                        _ = tokio::time::sleep(self.retry_delay) => attempt += 1,
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Single GET attempt; the token aborts the request in flight.
    async fn get(&self, url: &Url, cancel: &CancellationToken) -> Result<Response, FetchError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            result = self.client.get(url.clone()).send() => {
                result.map_err(FetchError::from_reqwest_error)
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("connection reset by peer")]
    ConnectionReset,

    #[error("request timeout")]
    Timeout,

    #[error("request cancelled")]
    Cancelled,

    #[error("network error: {0}")]
    Network(String),

    #[error("failed to build http client: {0}")]
    ClientBuild(String),
}

impl FetchError {
    fn from_reqwest_error(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            return FetchError::Timeout;
        }

        if is_connection_reset(&error) {
            return FetchError::ConnectionReset;
        }

        FetchError::Network(error.to_string())
    }
}

/// Walk the error source chain looking for ECONNRESET. Transport crates wrap
/// the io error at varying depths, so a message check backs up the kind check.
pub(crate) fn is_connection_reset(error: &(dyn std::error::Error + 'static)) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(error);
    while let Some(e) = source {
        if let Some(io_error) = e.downcast_ref::<std::io::Error>() {
            if io_error.kind() == std::io::ErrorKind::ConnectionReset {
                return true;
            }
        }
        source = e.source();
    }

    error.to_string().to_lowercase().contains("connection reset")
}
