pub mod eia;
pub mod endpoints;
pub mod open_meteo;

use polars::prelude::PolarsError;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::config::HttpConfig;

pub use eia::{EiaClient, EnergyQuery};
pub use open_meteo::{OpenMeteoClient, WeatherQuery};

/// Longest error body kept in a `FetchError::Status`
const MAX_ERROR_BODY: usize = 500;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{api} request failed")]
    Transport {
        api: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{api} returned HTTP {status}: {body}")]
    Status {
        api: &'static str,
        status: StatusCode,
        body: String,
    },
    #[error("failed to decode {api} response")]
    Decode {
        api: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("{api} error: {reason}")]
    Payload { api: &'static str, reason: String },
    #[error("failed to tabulate {api} response")]
    Frame {
        api: &'static str,
        #[source]
        source: PolarsError,
    },
    #[error("EIA API key is missing (set EIA_API_KEY or eia.api_key in the config file)")]
    MissingApiKey,
}

/// Bounded retry for transport-level failures. Status errors are never retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self { max_retries: 0, base_backoff: Duration::ZERO }
    }

    /// Delay before retry number `attempt` (0-based): base * 2^attempt
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff.saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl From<&HttpConfig> for RetryPolicy {
    fn from(cfg: &HttpConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            base_backoff: Duration::from_millis(cfg.retry_backoff_ms),
        }
    }
}

/// Shared HTTP client for both providers
pub fn http_client(cfg: &HttpConfig) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(cfg.user_agent.as_str())
        .timeout(Duration::from_secs(cfg.timeout_secs))
        .build()
}

fn is_transient(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

/// Send a request, retrying transport failures per `retry`.
pub(crate) async fn send_with_retry(
    api: &'static str,
    request: RequestBuilder,
    retry: &RetryPolicy,
) -> Result<Response, FetchError> {
    let mut attempt = 0;
    loop {
        let Some(req) = request.try_clone() else {
            return request
                .send()
                .await
                .map_err(|source| FetchError::Transport { api, source });
        };

        match req.send().await {
            Ok(resp) => return Ok(resp),
            Err(e) if attempt < retry.max_retries && is_transient(&e) => {
                let delay = retry.backoff(attempt);
                warn!(
                    "{} request failed (attempt {}/{}): {}; retrying in {:?}",
                    api,
                    attempt + 1,
                    retry.max_retries + 1,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(source) => return Err(FetchError::Transport { api, source }),
        }
    }
}

/// Read the status and full body of a response.
pub(crate) async fn read_body(api: &'static str, resp: Response) -> Result<(StatusCode, String), FetchError> {
    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|source| FetchError::Transport { api, source })?;
    Ok((status, body))
}

pub(crate) fn status_error(api: &'static str, status: StatusCode, body: &str) -> FetchError {
    FetchError::Status {
        api,
        status,
        body: body.chars().take(MAX_ERROR_BODY).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let retry = RetryPolicy { max_retries: 3, base_backoff: Duration::from_millis(500) };
        assert_eq!(retry.backoff(0), Duration::from_millis(500));
        assert_eq!(retry.backoff(1), Duration::from_millis(1000));
        assert_eq!(retry.backoff(2), Duration::from_millis(2000));
        assert_eq!(RetryPolicy::none().backoff(5), Duration::ZERO);
    }

    #[test]
    fn test_retry_policy_from_config() {
        let retry = RetryPolicy::from(&HttpConfig::default());
        assert_eq!(retry.max_retries, 2);
        assert_eq!(retry.base_backoff, Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_connection_refused_is_retried_then_reported() {
        // bind then release a port so nothing is listening on it
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let retry = RetryPolicy { max_retries: 2, base_backoff: Duration::from_millis(20) };
        let request = Client::new().get(format!("http://127.0.0.1:{port}/"));

        let started = std::time::Instant::now();
        let err = send_with_retry("EIA", request, &retry).await.unwrap_err();
        match err {
            FetchError::Transport { api, source } => {
                assert_eq!(api, "EIA");
                assert!(source.is_connect());
            }
            other => panic!("expected transport error, got {other:?}"),
        }
        // two backoffs: 20ms then 40ms
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn test_no_retries_fails_on_first_attempt() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let request = Client::new().get(format!("http://127.0.0.1:{port}/"));
        let err = send_with_retry("Open-Meteo", request, &RetryPolicy::none()).await.unwrap_err();
        assert!(matches!(err, FetchError::Transport { api: "Open-Meteo", .. }));
    }

    #[test]
    fn test_status_error_truncates_body() {
        let body = "x".repeat(2000);
        match status_error("EIA", StatusCode::BAD_GATEWAY, &body) {
            FetchError::Status { status, body, .. } => {
                assert_eq!(status, StatusCode::BAD_GATEWAY);
                assert_eq!(body.len(), MAX_ERROR_BODY);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
