// Retrying HTTP fetcher for the vPIC XML endpoints.
// A request is attempted up to a bounded number of times; every failed attempt
// is logged and the caller only sees the final outcome.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const FETCH_RETRY_ENV: &str = "FETCH_WITH_RETRY_TIMES";
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

// Failure of a single request
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("HTTP error: {status_code} - {message}")]
    Status { status_code: u16, message: String },
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Failed to fetch after {attempts} attempts")]
    Exhausted {
        attempts: u32,
        #[source]
        last_error: TransportError,
    },

    #[error("Response body is not valid UTF-8: {0}")]
    InvalidBody(String),

    #[error("Client error: {0}")]
    Client(String),
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: 200,
            max_backoff_ms: 5000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

// Attempt count from a raw setting; unset, non-numeric or zero means the default
pub fn parse_max_attempts(raw: Option<&str>) -> u32 {
    raw.and_then(|value| value.trim().parse::<u32>().ok())
        .filter(|attempts| *attempts > 0)
        .unwrap_or(DEFAULT_MAX_ATTEMPTS)
}

pub fn default_max_attempts() -> u32 {
    parse_max_attempts(std::env::var(FETCH_RETRY_ENV).ok().as_deref())
}

// Exponential backoff with jitter; zero when backoff is disabled
pub fn calculate_backoff(retry_attempt: u32, config: &RetryConfig) -> Duration {
    if config.initial_backoff_ms == 0 {
        return Duration::ZERO;
    }

    let base_backoff_ms = (config.initial_backoff_ms as f64
        * config.backoff_multiplier.powf(retry_attempt as f64))
    .min(config.max_backoff_ms as f64);

    let jitter = rand::random::<f64>() * config.jitter_factor * base_backoff_ms;
    let backoff_ms = base_backoff_ms * (1.0 - config.jitter_factor / 2.0) + jitter;

    Duration::from_millis(backoff_ms as u64)
}

#[async_trait]
pub trait HttpTransport: Send + Sync + 'static {
    async fn get(&self, url: &str) -> Result<Bytes, TransportError>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("vehicle_sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str) -> Result<Bytes, TransportError> {
        let to_transport_error = |e: reqwest::Error| {
            if e.is_timeout() {
                TransportError::Timeout(self.timeout.as_millis() as u64)
            } else {
                TransportError::Network(e.to_string())
            }
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(to_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status_code: status.as_u16(),
                message: status.canonical_reason().unwrap_or("unknown").to_string(),
            });
        }

        response.bytes().await.map_err(to_transport_error)
    }
}

#[derive(Clone)]
pub struct RetryingFetcher {
    transport: Arc<dyn HttpTransport>,
    config: RetryConfig,
}

impl RetryingFetcher {
    pub fn new(transport: Arc<dyn HttpTransport>, config: RetryConfig) -> Self {
        Self { transport, config }
    }

    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.fetch_with_attempts(url, self.config.max_attempts).await
    }

    pub async fn fetch_with_attempts(
        &self,
        url: &str,
        max_attempts: u32,
    ) -> Result<String, FetchError> {
        let attempts = max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.transport.get(url).await {
                Ok(body) => {
                    if attempt > 1 {
                        tracing::debug!(attempt, url, "fetch succeeded after retry");
                    }
                    return String::from_utf8(body.to_vec())
                        .map_err(|e| FetchError::InvalidBody(e.to_string()));
                }
                Err(e) => {
                    tracing::error!(attempt, url, error = %e, "Attempt {} to fetch failed", attempt);

                    if attempt >= attempts {
                        return Err(FetchError::Exhausted {
                            attempts,
                            last_error: e,
                        });
                    }

                    let backoff = calculate_backoff(attempt - 1, &self.config);
                    if !backoff.is_zero() {
                        tokio::time::sleep(backoff).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::mock_server::MockServer;
    use super::*;
    use test_case::test_case;
    use tokio_test::{assert_err, assert_ok};

    const URL: &str = "https://vpic.test/api/vehicles/getallmakes?format=XML";

    fn no_backoff(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_backoff_ms: 0,
            ..RetryConfig::default()
        }
    }

    fn fetcher_with(server: &Arc<MockServer>, max_attempts: u32) -> RetryingFetcher {
        RetryingFetcher::new(server.clone(), no_backoff(max_attempts))
    }

    #[test_case(3, 0; "success on first attempt")]
    #[test_case(3, 1; "one failure then success")]
    #[test_case(3, 2; "success on last attempt")]
    #[test_case(5, 4; "five attempts")]
    #[tokio::test]
    async fn test_retry_until_success(max_attempts: u32, failures: usize) {
        let server = Arc::new(MockServer::new());
        server.add_response(URL, "<Response/>");
        server.fail_next_requests(failures);

        let fetcher = fetcher_with(&server, max_attempts);
        let body = assert_ok!(fetcher.fetch(URL).await);

        assert_eq!(body, "<Response/>");
        assert_eq!(server.request_count(), failures + 1);
    }

    #[test_case(1; "single attempt")]
    #[test_case(3; "default attempts")]
    #[test_case(5; "five attempts")]
    #[tokio::test]
    async fn test_always_failing_exhausts_attempts(max_attempts: u32) {
        let server = Arc::new(MockServer::new());
        server.fail_url(URL);

        let fetcher = fetcher_with(&server, max_attempts);
        let error = assert_err!(fetcher.fetch(URL).await);

        assert_eq!(server.request_count(), max_attempts as usize);
        assert!(matches!(error, FetchError::Exhausted { attempts, .. } if attempts == max_attempts));
        assert_eq!(
            error.to_string(),
            format!("Failed to fetch after {} attempts", max_attempts)
        );
    }

    #[tokio::test]
    async fn test_explicit_attempt_count_overrides_config() {
        let server = Arc::new(MockServer::new());
        server.fail_url(URL);

        let fetcher = fetcher_with(&server, 5);
        let error = assert_err!(fetcher.fetch_with_attempts(URL, 2).await);

        assert_eq!(server.request_count(), 2);
        assert!(matches!(error, FetchError::Exhausted { attempts: 2, .. }));
    }

    #[tokio::test]
    async fn test_zero_attempts_still_tries_once() {
        let server = Arc::new(MockServer::new());
        server.add_response(URL, "ok");

        let fetcher = fetcher_with(&server, 3);
        assert_eq!(assert_ok!(fetcher.fetch_with_attempts(URL, 0).await), "ok");
        assert_eq!(server.request_count(), 1);
    }

    #[tokio::test]
    async fn test_http_error_status_counts_as_failure() {
        let server = Arc::new(MockServer::new());

        let fetcher = fetcher_with(&server, 2);
        let error = assert_err!(fetcher.fetch(URL).await);

        assert_eq!(server.requests_for(URL), 2);
        match error {
            FetchError::Exhausted { last_error, .. } => {
                assert!(matches!(last_error, TransportError::Status { status_code: 404, .. }))
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_not_retried() {
        let server = Arc::new(MockServer::new());
        server.add_raw_response(URL, vec![0xff, 0xfe, 0xfd]);

        let fetcher = fetcher_with(&server, 3);
        let error = assert_err!(fetcher.fetch(URL).await);

        assert!(matches!(error, FetchError::InvalidBody(_)));
        assert_eq!(server.request_count(), 1);
    }

    #[test_case(Some("5"), 5; "numeric")]
    #[test_case(Some(" 4 "), 4; "padded")]
    #[test_case(None, 3; "unset")]
    #[test_case(Some("abc"), 3; "non numeric")]
    #[test_case(Some("0"), 3; "zero")]
    #[test_case(Some("-2"), 3; "negative")]
    fn test_parse_max_attempts(raw: Option<&str>, expected: u32) {
        assert_eq!(parse_max_attempts(raw), expected);
    }

    #[test]
    fn test_backoff_grows_and_is_capped() {
        let config = RetryConfig {
            max_attempts: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 1000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        };

        assert_eq!(calculate_backoff(0, &config), Duration::from_millis(100));
        assert_eq!(calculate_backoff(2, &config), Duration::from_millis(400));
        assert_eq!(calculate_backoff(10, &config), Duration::from_millis(1000));

        let disabled = RetryConfig {
            initial_backoff_ms: 0,
            ..config
        };
        assert_eq!(calculate_backoff(3, &disabled), Duration::ZERO);
    }

    #[test]
    fn test_backoff_jitter_stays_in_range() {
        let config = RetryConfig {
            max_attempts: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 10_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
        };

        for _ in 0..100 {
            let backoff = calculate_backoff(0, &config).as_millis();
            assert!((900..=1100).contains(&backoff), "backoff out of range: {}", backoff);
        }
    }
}
