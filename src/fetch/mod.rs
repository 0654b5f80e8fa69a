//! Remote content fetching with validation, retries, and caching.
//!
//! Every fetch runs the deterministic validation pipeline first; only
//! network-level failures (and retryable HTTP statuses) are retried.
//! When the content tier is enabled, a cache hit returns without any
//! network call.

pub mod validate;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::core::cache::TieredCache;
use crate::core::fingerprint::fetch_key;

pub use validate::{UrlRules, ValidationError};

/// Errors surfaced by a fetch
#[derive(Debug, Error)]
pub enum FetchError {
    /// Deterministic rejection; never retried
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Non-retryable HTTP status (4xx other than 429)
    #[error("HTTP {status} fetching {url}")]
    Status { status: u16, url: String },

    /// Retryable HTTP status that kept failing until attempts ran out
    #[error("HTTP {status} fetching {url} after {attempts} attempts")]
    StatusExhausted {
        status: u16,
        url: String,
        attempts: u32,
    },

    /// Network failure that kept failing until attempts ran out
    #[error("Network failure fetching {url} after {attempts} attempts")]
    Network {
        url: String,
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    /// Response body exceeded the configured limit
    #[error("Content too large: {length} bytes > {limit} byte limit")]
    TooLarge { length: usize, limit: usize },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// How transient fetch failures are retried: a geometric backoff series
/// starting at `initial_delay_ms`, capped at `max_delay_ms`, over at most
/// `max_attempts` total tries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempt budget, first try included
    #[serde(default = "default_retry_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_delay_ms: u64,

    /// Ceiling on any single delay, in milliseconds
    #[serde(default = "default_backoff_cap_ms")]
    pub max_delay_ms: u64,

    /// Growth factor applied between consecutive retries
    #[serde(default = "default_backoff_factor")]
    pub backoff_multiplier: f64,
}

fn default_retry_attempts() -> u32 {
    3
}
fn default_initial_backoff_ms() -> u64 {
    500
}
fn default_backoff_cap_ms() -> u64 {
    10_000
}
fn default_backoff_factor() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_attempts(),
            initial_delay_ms: default_initial_backoff_ms(),
            max_delay_ms: default_backoff_cap_ms(),
            backoff_multiplier: default_backoff_factor(),
        }
    }
}

impl RetryPolicy {
    /// Delay to sleep after the given number of completed attempts.
    /// Grows geometrically, saturating at the configured cap.
    pub fn backoff_delay(&self, completed_attempts: u32) -> Duration {
        let mut delay_ms = self.initial_delay_ms;
        for _ in 1..completed_attempts {
            if delay_ms >= self.max_delay_ms {
                break;
            }
            delay_ms = (delay_ms as f64 * self.backoff_multiplier) as u64;
        }
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }

    /// Whether the attempt budget allows another try after this many
    /// completed attempts
    pub fn should_retry(&self, completed_attempts: u32) -> bool {
        completed_attempts < self.max_attempts
    }
}

/// Fetcher-wide configuration
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Overall request timeout
    pub timeout: Duration,

    /// Connect-phase timeout
    pub connect_timeout: Duration,

    /// Retry policy for transient failures
    pub retry: RetryPolicy,

    /// URL validation rules
    pub rules: UrlRules,

    /// Largest response body accepted
    pub max_content_bytes: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            rules: UrlRules::default(),
            max_content_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Per-call overrides
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// HTTP method (default GET)
    pub method: String,

    /// Extra request headers
    pub headers: Vec<(String, String)>,

    /// Bearer token, if the source needs auth
    pub bearer_token: Option<String>,

    /// Basic auth credentials
    pub basic_auth: Option<(String, Option<String>)>,

    /// Override the fetcher-wide timeout
    pub timeout: Option<Duration>,

    /// Whether to follow redirects (default true)
    pub follow_redirects: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            method: "GET".to_string(),
            headers: Vec::new(),
            bearer_token: None,
            basic_auth: None,
            timeout: None,
            follow_redirects: true,
        }
    }
}

impl FetchOptions {
    /// Credential identity for cache-key scoping. Two calls with different
    /// credentials must never share a cached response body.
    fn auth_identity(&self) -> Option<String> {
        if let Some(token) = &self.bearer_token {
            Some(format!("bearer:{}", token))
        } else {
            self.basic_auth
                .as_ref()
                .map(|(user, pass)| format!("basic:{}:{}", user, pass.as_deref().unwrap_or("")))
        }
    }
}

/// Outcome classification for one attempt
enum AttemptFailure {
    Transient(TransientCause),
    Fatal(FetchError),
}

enum TransientCause {
    Network(reqwest::Error),
    Status(u16),
}

/// Validating, retrying, caching HTTP content fetcher
pub struct ContentFetcher {
    client: reqwest::Client,
    client_no_redirect: reqwest::Client,
    config: FetchConfig,
    cache: Option<Arc<TieredCache>>,
}

impl ContentFetcher {
    /// Build a fetcher. Pass a cache to enable the content-fetch tier.
    pub fn new(config: FetchConfig, cache: Option<Arc<TieredCache>>) -> Result<Self, FetchError> {
        let base = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout);

        let client = base.build()?;

        let client_no_redirect = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            client_no_redirect,
            config,
            cache,
        })
    }

    /// Fetch remote text content.
    ///
    /// Validation failures surface immediately with zero network calls.
    /// Transient failures retry under the configured policy, then surface
    /// wrapping the last cause.
    #[instrument(skip(self, options), fields(url = %url))]
    pub async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<String, FetchError> {
        let parsed = self.config.rules.validate(url)?;

        // A malformed method is a deterministic caller error, not a GET
        let method = reqwest::Method::from_bytes(options.method.as_bytes()).map_err(|_| {
            ValidationError::InvalidMethod {
                method: options.method.clone(),
            }
        })?;

        let key = fetch_key(
            parsed.as_str(),
            &options.method,
            &options.headers,
            options.auth_identity().as_deref(),
        );
        if let Some(cache) = &self.cache {
            if let Some(text) = cache.content.get(&key).await {
                debug!("Content cache hit, skipping network");
                return Ok(text);
            }
        }

        let mut attempt = 0u32;
        loop {
            attempt += 1;

            match self.attempt(parsed.as_str(), method.clone(), options).await {
                Ok(text) => {
                    if let Some(cache) = &self.cache {
                        cache.content.put(&key, &text).await;
                    }
                    info!(attempt, bytes = text.len(), "Fetch succeeded");
                    return Ok(text);
                }
                Err(AttemptFailure::Fatal(e)) => return Err(e),
                Err(AttemptFailure::Transient(cause)) => {
                    if self.config.retry.should_retry(attempt) {
                        let delay = self.config.retry.backoff_delay(attempt);
                        warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "Transient fetch failure, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    return Err(match cause {
                        TransientCause::Network(source) => FetchError::Network {
                            url: url.to_string(),
                            attempts: attempt,
                            source,
                        },
                        TransientCause::Status(status) => FetchError::StatusExhausted {
                            status,
                            url: url.to_string(),
                            attempts: attempt,
                        },
                    });
                }
            }
        }
    }

    /// One network attempt, classified as success / transient / fatal
    async fn attempt(
        &self,
        url: &str,
        method: reqwest::Method,
        options: &FetchOptions,
    ) -> Result<String, AttemptFailure> {
        let client = if options.follow_redirects {
            &self.client
        } else {
            &self.client_no_redirect
        };

        let mut request = client.request(method, url);

        for (name, value) in &options.headers {
            request = request.header(name, value);
        }
        if let Some(token) = &options.bearer_token {
            request = request.bearer_auth(token);
        }
        if let Some((user, pass)) = &options.basic_auth {
            request = request.basic_auth(user, pass.as_deref());
        }
        if let Some(timeout) = options.timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(|e| {
            AttemptFailure::Transient(TransientCause::Network(e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let code = status.as_u16();
            // 5xx and 429 are worth retrying; other 4xx are deterministic
            return if status.is_server_error() || code == 429 {
                Err(AttemptFailure::Transient(TransientCause::Status(code)))
            } else {
                Err(AttemptFailure::Fatal(FetchError::Status {
                    status: code,
                    url: url.to_string(),
                }))
            };
        }

        if let Some(length) = response.content_length() {
            if length as usize > self.config.max_content_bytes {
                return Err(AttemptFailure::Fatal(FetchError::TooLarge {
                    length: length as usize,
                    limit: self.config.max_content_bytes,
                }));
            }
        }

        let text = response
            .text()
            .await
            .map_err(|e| AttemptFailure::Transient(TransientCause::Network(e)))?;

        if text.len() > self.config.max_content_bytes {
            return Err(AttemptFailure::Fatal(FetchError::TooLarge {
                length: text.len(),
                limit: self.config.max_content_bytes,
            }));
        }

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_geometrically_until_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_delay_ms: 100,
            max_delay_ms: 2_500,
            backoff_multiplier: 3.0,
        };

        // Each delay triples until the cap absorbs the series
        let delays: Vec<u64> = (1..=5)
            .map(|n| policy.backoff_delay(n).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![100, 300, 900, 2_500, 2_500]);

        // The budget is exclusive of the final attempt
        assert!(policy.should_retry(9));
        assert!(!policy.should_retry(10));
    }

    #[tokio::test]
    async fn test_blocked_domain_fails_without_network() {
        let config = FetchConfig {
            rules: UrlRules {
                blocked_domains: vec!["malicious-site.com".to_string()],
                ..Default::default()
            },
            ..Default::default()
        };
        let fetcher = ContentFetcher::new(config, None).unwrap();

        let err = fetcher
            .fetch("https://malicious-site.com/x", &FetchOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Validation(_)));
    }

    #[tokio::test]
    async fn test_invalid_method_fails_without_network() {
        let fetcher = ContentFetcher::new(FetchConfig::default(), None).unwrap();

        let err = fetcher
            .fetch(
                "https://example.com/doc",
                &FetchOptions {
                    method: "NOT A METHOD".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FetchError::Validation(ValidationError::InvalidMethod { .. })
        ));
    }

    #[tokio::test]
    async fn test_disallowed_scheme_fails_without_network() {
        let fetcher = ContentFetcher::new(FetchConfig::default(), None).unwrap();

        let err = fetcher
            .fetch("ftp://example.com/file", &FetchOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FetchError::Validation(ValidationError::SchemeNotAllowed { .. })
        ));
    }
}
