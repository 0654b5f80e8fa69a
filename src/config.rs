//! Typed configuration for the pipeline.
//!
//! Settings are loaded once (YAML file or defaults), then injected
//! explicitly at construction. No component reads ambient state; tests
//! build `Settings` inline.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::cache::TierConfig;
use crate::core::limiter::LimiterConfig;
use crate::domain::TransformMetadata;
use crate::fetch::{FetchConfig, RetryPolicy, UrlRules};
use crate::queue::QueueConfig;

/// Provider/model defaults stamped into result metadata
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_model")]
    pub model: String,
}

fn default_provider() -> String {
    "anthropic".to_string()
}
fn default_model() -> String {
    "claude-sonnet".to_string()
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
        }
    }
}

impl ProviderSettings {
    /// Result metadata stamped with these provider defaults.
    /// Transformers that talk to the configured provider use this instead
    /// of repeating the model/provider strings.
    pub fn metadata_for(&self, transformer_id: impl Into<String>) -> TransformMetadata {
        TransformMetadata::new(self.model.as_str(), self.provider.as_str(), transformer_id)
    }
}

/// Remote-fetch settings
#[derive(Debug, Clone, Deserialize)]
pub struct FetchSettings {
    #[serde(default = "default_fetch_timeout")]
    pub timeout_seconds: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default = "default_allowed_schemes")]
    pub allowed_schemes: Vec<String>,

    /// Exact entries block the host and its subdomains; `*.domain`
    /// entries block subdomains only
    #[serde(default)]
    pub blocked_domains: Vec<String>,

    #[serde(default = "default_max_content_bytes")]
    pub max_content_bytes: usize,
}

fn default_fetch_timeout() -> u64 {
    30
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_allowed_schemes() -> Vec<String> {
    vec!["http".to_string(), "https".to_string()]
}
fn default_max_content_bytes() -> usize {
    10 * 1024 * 1024
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_seconds: default_fetch_timeout(),
            connect_timeout_seconds: default_connect_timeout(),
            retry: RetryPolicy::default(),
            allowed_schemes: default_allowed_schemes(),
            blocked_domains: Vec::new(),
            max_content_bytes: default_max_content_bytes(),
        }
    }
}

impl FetchSettings {
    /// Convert into the fetcher's runtime config
    pub fn to_fetch_config(&self) -> FetchConfig {
        FetchConfig {
            timeout: Duration::from_secs(self.timeout_seconds),
            connect_timeout: Duration::from_secs(self.connect_timeout_seconds),
            retry: self.retry.clone(),
            rules: UrlRules {
                allowed_schemes: self.allowed_schemes.clone(),
                blocked_domains: self.blocked_domains.clone(),
            },
            max_content_bytes: self.max_content_bytes,
        }
    }
}

/// One cache tier's settings
#[derive(Debug, Clone, Deserialize)]
pub struct TierSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
}

fn default_true() -> bool {
    true
}
fn default_ttl() -> u64 {
    3600
}

impl Default for TierSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: default_ttl(),
        }
    }
}

/// Two-tier cache settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheSettings {
    #[serde(default)]
    pub content: TierSettings,

    #[serde(default)]
    pub result: TierSettings,

    #[serde(default = "default_cache_prefix")]
    pub prefix: String,
}

fn default_cache_prefix() -> String {
    "alembic".to_string()
}

impl CacheSettings {
    fn tier_config(&self, tier: &TierSettings) -> TierConfig {
        TierConfig {
            enabled: tier.enabled,
            ttl: Duration::from_secs(tier.ttl_seconds),
            prefix: if self.prefix.is_empty() {
                default_cache_prefix()
            } else {
                self.prefix.clone()
            },
        }
    }

    pub fn content_config(&self) -> TierConfig {
        self.tier_config(&self.content)
    }

    pub fn result_config(&self) -> TierConfig {
        self.tier_config(&self.result)
    }
}

/// Rate-limit settings
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_rate_limit")]
    pub max_attempts: u32,

    #[serde(default = "default_decay")]
    pub decay_seconds: u64,

    #[serde(default = "default_rate_prefix")]
    pub key_prefix: String,
}

fn default_rate_limit() -> u32 {
    60
}
fn default_decay() -> u64 {
    60
}
fn default_rate_prefix() -> String {
    "alembic:rate".to_string()
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: default_rate_limit(),
            decay_seconds: default_decay(),
            key_prefix: default_rate_prefix(),
        }
    }
}

impl RateLimitSettings {
    pub fn to_limiter_config(&self) -> LimiterConfig {
        LimiterConfig {
            enabled: self.enabled,
            limit: self.max_attempts,
            window: Duration::from_secs(self.decay_seconds),
            key_prefix: self.key_prefix.clone(),
        }
    }
}

/// Async-queue settings
#[derive(Debug, Clone, Deserialize)]
pub struct QueueSettings {
    #[serde(default = "default_queue_name")]
    pub name: String,

    #[serde(default)]
    pub connection: Option<String>,

    #[serde(default = "default_queue_timeout")]
    pub timeout_seconds: u64,

    #[serde(default = "default_tries")]
    pub tries: u32,

    #[serde(default)]
    pub delay_seconds: u64,
}

fn default_queue_name() -> String {
    "transforms".to_string()
}
fn default_queue_timeout() -> u64 {
    120
}
fn default_tries() -> u32 {
    3
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            name: default_queue_name(),
            connection: None,
            timeout_seconds: default_queue_timeout(),
            tries: default_tries(),
            delay_seconds: 0,
        }
    }
}

impl QueueSettings {
    pub fn to_queue_config(&self) -> QueueConfig {
        QueueConfig {
            name: self.name.clone(),
            connection: self.connection.clone(),
            timeout_seconds: self.timeout_seconds,
            tries: self.tries,
            delay_seconds: self.delay_seconds,
        }
    }
}

/// The complete configuration surface
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub provider: ProviderSettings,

    #[serde(default)]
    pub fetch: FetchSettings,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub rate_limit: RateLimitSettings,

    #[serde(default)]
    pub queue: QueueSettings,
}

impl Settings {
    /// Parse settings from YAML content
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse settings YAML")
    }

    /// Load settings from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Load from the file named by `ALEMBIC_CONFIG`, or defaults when unset
    pub fn from_env() -> Result<Self> {
        match std::env::var("ALEMBIC_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path)),
            Err(_) => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_file() {
        let settings = Settings::default();

        assert_eq!(settings.fetch.timeout_seconds, 30);
        assert_eq!(settings.fetch.allowed_schemes, vec!["http", "https"]);
        assert!(settings.cache.content.enabled);
        assert!(settings.cache.result.enabled);
        assert_eq!(settings.rate_limit.max_attempts, 60);
        assert_eq!(settings.queue.name, "transforms");
    }

    #[test]
    fn test_yaml_parsing_with_partial_overrides() {
        let settings = Settings::from_yaml(
            r#"
fetch:
  timeout_seconds: 5
  blocked_domains:
    - malicious-site.com
    - "*.example.com"
cache:
  result:
    enabled: false
    ttl_seconds: 60
rate_limit:
  max_attempts: 2
  decay_seconds: 10
queue:
  name: background
  tries: 5
"#,
        )
        .unwrap();

        assert_eq!(settings.fetch.timeout_seconds, 5);
        assert_eq!(settings.fetch.blocked_domains.len(), 2);
        // Untouched sections keep their defaults
        assert_eq!(settings.fetch.connect_timeout_seconds, 10);
        assert!(!settings.cache.result.enabled);
        assert!(settings.cache.content.enabled);
        assert_eq!(settings.rate_limit.max_attempts, 2);
        assert_eq!(settings.queue.name, "background");
        assert_eq!(settings.queue.tries, 5);
    }

    #[test]
    fn test_conversions_to_runtime_configs() {
        let settings = Settings::default();

        let fetch = settings.fetch.to_fetch_config();
        assert_eq!(fetch.timeout, Duration::from_secs(30));

        let limiter = settings.rate_limit.to_limiter_config();
        assert_eq!(limiter.limit, 60);
        assert_eq!(limiter.window, Duration::from_secs(60));

        let result_tier = settings.cache.result_config();
        assert_eq!(result_tier.ttl, Duration::from_secs(3600));
        assert_eq!(result_tier.prefix, "alembic");
    }

    #[test]
    fn test_provider_settings_stamp_metadata() {
        let settings = Settings::from_yaml(
            r#"
provider:
  provider: openai
  model: gpt-4o
"#,
        )
        .unwrap();

        let metadata = settings.provider.metadata_for("summarize");
        assert_eq!(metadata.model, "gpt-4o");
        assert_eq!(metadata.provider_id, "openai");
        assert_eq!(metadata.transformer_id, "summarize");
    }

    #[test]
    fn test_settings_from_file() {
        use std::io::Write;
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("alembic.yaml");

        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "queue:\n  name: from-file").unwrap();

        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.queue.name, "from-file");
    }
}
