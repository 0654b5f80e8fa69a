//! Two-tier cache over a shared backend.
//!
//! The content-fetch tier and the transformation-result tier are
//! independently configured (enabled flag, TTL) views over one
//! `CacheBackend`. Backend failures never fail the pipeline: a broken
//! backend degrades to "always miss / no-op store" with a warning.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use super::fingerprint::CacheKey;

/// Errors surfaced by cache backends. The tiers swallow these and degrade;
/// they exist so backends can report what went wrong.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache backend unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A stored value with its expiry bookkeeping.
///
/// Entries expire by TTL on read; there is no background eviction.
/// Re-storing under the same key overwrites.
#[derive(Debug, Clone)]
pub struct CachedEntry {
    /// Serialized value
    pub value: serde_json::Value,

    /// When the entry was stored
    pub stored_at: DateTime<Utc>,

    /// How long the entry stays valid after `stored_at`
    pub ttl: Duration,
}

impl CachedEntry {
    /// Whether the entry has outlived its TTL
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.stored_at);
        age.to_std().map(|age| age >= self.ttl).unwrap_or(false)
    }
}

/// Storage contract shared by both tiers.
///
/// Backends are externally owned; the pipeline only performs get/put
/// through this trait and never assumes exclusive ownership.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CachedEntry>, CacheError>;

    async fn put(&self, key: &str, entry: CachedEntry) -> Result<(), CacheError>;

    /// Remove every entry whose key starts with `prefix`; returns the
    /// number of removed entries. Backs the operational cache-clear
    /// command.
    async fn clear_prefix(&self, prefix: &str) -> Result<u64, CacheError>;
}

/// In-process backend for tests and single-node deployments
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, CachedEntry>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries (test helper)
    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<CachedEntry>, CacheError> {
        Ok(self
            .entries
            .lock()
            .expect("cache lock poisoned")
            .get(key)
            .cloned())
    }

    async fn put(&self, key: &str, entry: CachedEntry) -> Result<(), CacheError> {
        self.entries
            .lock()
            .expect("cache lock poisoned")
            .insert(key.to_string(), entry);
        Ok(())
    }

    async fn clear_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        Ok((before - entries.len()) as u64)
    }
}

/// Configuration for one cache tier
#[derive(Debug, Clone)]
pub struct TierConfig {
    /// Whether this tier caches at all
    pub enabled: bool,

    /// TTL applied to stored entries
    pub ttl: Duration,

    /// Key prefix shared by the whole system (for operational clearing)
    pub prefix: String,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(3600),
            prefix: "alembic".to_string(),
        }
    }
}

/// One typed tier over the shared backend.
///
/// Disabled tiers always miss and never store. Backend errors are logged
/// and treated the same way: availability beats cache coverage.
pub struct CacheTier<T> {
    backend: Arc<dyn CacheBackend>,
    config: TierConfig,
    _value: PhantomData<fn() -> T>,
}

impl<T> CacheTier<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(backend: Arc<dyn CacheBackend>, config: TierConfig) -> Self {
        Self {
            backend,
            config,
            _value: PhantomData,
        }
    }

    /// Whether this tier is enabled
    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    fn storage_key(&self, key: &CacheKey) -> String {
        format!("{}:{}", self.config.prefix, key)
    }

    /// Look up a value. Expired, missing, disabled, and backend-error
    /// cases all read as a miss.
    pub async fn get(&self, key: &CacheKey) -> Option<T> {
        if !self.config.enabled {
            return None;
        }

        let storage_key = self.storage_key(key);
        let entry = match self.backend.get(&storage_key).await {
            Ok(entry) => entry?,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache get failed, treating as miss");
                return None;
            }
        };

        if entry.is_expired(Utc::now()) {
            debug!(key = %key, "Cache entry expired");
            return None;
        }

        match serde_json::from_value(entry.value) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %key, error = %e, "Cache entry undecodable, treating as miss");
                None
            }
        }
    }

    /// Store a value under the tier's TTL. Disabled tiers and backend
    /// errors are silent no-ops.
    pub async fn put(&self, key: &CacheKey, value: &T) {
        if !self.config.enabled {
            return;
        }

        let entry = match serde_json::to_value(value) {
            Ok(value) => CachedEntry {
                value,
                stored_at: Utc::now(),
                ttl: self.config.ttl,
            },
            Err(e) => {
                warn!(key = %key, error = %e, "Cache value unserializable, skipping store");
                return;
            }
        };

        if let Err(e) = self.backend.put(&self.storage_key(key), entry).await {
            warn!(key = %key, error = %e, "Cache put failed, skipping store");
        }
    }
}

/// The two tiers bundled for injection into the pipeline
pub struct TieredCache {
    /// Fetched remote content (Text)
    pub content: CacheTier<String>,

    /// Transformation results
    pub results: CacheTier<crate::domain::TransformResult>,

    backend: Arc<dyn CacheBackend>,
    prefix: String,
}

impl TieredCache {
    pub fn new(
        backend: Arc<dyn CacheBackend>,
        content_config: TierConfig,
        result_config: TierConfig,
    ) -> Self {
        let prefix = content_config.prefix.clone();
        Self {
            content: CacheTier::new(Arc::clone(&backend), content_config),
            results: CacheTier::new(Arc::clone(&backend), result_config),
            backend,
            prefix,
        }
    }

    /// Both tiers over a fresh in-memory backend with the given configs
    pub fn in_memory(content_config: TierConfig, result_config: TierConfig) -> Self {
        Self::new(Arc::new(MemoryBackend::new()), content_config, result_config)
    }

    /// Clear every cached entry under this system's prefix (both tiers).
    /// Returns the number of removed entries.
    pub async fn clear(&self) -> Result<u64, CacheError> {
        self.backend.clear_prefix(&self.prefix).await
    }
}
