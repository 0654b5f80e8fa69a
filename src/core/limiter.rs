//! Fixed-window rate limiting for pipeline admission.
//!
//! The counter backend owns the atomic check-and-increment; the limiter
//! layers configuration (enabled flag, limit, window, key prefix) on top.
//! Denial happens before any cache lookup, fetch, or invocation.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

/// Raised when a window's budget is exhausted
#[derive(Debug, Clone, Error)]
#[error("Rate limit exceeded for '{key}': {limit} per {window:?}, retry in {retry_after:?}")]
pub struct RateLimitExceeded {
    pub key: String,
    pub limit: u32,
    pub window: Duration,
    pub retry_after: Duration,
}

/// Counter backend failure. The limiter fails open on these.
#[derive(Debug, Error)]
pub enum LimiterError {
    #[error("Counter backend unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of one atomic admission attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed { remaining: u32 },
    Denied { retry_after: Duration },
}

/// Atomic fixed-window counter contract.
///
/// `try_acquire` must perform the whole window check, reset, and
/// conditional increment as one atomic operation with respect to
/// concurrent callers sharing a key. Denied attempts do not increment.
#[async_trait]
pub trait RateCounter: Send + Sync {
    async fn try_acquire(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> Result<Admission, LimiterError>;
}

/// One key's window state
#[derive(Debug, Clone, Copy)]
struct RateWindow {
    count: u32,
    window_start: Instant,
}

/// In-process counter backed by a mutex, atomic by construction
#[derive(Debug, Default)]
pub struct MemoryCounter {
    windows: Mutex<HashMap<String, RateWindow>>,
}

impl MemoryCounter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateCounter for MemoryCounter {
    async fn try_acquire(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> Result<Admission, LimiterError> {
        let mut windows = self.windows.lock().expect("limiter lock poisoned");
        let now = Instant::now();

        let state = windows.entry(key.to_string()).or_insert(RateWindow {
            count: 0,
            window_start: now,
        });

        // Transparent reset once the window has elapsed
        if now.duration_since(state.window_start) >= window {
            state.count = 0;
            state.window_start = now;
        }

        if state.count < limit {
            state.count += 1;
            Ok(Admission::Allowed {
                remaining: limit - state.count,
            })
        } else {
            let elapsed = now.duration_since(state.window_start);
            Ok(Admission::Denied {
                retry_after: window.saturating_sub(elapsed),
            })
        }
    }
}

/// Configuration for the limiter
#[derive(Debug, Clone)]
pub struct LimiterConfig {
    pub enabled: bool,

    /// Admissions allowed per window
    pub limit: u32,

    /// Window length
    pub window: Duration,

    /// Prefix applied to every counter key
    pub key_prefix: String,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            limit: 60,
            window: Duration::from_secs(60),
            key_prefix: "alembic:rate".to_string(),
        }
    }
}

/// Gate at the pipeline entry.
///
/// The global key is always checked when enabled; callers may admit
/// against finer-grained keys as an extension.
pub struct RateLimiter {
    counter: std::sync::Arc<dyn RateCounter>,
    config: LimiterConfig,
}

impl RateLimiter {
    pub fn new(counter: std::sync::Arc<dyn RateCounter>, config: LimiterConfig) -> Self {
        Self { counter, config }
    }

    /// Limiter over a fresh in-memory counter
    pub fn in_memory(config: LimiterConfig) -> Self {
        Self::new(std::sync::Arc::new(MemoryCounter::new()), config)
    }

    /// Admit against the global key
    pub async fn admit_global(&self) -> Result<(), RateLimitExceeded> {
        self.admit("global").await
    }

    /// Admit against a scoped key. Disabled mode allows unconditionally
    /// without touching the backend; backend failures fail open.
    pub async fn admit(&self, key: &str) -> Result<(), RateLimitExceeded> {
        if !self.config.enabled {
            return Ok(());
        }

        let full_key = format!("{}:{}", self.config.key_prefix, key);

        match self
            .counter
            .try_acquire(&full_key, self.config.limit, self.config.window)
            .await
        {
            Ok(Admission::Allowed { remaining }) => {
                debug!(key = %full_key, remaining, "Admission allowed");
                Ok(())
            }
            Ok(Admission::Denied { retry_after }) => Err(RateLimitExceeded {
                key: full_key,
                limit: self.config.limit,
                window: self.config.window,
                retry_after,
            }),
            Err(e) => {
                // Availability over enforcement when the backend is down
                warn!(key = %full_key, error = %e, "Counter backend failed, admitting");
                Ok(())
            }
        }
    }
}
