//! Core pipeline logic.
//!
//! This module contains:
//! - Fingerprint: deterministic cache-key derivation
//! - Cache: the two-tier cache and its backend contract
//! - Limiter: fixed-window rate limiting
//! - Orchestrator: the request pipeline

pub mod cache;
pub mod fingerprint;
pub mod limiter;
pub mod orchestrator;

// Re-export commonly used types
pub use cache::{CacheBackend, CacheError, CachedEntry, CacheTier, MemoryBackend, TierConfig, TieredCache};
pub use fingerprint::{fetch_key, fingerprint, result_key, CacheKey, Namespace};
pub use limiter::{
    Admission, LimiterConfig, LimiterError, MemoryCounter, RateCounter, RateLimitExceeded,
    RateLimiter,
};
pub use orchestrator::{Orchestrator, PipelineError};
