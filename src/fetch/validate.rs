//! URL validation for remote content fetches.
//!
//! Checks run in order and short-circuit on the first failure. All of
//! them are deterministic, so validation failures are never retried and
//! never reach the network.

use thiserror::Error;
use url::Url;

/// Deterministic rejection of a fetch URL
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Malformed URL '{url}': {reason}")]
    Malformed { url: String, reason: String },

    #[error("Scheme '{scheme}' is not allowed")]
    SchemeNotAllowed { scheme: String },

    #[error("URL has no host")]
    MissingHost,

    #[error("Host contains a suspicious marker: {host}")]
    SuspiciousHost { host: String },

    #[error("Malformed path segment in '{path}'")]
    MalformedPath { path: String },

    #[error("Invalid HTTP method '{method}'")]
    InvalidMethod { method: String },

    #[error("Host '{host}' is blocked by deny-list entry '{entry}'")]
    BlockedDomain { host: String, entry: String },
}

/// Validation rules applied to every fetch URL
#[derive(Debug, Clone)]
pub struct UrlRules {
    /// Schemes allowed to fetch (lowercase)
    pub allowed_schemes: Vec<String>,

    /// Denied hosts; exact entries block the host and its subdomains,
    /// `*.domain` entries block subdomains only
    pub blocked_domains: Vec<String>,
}

impl Default for UrlRules {
    fn default() -> Self {
        Self {
            allowed_schemes: vec!["http".to_string(), "https".to_string()],
            blocked_domains: Vec::new(),
        }
    }
}

impl UrlRules {
    /// Validate a raw URL string; returns the parsed URL on success
    pub fn validate(&self, raw: &str) -> Result<Url, ValidationError> {
        let url = Url::parse(raw).map_err(|e| ValidationError::Malformed {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;

        let scheme = url.scheme().to_ascii_lowercase();
        if !self.allowed_schemes.iter().any(|s| s == &scheme) {
            return Err(ValidationError::SchemeNotAllowed { scheme });
        }

        // The url crate normalizes Unicode hosts to ASCII (IDNA), so the
        // deny-list checks below always see punycode
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or(ValidationError::MissingHost)?
            .to_ascii_lowercase();

        for marker in ["javascript:", "data:", "<", ">"] {
            if host.contains(marker) {
                return Err(ValidationError::SuspiciousHost { host });
            }
        }

        // Checked against the raw input: the WHATWG parser silently
        // rewrites backslashes to slashes and percent-encodes control
        // characters, so the parsed path never shows them
        if raw.chars().any(|c| c.is_control() || c.is_whitespace() || c == '\\') {
            return Err(ValidationError::MalformedPath {
                path: url.path().to_string(),
            });
        }

        if let Some(entry) = self.matching_block_entry(&host) {
            return Err(ValidationError::BlockedDomain {
                host,
                entry: entry.to_string(),
            });
        }

        Ok(url)
    }

    /// First deny-list entry that blocks the given host, if any
    fn matching_block_entry(&self, host: &str) -> Option<&str> {
        for entry in &self.blocked_domains {
            let entry_lower = entry.to_ascii_lowercase();

            if let Some(domain) = entry_lower.strip_prefix("*.") {
                // Wildcard: subdomains only, never the apex
                if host.ends_with(&format!(".{}", domain)) {
                    return Some(entry);
                }
            } else if host == entry_lower || host.ends_with(&format!(".{}", entry_lower)) {
                // Exact entries block the host and every subdomain
                return Some(entry);
            }
        }
        None
    }
}
