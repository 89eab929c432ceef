//! Configuration schema definitions.
//!
//! [`Config`] is the immutable snapshot the engine reads per invocation. It
//! is (de)serializable from TOML, offers builder-style setters, and reports
//! problems through [`Config::validate`] rather than silently coercing.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::extract::{AddressExtractor, HrefRule, validate_pattern};
use crate::util::saturating_millis;

/// Largest accepted `max_batch_size`.
pub const MAX_BATCH_SIZE_LIMIT: usize = 500;

/// Largest accepted cooldown between transport calls.
pub const MAX_COOLDOWN: Duration = Duration::from_secs(30);

/// Root configuration structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// JSON-RPC endpoint used for `eth_call`.
    pub rpc_endpoint: String,

    /// Whether resolved names are cached.
    pub cache_enabled: bool,

    /// Cache time-to-live in milliseconds, for positive and negative entries alike.
    pub cache_ttl_ms: u64,

    /// Namespace prefix for cache keys in the key-value store.
    pub cache_prefix: String,

    /// Maximum addresses per batched call (1..=500).
    pub max_batch_size: usize,

    /// Minimum delay between transport calls in milliseconds (0..=30000).
    pub cooldown_ms: u64,

    /// HTTP client timeout for the reference transport, in seconds.
    pub request_timeout_secs: u64,

    /// Override for the full-address pattern.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_address_pattern: Option<String>,

    /// Override for the abbreviated-address pattern.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abbreviated_pattern: Option<String>,

    /// Extra HTTP headers sent with every RPC request.
    pub custom_headers: BTreeMap<String, String>,

    /// Ordered site-specific href rules.
    pub href_rules: Vec<HrefRuleConfig>,
}

/// A site-specific href rule as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HrefRuleConfig {
    /// Regular expression applied to the href.
    pub pattern: String,
    /// Capture group holding the address.
    #[serde(default = "default_rule_group")]
    pub group: usize,
}

const fn default_rule_group() -> usize {
    1
}

impl Config {
    /// Default public RPC endpoint.
    pub const DEFAULT_RPC_ENDPOINT: &'static str = "https://eth.llamarpc.com";
    /// Default cache TTL in milliseconds (24 hours).
    pub const DEFAULT_CACHE_TTL_MS: u64 = 24 * 60 * 60 * 1_000;
    /// Default cache key prefix.
    pub const DEFAULT_CACHE_PREFIX: &'static str = "nametag:";
    /// Default batch size.
    pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;
    /// Default cooldown in milliseconds.
    pub const DEFAULT_COOLDOWN_MS: u64 = 1_000;
    /// Default HTTP timeout in seconds.
    pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

    /// Creates a default configuration targeting `rpc_endpoint`.
    #[must_use]
    pub fn new(rpc_endpoint: impl Into<String>) -> Self {
        Self {
            rpc_endpoint: rpc_endpoint.into(),
            ..Self::default()
        }
    }

    /// Cache TTL as a [`Duration`].
    #[must_use]
    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    /// Cooldown as a [`Duration`].
    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    /// HTTP timeout as a [`Duration`].
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Sets the RPC endpoint.
    #[must_use]
    pub fn with_rpc_endpoint(mut self, url: impl Into<String>) -> Self {
        self.rpc_endpoint = url.into();
        self
    }

    /// Adds a custom HTTP header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_headers.insert(name.into(), value.into());
        self
    }

    /// Enables or disables caching.
    #[must_use]
    pub const fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    /// Sets the cache TTL (whole milliseconds, saturating at `u64::MAX`).
    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl_ms = saturating_millis(ttl);
        self
    }

    /// Sets the maximum batch size.
    #[must_use]
    pub const fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }

    /// Sets the cooldown (whole milliseconds, saturating at `u64::MAX`).
    ///
    /// Out-of-range values are kept as given and rejected by
    /// [`Config::validate`] and [`Config::check_resolver_bounds`].
    #[must_use]
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown_ms = saturating_millis(cooldown);
        self
    }

    /// Overrides the full-address pattern.
    #[must_use]
    pub fn with_full_address_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.full_address_pattern = Some(pattern.into());
        self
    }

    /// Overrides the abbreviated-address pattern.
    #[must_use]
    pub fn with_abbreviated_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.abbreviated_pattern = Some(pattern.into());
        self
    }

    /// Appends an href rule.
    #[must_use]
    pub fn with_href_rule(mut self, pattern: impl Into<String>, group: usize) -> Self {
        self.href_rules.push(HrefRuleConfig {
            pattern: pattern.into(),
            group,
        });
        self
    }

    /// Validate the configuration.
    #[must_use]
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if url::Url::parse(&self.rpc_endpoint).is_err() {
            issues.push(ConfigIssue::error(
                "rpc_endpoint",
                format!("`{}` is not a valid URL", self.rpc_endpoint),
            ));
        }

        if !(1..=MAX_BATCH_SIZE_LIMIT).contains(&self.max_batch_size) {
            issues.push(ConfigIssue::error(
                "max_batch_size",
                format!(
                    "must be within 1..={MAX_BATCH_SIZE_LIMIT}, got {}",
                    self.max_batch_size
                ),
            ));
        }

        if self.cooldown() > MAX_COOLDOWN {
            issues.push(ConfigIssue::error(
                "cooldown_ms",
                format!(
                    "must be within 0..={}, got {}",
                    MAX_COOLDOWN.as_millis(),
                    self.cooldown_ms
                ),
            ));
        } else if self.cooldown_ms == 0 {
            issues.push(ConfigIssue::warning(
                "cooldown_ms",
                "Cooldown is 0, RPC calls are not rate limited",
            ));
        }

        if !self.cache_enabled {
            issues.push(ConfigIssue::warning(
                "cache_enabled",
                "Cache is disabled, every lookup hits the RPC endpoint",
            ));
        } else if self.cache_ttl_ms == 0 {
            issues.push(ConfigIssue::warning(
                "cache_ttl_ms",
                "Cache TTL is 0, entries are never fresh",
            ));
        }

        if self.cache_prefix.is_empty() {
            issues.push(ConfigIssue::warning(
                "cache_prefix",
                "Empty cache prefix, clearing the cache removes every store key",
            ));
        }

        if let Some(pattern) = &self.full_address_pattern
            && let Err(e) = validate_pattern(pattern)
        {
            issues.push(ConfigIssue::error("full_address_pattern", e.to_string()));
        }

        if let Some(pattern) = &self.abbreviated_pattern {
            match validate_pattern(pattern) {
                Err(e) => issues.push(ConfigIssue::error("abbreviated_pattern", e.to_string())),
                Ok(re) if re.captures_len() < 3 => issues.push(ConfigIssue::error(
                    "abbreviated_pattern",
                    "needs two capture groups (prefix, suffix)",
                )),
                Ok(_) => {}
            }
        }

        for (i, rule) in self.href_rules.iter().enumerate() {
            if let Err(e) = HrefRule::try_from(rule) {
                issues.push(ConfigIssue::error(format!("href_rules[{i}]"), e.to_string()));
            }
        }

        issues
    }

    /// Check if the configuration is valid (no errors).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.validate()
            .iter()
            .all(|issue| issue.level != IssueLevel::Error)
    }

    /// Fail fast on the bounds the resolver enforces itself.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `max_batch_size` or the cooldown is out
    /// of range.
    pub fn check_resolver_bounds(&self) -> Result<()> {
        if !(1..=MAX_BATCH_SIZE_LIMIT).contains(&self.max_batch_size) {
            return Err(Error::config(format!(
                "max_batch_size must be within 1..={MAX_BATCH_SIZE_LIMIT}, got {}",
                self.max_batch_size
            )));
        }
        if self.cooldown() > MAX_COOLDOWN {
            return Err(Error::config(format!(
                "cooldown must be at most {}ms, got {}ms",
                MAX_COOLDOWN.as_millis(),
                self.cooldown_ms
            )));
        }
        Ok(())
    }

    /// Compile the pattern section into an [`AddressExtractor`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Pattern`] for the first rejected pattern.
    pub fn extractor(&self) -> Result<AddressExtractor> {
        AddressExtractor::from_config(self)
    }

    /// Merge environment variables into the configuration.
    ///
    /// `NAMETAG_RPC_URL` overrides the endpoint.
    #[must_use]
    pub fn with_env(mut self) -> Self {
        if let Ok(url) = std::env::var("NAMETAG_RPC_URL")
            && !url.is_empty()
        {
            self.rpc_endpoint = url;
        }
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_endpoint: Self::DEFAULT_RPC_ENDPOINT.to_owned(),
            cache_enabled: true,
            cache_ttl_ms: Self::DEFAULT_CACHE_TTL_MS,
            cache_prefix: Self::DEFAULT_CACHE_PREFIX.to_owned(),
            max_batch_size: Self::DEFAULT_MAX_BATCH_SIZE,
            cooldown_ms: Self::DEFAULT_COOLDOWN_MS,
            request_timeout_secs: Self::DEFAULT_REQUEST_TIMEOUT_SECS,
            full_address_pattern: None,
            abbreviated_pattern: None,
            custom_headers: BTreeMap::new(),
            href_rules: Vec::new(),
        }
    }
}

/// Configuration validation issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    /// Issue severity level.
    pub level: IssueLevel,
    /// Configuration path (e.g., `"href_rules[0]"`).
    pub path: String,
    /// Human-readable message.
    pub message: String,
}

impl ConfigIssue {
    /// Create an error-level issue.
    #[must_use]
    pub fn error(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: IssueLevel::Error,
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a warning-level issue.
    #[must_use]
    pub fn warning(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: IssueLevel::Warning,
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.level {
            IssueLevel::Error => "ERROR",
            IssueLevel::Warning => "WARN",
        };
        write!(f, "[{}] {}: {}", prefix, self.path, self.message)
    }
}

/// Severity level for configuration issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueLevel {
    /// Error that prevents the engine from running correctly.
    Error,
    /// Warning about potential issues.
    Warning,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.rpc_endpoint, Config::DEFAULT_RPC_ENDPOINT);
        assert_eq!(config.max_batch_size, 100);
        assert_eq!(config.cooldown(), Duration::from_secs(1));
        assert_eq!(config.cache_ttl(), Duration::from_secs(86_400));
        assert!(config.cache_enabled);
        assert!(config.href_rules.is_empty());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default()
            .with_header("x-api-key", "secret")
            .with_href_rule(r"holder=(0x[0-9a-fA-F]{40})", 1);
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_parse_sample_config() {
        let toml_str = r#"
rpc_endpoint = "https://rpc.example.org"
max_batch_size = 50
cooldown_ms = 2000
cache_ttl_ms = 3600000
abbreviated_pattern = '0x([0-9a-f]{4,})\.\.\.([0-9a-f]{4,})'

[custom_headers]
authorization = "Bearer abc"

[[href_rules]]
pattern = '/holder/(0x[0-9a-fA-F]{40})'

[[href_rules]]
pattern = 'a=(0x[0-9a-fA-F]{40})'
group = 1
"#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.rpc_endpoint, "https://rpc.example.org");
        assert_eq!(config.max_batch_size, 50);
        assert_eq!(config.cooldown(), Duration::from_secs(2));
        assert_eq!(config.cache_ttl(), Duration::from_secs(3_600));
        assert_eq!(config.custom_headers["authorization"], "Bearer abc");
        assert_eq!(config.href_rules.len(), 2);
        assert_eq!(config.href_rules[0].group, 1);
        // Unspecified fields keep defaults.
        assert!(config.cache_enabled);
        assert!(config.is_valid());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let result: std::result::Result<Config, _> = toml::from_str("batch = 3");
        assert!(result.is_err());
    }

    #[test]
    fn test_validation() {
        let config = Config::default();
        let issues = config.validate();
        assert!(issues.is_empty(), "Default config should have no issues");
        assert!(config.is_valid());
    }

    #[test]
    fn test_validation_batch_size_bounds() {
        for size in [0, 501] {
            let config = Config::default().with_max_batch_size(size);
            assert!(!config.is_valid());
            assert!(config.check_resolver_bounds().is_err());
        }
        for size in [1, 500] {
            let config = Config::default().with_max_batch_size(size);
            assert!(config.is_valid());
            assert!(config.check_resolver_bounds().is_ok());
        }
    }

    #[test]
    fn test_validation_cooldown_bounds() {
        let config = Config::default().with_cooldown(Duration::from_millis(30_001));
        assert!(!config.is_valid());
        assert!(matches!(
            config.check_resolver_bounds(),
            Err(Error::Config(_))
        ));

        let config = Config::default().with_cooldown(Duration::ZERO);
        let issues = config.validate();
        assert!(config.is_valid());
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].level, IssueLevel::Warning);
    }

    #[test]
    fn test_oversized_cooldown_rejected() {
        let config =
            Config::default().with_cooldown(Duration::from_secs(18_446_744_073_709_552));
        assert_eq!(config.cooldown_ms, u64::MAX);
        assert!(!config.is_valid());
        assert!(matches!(
            config.check_resolver_bounds(),
            Err(Error::Config(_))
        ));

        let config = Config::default().with_cooldown(Duration::MAX);
        assert!(config.check_resolver_bounds().is_err());
    }

    #[test]
    fn test_cache_ttl_keeps_milliseconds() {
        let config = Config::default().with_cache_ttl(Duration::from_millis(900));
        assert_eq!(config.cache_ttl_ms, 900);
        assert_eq!(config.cache_ttl(), Duration::from_millis(900));
        assert!(config.validate().is_empty());

        let config = Config::default().with_cache_ttl(Duration::from_micros(1_500));
        assert_eq!(config.cache_ttl(), Duration::from_millis(1));

        let config = Config::default().with_cache_ttl(Duration::MAX);
        assert_eq!(config.cache_ttl_ms, u64::MAX);
    }

    #[test]
    fn test_zero_cache_ttl_warns() {
        let config = Config::default().with_cache_ttl(Duration::ZERO);
        let issues = config.validate();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].path, "cache_ttl_ms");
        assert_eq!(issues[0].level, IssueLevel::Warning);
    }

    #[test]
    fn test_validation_patterns() {
        let config = Config::default().with_full_address_pattern("(0x");
        assert!(!config.is_valid());

        let config = Config::default().with_abbreviated_pattern(r"(\w+\s?)*");
        let issues = config.validate();
        assert!(issues.iter().any(|i| i.path == "abbreviated_pattern"));

        let config = Config::default().with_abbreviated_pattern(r"0x[0-9a-f]{4}");
        assert!(!config.is_valid());

        let config = Config::default().with_href_rule(r"holder=(0x[0-9a-f]{40})", 3);
        let issues = config.validate();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].path, "href_rules[0]");
    }

    #[test]
    fn test_validation_bad_endpoint() {
        let config = Config::new("not a url");
        assert!(!config.is_valid());
    }

    #[test]
    fn test_issue_display() {
        let issue = ConfigIssue::error("max_batch_size", "too big");
        assert_eq!(issue.to_string(), "[ERROR] max_batch_size: too big");
    }
}
