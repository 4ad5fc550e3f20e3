//! Runtime configuration
//!
//! All environment reading happens here. The rest of the crate receives a
//! [`Config`] (or pieces built from it) and never touches the process
//! environment itself.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::aggregator::MultiSourceAggregator;
use crate::cache::{CacheSwitch, ResponseCache};

/// Fallback cache directory when no home directory is available
const FALLBACK_CACHE_DIR: &str = "cache";

/// Errors raised while reading configuration values
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable holds something that cannot be parsed
    #[error("invalid value for {var}: '{value}' ({expected})")]
    InvalidValue {
        var: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// API credentials, all optional. A client whose credentials are missing
/// reports the fact as a task failure instead of calling out.
#[derive(Clone, Default)]
pub struct Credentials {
    pub dataforseo_login: Option<String>,
    pub dataforseo_password: Option<String>,
    pub keywords_everywhere_api_key: Option<String>,
    pub perplexity_api_key: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn redact(v: &Option<String>) -> &'static str {
            if v.is_some() {
                "<set>"
            } else {
                "<unset>"
            }
        }
        f.debug_struct("Credentials")
            .field("dataforseo_login", &redact(&self.dataforseo_login))
            .field("dataforseo_password", &redact(&self.dataforseo_password))
            .field(
                "keywords_everywhere_api_key",
                &redact(&self.keywords_everywhere_api_key),
            )
            .field("perplexity_api_key", &redact(&self.perplexity_api_key))
            .finish()
    }
}

/// Settings for the cache, the aggregator and the API clients
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether responses are cached (`ENABLE_CACHING`)
    pub enable_cache: bool,
    /// Cache entry lifetime in hours (`CACHE_DURATION`)
    pub ttl_hours: u64,
    /// Concurrent API calls per analysis (`MAX_CONCURRENT_REQUESTS`)
    pub max_workers: usize,
    /// Per-source timeout in seconds (`TASK_TIMEOUT_SECS`)
    pub task_timeout_secs: u64,
    /// Cache directory override (`SEOSCOUT_CACHE_DIR`)
    pub cache_dir: Option<PathBuf>,
    pub credentials: Credentials,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enable_cache: true,
            ttl_hours: 24,
            max_workers: 3,
            task_timeout_secs: 60,
            cache_dir: None,
            credentials: Credentials::default(),
        }
    }
}

impl Config {
    /// Builds a config from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Builds a config from any variable lookup, falling back to defaults
    /// for unset variables. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let enable_cache = match get("ENABLE_CACHING") {
            Some(v) => parse_bool("ENABLE_CACHING", &v)?,
            None => defaults.enable_cache,
        };
        let ttl_hours = match get("CACHE_DURATION") {
            Some(v) => parse_number("CACHE_DURATION", &v)?,
            None => defaults.ttl_hours,
        };
        let max_workers = match get("MAX_CONCURRENT_REQUESTS") {
            Some(v) => parse_number("MAX_CONCURRENT_REQUESTS", &v)?,
            None => defaults.max_workers,
        };
        let task_timeout_secs = match get("TASK_TIMEOUT_SECS") {
            Some(v) => parse_number("TASK_TIMEOUT_SECS", &v)?,
            None => defaults.task_timeout_secs,
        };

        Ok(Self {
            enable_cache,
            ttl_hours,
            max_workers,
            task_timeout_secs,
            cache_dir: get("SEOSCOUT_CACHE_DIR").map(PathBuf::from),
            credentials: Credentials {
                dataforseo_login: get("DATAFORSEO_LOGIN"),
                dataforseo_password: get("DATAFORSEO_PASSWORD"),
                keywords_everywhere_api_key: get("KEYWORDS_EVERYWHERE_API_KEY"),
                perplexity_api_key: get("PERPLEXITY_API_KEY"),
            },
        })
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_hours.saturating_mul(60 * 60))
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    /// The configured cache directory, else the platform cache dir, else `./cache`
    pub fn resolved_cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .or_else(ResponseCache::default_dir)
            .unwrap_or_else(|| PathBuf::from(FALLBACK_CACHE_DIR))
    }

    pub fn response_cache(&self) -> ResponseCache {
        ResponseCache::with_switch(
            self.resolved_cache_dir(),
            self.ttl(),
            CacheSwitch::new(self.enable_cache),
        )
    }

    pub fn aggregator(&self) -> MultiSourceAggregator {
        MultiSourceAggregator::new(self.max_workers, self.task_timeout())
    }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            var,
            value: value.to_string(),
            expected: "a boolean",
        }),
    }
}

fn parse_number<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        var,
        value: value.to_string(),
        expected: "a non-negative integer",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_defaults_when_environment_is_empty() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert!(config.enable_cache);
        assert_eq!(config.ttl_hours, 24);
        assert_eq!(config.max_workers, 3);
        assert_eq!(config.task_timeout(), Duration::from_secs(60));
        assert!(config.credentials.perplexity_api_key.is_none());
    }

    #[test]
    fn test_reads_all_variables() {
        let config = Config::from_lookup(lookup_from(&[
            ("ENABLE_CACHING", "False"),
            ("CACHE_DURATION", "6"),
            ("MAX_CONCURRENT_REQUESTS", "8"),
            ("TASK_TIMEOUT_SECS", "15"),
            ("SEOSCOUT_CACHE_DIR", "/tmp/seo"),
            ("DATAFORSEO_LOGIN", "user"),
            ("DATAFORSEO_PASSWORD", "pass"),
            ("KEYWORDS_EVERYWHERE_API_KEY", "kw-key"),
            ("PERPLEXITY_API_KEY", "pplx-key"),
        ]))
        .unwrap();

        assert!(!config.enable_cache);
        assert_eq!(config.ttl(), Duration::from_secs(6 * 3600));
        assert_eq!(config.max_workers, 8);
        assert_eq!(config.task_timeout_secs, 15);
        assert_eq!(config.resolved_cache_dir(), PathBuf::from("/tmp/seo"));
        assert_eq!(config.credentials.dataforseo_login.as_deref(), Some("user"));
        assert_eq!(config.credentials.keywords_everywhere_api_key.as_deref(), Some("kw-key"));
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        let config = Config::from_lookup(lookup_from(&[
            ("CACHE_DURATION", "  "),
            ("PERPLEXITY_API_KEY", ""),
        ]))
        .unwrap();
        assert_eq!(config.ttl_hours, 24);
        assert!(config.credentials.perplexity_api_key.is_none());
    }

    #[test]
    fn test_invalid_number_is_reported() {
        let err =
            Config::from_lookup(lookup_from(&[("MAX_CONCURRENT_REQUESTS", "many")])).unwrap_err();
        assert!(err.to_string().contains("MAX_CONCURRENT_REQUESTS"));
        assert!(err.to_string().contains("many"));
    }

    #[test]
    fn test_invalid_bool_is_reported() {
        let err = Config::from_lookup(lookup_from(&[("ENABLE_CACHING", "maybe")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { var: "ENABLE_CACHING", .. }));
    }

    #[test]
    fn test_response_cache_follows_enable_flag() {
        let config = Config {
            enable_cache: false,
            cache_dir: Some(PathBuf::from("/tmp/unused")),
            ..Config::default()
        };
        let cache = config.response_cache();
        assert!(!cache.is_enabled());
        assert_eq!(cache.ttl(), Duration::from_secs(24 * 3600));
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let config =
            Config::from_lookup(lookup_from(&[("PERPLEXITY_API_KEY", "secret-123")])).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("secret-123"));
        assert!(debug.contains("<set>"));
    }
}
