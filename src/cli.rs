//! Command-line interface parsing for seoscout
//!
//! This module handles parsing of CLI arguments using clap: the `analyze`
//! subcommand with its overrides for the environment-derived [`Config`], and
//! `cache-key` for locating a cached response on disk.

use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use thiserror::Error;

use crate::analysis::AnalysisType;
use crate::config::Config;

/// Error types for CLI argument parsing
#[derive(Debug, Error)]
pub enum CliError {
    /// The specified analysis type is not recognized
    #[error("Invalid analysis type: '{0}'. Valid types: quick, comprehensive, technical, local")]
    InvalidAnalysisType(String),

    /// The parameters given to cache-key are not a JSON object
    #[error("Invalid parameters: {0}. Expected a JSON object such as '{{\"q\": \"seo\"}}'")]
    InvalidParams(String),
}

/// seoscout - Gather SEO data for a website from several APIs at once
#[derive(Parser, Debug)]
#[command(name = "seoscout")]
#[command(about = "SEO data gathering with cached, parallel API calls")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Analyze a website and report which data sources contributed
    ///
    /// Examples:
    ///   seoscout analyze example.com
    ///   seoscout analyze https://example.com --type technical --workers 2
    Analyze(AnalyzeArgs),

    /// Print the cache key for an operation and its JSON parameters
    CacheKey {
        /// Operation name, e.g. dataforseo_domain_analysis
        operation: String,
        /// Parameters as a JSON object
        params: String,
    },
}

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Website to analyze; https:// is assumed when no scheme is given
    pub url: String,

    /// Analysis type: quick, comprehensive, technical or local
    #[arg(short = 't', long = "type", default_value = "comprehensive", value_name = "TYPE")]
    pub analysis_type: String,

    /// Maximum concurrent API calls
    #[arg(short, long, value_name = "N")]
    pub workers: Option<usize>,

    /// Per-source timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Bypass the response cache
    #[arg(long)]
    pub no_cache: bool,

    /// Directory for cached responses
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Cache entry lifetime in hours
    #[arg(long, value_name = "HOURS")]
    pub ttl_hours: Option<u64>,

    /// Country for keyword metrics
    #[arg(long, default_value = "US")]
    pub country: String,

    /// Print the full report as JSON
    #[arg(long)]
    pub json: bool,
}

impl AnalyzeArgs {
    /// Applies command-line overrides on top of the environment config
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(workers) = self.workers {
            config.max_workers = workers;
        }
        if let Some(timeout) = self.timeout {
            config.task_timeout_secs = timeout;
        }
        if self.no_cache {
            config.enable_cache = false;
        }
        if let Some(dir) = &self.cache_dir {
            config.cache_dir = Some(dir.clone());
        }
        if let Some(ttl) = self.ttl_hours {
            config.ttl_hours = ttl;
        }
    }
}

/// Parses an analysis type argument.
///
/// # Returns
/// * `Ok(AnalysisType)` if the string names a valid type
/// * `Err(CliError::InvalidAnalysisType)` otherwise
pub fn parse_analysis_type(s: &str) -> Result<AnalysisType, CliError> {
    s.parse().map_err(|_| CliError::InvalidAnalysisType(s.to_string()))
}

/// Parses cache-key parameters, which must form a JSON object
pub fn parse_params(s: &str) -> Result<Value, CliError> {
    match serde_json::from_str::<Value>(s) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(_) => Err(CliError::InvalidParams("not an object".to_string())),
        Err(e) => Err(CliError::InvalidParams(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyze_args(argv: &[&str]) -> AnalyzeArgs {
        let mut full = vec!["seoscout", "analyze"];
        full.extend_from_slice(argv);
        match Cli::parse_from(full).command {
            Command::Analyze(args) => args,
            other => panic!("expected analyze, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_analysis_type_valid() {
        assert_eq!(parse_analysis_type("quick").unwrap(), AnalysisType::Quick);
        assert_eq!(parse_analysis_type("technical").unwrap(), AnalysisType::Technical);
        assert_eq!(
            parse_analysis_type("comprehensive").unwrap(),
            AnalysisType::Comprehensive
        );
        assert_eq!(parse_analysis_type("local").unwrap(), AnalysisType::Local);
    }

    #[test]
    fn test_parse_analysis_type_invalid() {
        let err = parse_analysis_type("deep").unwrap_err();
        assert!(err.to_string().contains("Invalid analysis type"));
        assert!(err.to_string().contains("deep"));
    }

    #[test]
    fn test_parse_params_requires_object() {
        assert!(parse_params(r#"{"q": "seo"}"#).is_ok());
        assert!(parse_params(r#"["q"]"#).is_err());
        assert!(parse_params("not json").is_err());
    }

    #[test]
    fn test_analyze_defaults() {
        let args = analyze_args(&["example.com"]);
        assert_eq!(args.url, "example.com");
        assert_eq!(args.analysis_type, "comprehensive");
        assert_eq!(args.country, "US");
        assert!(args.workers.is_none());
        assert!(!args.no_cache);
        assert!(!args.json);
    }

    #[test]
    fn test_analyze_overrides_apply_to_config() {
        let args = analyze_args(&[
            "example.com",
            "--type",
            "technical",
            "--workers",
            "5",
            "--timeout",
            "20",
            "--no-cache",
            "--cache-dir",
            "/tmp/seo-cache",
            "--ttl-hours",
            "2",
        ]);

        let mut config = Config::default();
        args.apply_overrides(&mut config);

        assert_eq!(config.max_workers, 5);
        assert_eq!(config.task_timeout_secs, 20);
        assert!(!config.enable_cache);
        assert_eq!(config.cache_dir, Some(PathBuf::from("/tmp/seo-cache")));
        assert_eq!(config.ttl_hours, 2);
    }

    #[test]
    fn test_no_overrides_keep_config() {
        let args = analyze_args(&["example.com"]);
        let mut config = Config::default();
        args.apply_overrides(&mut config);
        assert_eq!(config.max_workers, 3);
        assert!(config.enable_cache);
    }

    #[test]
    fn test_verbose_is_global() {
        let cli = Cli::parse_from(["seoscout", "analyze", "example.com", "-v"]);
        assert!(cli.verbose);
    }

    #[test]
    fn test_cache_key_subcommand() {
        let cli = Cli::parse_from(["seoscout", "cache-key", "kw", r#"{"q":"seo"}"#]);
        match cli.command {
            Command::CacheKey { operation, params } => {
                assert_eq!(operation, "kw");
                assert_eq!(params, r#"{"q":"seo"}"#);
            }
            other => panic!("expected cache-key, got {:?}", other),
        }
    }
}
