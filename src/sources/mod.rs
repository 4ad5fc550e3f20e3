//! Data sources for SEO analysis
//!
//! Each client wraps one external API. Every cached call goes through the
//! shared [`ResponseCache`](crate::cache::ResponseCache) under an operation
//! name specific to that API method, so repeated analyses of the same site
//! reuse earlier responses until they expire.

pub mod dataforseo;
pub mod keywords;
pub mod perplexity;
pub mod site;

pub use dataforseo::DataForSeoClient;
pub use keywords::KeywordsClient;
pub use perplexity::PerplexityClient;
pub use site::SiteProbe;

use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors that can occur when fetching from a data source
#[derive(Debug, Error)]
pub enum SourceError {
    /// Credentials for the provider are not configured
    #[error("{0} credentials not configured")]
    MissingCredentials(&'static str),

    /// HTTP request failed or returned an error status
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Failed to parse a JSON response
    #[error("Failed to parse JSON response: {0}")]
    Parse(#[from] serde_json::Error),

    /// The response parsed but lacks something we need
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// The input URL could not be understood
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// Basic on-page facts gathered by fetching a site directly
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteProfile {
    pub url: String,
    pub status_code: Option<u16>,
    /// Seconds taken to fetch the page
    pub load_time: Option<f64>,
    pub content_type: String,
    pub https: bool,
    pub title: String,
    pub meta_description: String,
    pub meta_keywords: String,
    pub h1_tags: Vec<String>,
    /// Whether a viewport meta tag is present
    pub responsive: bool,
    pub language: String,
    pub robots_txt_exists: bool,
    pub sitemap_exists: bool,
    /// Set when the page itself could not be fetched
    pub error: Option<String>,
}

/// Domain overview and backlink summary from DataForSEO
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainAnalysis {
    pub domain: String,
    pub domain_overview: Value,
    pub backlink_summary: Value,
    pub fetched_at: DateTime<Utc>,
}

/// A submitted on-page audit task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnPageAudit {
    pub target: String,
    pub audit_task_id: Option<String>,
    pub status: String,
    pub requested_at: DateTime<Utc>,
}

/// Search metrics for one keyword
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordMetric {
    pub keyword: String,
    pub volume: Option<u64>,
    pub cpc: Option<f64>,
    pub competition: Option<f64>,
}

/// Search metrics for a batch of keywords
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordData {
    pub country: String,
    pub keywords: Vec<KeywordMetric>,
    pub credits_used: f64,
    pub fetched_at: DateTime<Utc>,
}

/// Keywords related to a seed keyword
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedKeywords {
    pub seed: String,
    pub keywords: Vec<String>,
    pub fetched_at: DateTime<Utc>,
}

/// Open-ended AI-generated text with its provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPayload {
    pub provider: String,
    pub model: String,
    pub content: String,
    pub fetched_at: DateTime<Utc>,
}

/// Prefixes `https://` when the input has no scheme
pub fn normalize_url(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

/// Extracts the host name from a URL, accepting inputs without a scheme
pub fn domain_of(input: &str) -> Result<String, SourceError> {
    let url = Url::parse(&normalize_url(input))
        .map_err(|e| SourceError::InvalidUrl(format!("{input}: {e}")))?;
    url.host_str()
        .map(|h| h.to_ascii_lowercase())
        .ok_or_else(|| SourceError::InvalidUrl(format!("{input}: no host")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_url_adds_https() {
        assert_eq!(normalize_url("example.com"), "https://example.com");
        assert_eq!(normalize_url(" http://example.com "), "http://example.com");
        assert_eq!(normalize_url("https://example.com/a"), "https://example.com/a");
    }

    #[test]
    fn test_domain_of_strips_scheme_and_path() {
        assert_eq!(domain_of("https://Example.com/blog/post").unwrap(), "example.com");
        assert_eq!(domain_of("shop.example.com").unwrap(), "shop.example.com");
        assert_eq!(domain_of("http://example.com:8080/x").unwrap(), "example.com");
    }

    #[test]
    fn test_domain_of_rejects_garbage() {
        assert!(matches!(domain_of("https://"), Err(SourceError::InvalidUrl(_))));
    }

    #[test]
    fn test_missing_credentials_message() {
        let err = SourceError::MissingCredentials("DataForSEO");
        assert_eq!(err.to_string(), "DataForSEO credentials not configured");
    }
}
