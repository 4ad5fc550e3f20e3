//! Keywords Everywhere API client
//!
//! Looks up search volume, CPC and competition for keywords, and finds
//! related keywords for a seed term.

use chrono::Utc;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use super::{KeywordData, KeywordMetric, RelatedKeywords, SourceError};
use crate::cache::{Cached, ResponseCache};
use crate::config::Credentials;

/// Base URL for the Keywords Everywhere API
const KEYWORDS_EVERYWHERE_BASE_URL: &str = "https://api.keywordseverywhere.com/v1";

/// Client for the Keywords Everywhere API
#[derive(Debug, Clone)]
pub struct KeywordsClient {
    http_client: Client,
    cache: Arc<ResponseCache>,
    /// Base URL for the API (allows override for testing)
    base_url: String,
    api_key: Option<String>,
}

impl KeywordsClient {
    pub fn new(cache: Arc<ResponseCache>, credentials: &Credentials) -> Self {
        Self {
            http_client: Client::new(),
            cache,
            base_url: KEYWORDS_EVERYWHERE_BASE_URL.to_string(),
            api_key: credentials.keywords_everywhere_api_key.clone(),
        }
    }

    /// Points the client at a different server
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn api_key(&self) -> Result<&str, SourceError> {
        self.api_key
            .as_deref()
            .ok_or(SourceError::MissingCredentials("Keywords Everywhere"))
    }

    /// Fetches metrics for `keywords` in `country`
    ///
    /// The keyword list is sorted for the cache key, so the same set in any
    /// order hits the same entry.
    pub async fn keyword_data(
        &self,
        keywords: &[String],
        country: &str,
    ) -> Result<Cached<KeywordData>, SourceError> {
        self.api_key()?;
        let mut sorted = keywords.to_vec();
        sorted.sort();
        let params = json!({"keywords": sorted, "country": country});

        self.cache
            .fetch_or_insert("keywords_everywhere_data", &params, || async {
                let response = self
                    .post(
                        "get_keyword_data",
                        json!({"kw": keywords, "country": country, "currency": "USD"}),
                    )
                    .await?;

                let metrics = response
                    .get("data")
                    .and_then(Value::as_array)
                    .map(|items| items.iter().filter_map(parse_metric).collect())
                    .unwrap_or_default();
                let credits_used = response
                    .get("credits")
                    .and_then(Value::as_f64)
                    .unwrap_or(0.0);

                Ok(KeywordData {
                    country: country.to_string(),
                    keywords: metrics,
                    credits_used,
                    fetched_at: Utc::now(),
                })
            })
            .await
    }

    /// Fetches keywords related to `seed`
    pub async fn related_keywords(
        &self,
        seed: &str,
        country: &str,
    ) -> Result<Cached<RelatedKeywords>, SourceError> {
        self.api_key()?;
        let params = json!({"seed": seed, "country": country, "type": "related"});

        self.cache
            .fetch_or_insert("keywords_everywhere_related", &params, || async {
                let response = self
                    .post(
                        "get_related_keywords",
                        json!({"kw": seed, "country": country, "currency": "USD"}),
                    )
                    .await?;

                let keywords = response
                    .get("data")
                    .and_then(Value::as_array)
                    .map(|items| items.iter().filter_map(keyword_text).collect())
                    .unwrap_or_default();

                Ok(RelatedKeywords {
                    seed: seed.to_string(),
                    keywords,
                    fetched_at: Utc::now(),
                })
            })
            .await
    }

    async fn post(&self, endpoint: &str, body: Value) -> Result<Value, SourceError> {
        let api_key = self.api_key()?;
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), endpoint);
        debug!(%url, "Keywords Everywhere request");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Reads one record of `get_keyword_data`.
///
/// `cpc` arrives either as a number or as `{"currency": .., "value": ..}`,
/// and numbers are sometimes sent as strings.
fn parse_metric(item: &Value) -> Option<KeywordMetric> {
    let keyword = item.get("keyword")?.as_str()?.to_string();
    let cpc = item.get("cpc").and_then(|c| match c {
        Value::Object(_) => c.get("value").and_then(number),
        other => number(other),
    });

    Some(KeywordMetric {
        keyword,
        volume: item.get("vol").and_then(number).map(|v| v.max(0.0) as u64),
        cpc,
        competition: item.get("competition").and_then(number),
    })
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn keyword_text(item: &Value) -> Option<String> {
    match item {
        Value::String(s) => Some(s.clone()),
        Value::Object(_) => item.get("keyword")?.as_str().map(str::to_string),
        _ => None,
    }
}
