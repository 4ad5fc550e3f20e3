//! Perplexity API client for competitive analysis
//!
//! Asks an online model about a site's competitive landscape. The answer is
//! free text, so it is returned as a [`RawPayload`].

use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use super::{RawPayload, SourceError};
use crate::cache::{Cached, ResponseCache};
use crate::config::Credentials;

/// Base URL for the Perplexity API
const PERPLEXITY_BASE_URL: &str = "https://api.perplexity.ai";

/// Default online model
const DEFAULT_MODEL: &str = "sonar";

const MAX_TOKENS: u32 = 3000;

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

/// Client for Perplexity chat completions
#[derive(Debug, Clone)]
pub struct PerplexityClient {
    http_client: Client,
    cache: Arc<ResponseCache>,
    /// Base URL for the API (allows override for testing)
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl PerplexityClient {
    pub fn new(cache: Arc<ResponseCache>, credentials: &Credentials) -> Self {
        Self {
            http_client: Client::new(),
            cache,
            base_url: PERPLEXITY_BASE_URL.to_string(),
            api_key: credentials.perplexity_api_key.clone(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Points the client at a different server
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Produces a competitive analysis of `website_url` within `industry`
    ///
    /// Cached under `perplexity_competitor_analysis` with `{website, industry, model}`.
    pub async fn competitor_analysis(
        &self,
        website_url: &str,
        industry: &str,
    ) -> Result<Cached<RawPayload>, SourceError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(SourceError::MissingCredentials("Perplexity"))?;
        let params = json!({"website": website_url, "industry": industry, "model": self.model});

        self.cache
            .fetch_or_insert("perplexity_competitor_analysis", &params, || async {
                let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
                debug!(%url, model = %self.model, "Perplexity request");

                let body = json!({
                    "model": self.model,
                    "messages": [{
                        "role": "user",
                        "content": competitor_prompt(website_url, industry)
                    }],
                    "max_tokens": MAX_TOKENS
                });

                let response = self
                    .http_client
                    .post(&url)
                    .bearer_auth(api_key)
                    .json(&body)
                    .send()
                    .await?
                    .error_for_status()?;
                let text = response.text().await?;
                let chat: ChatResponse = serde_json::from_str(&text)?;

                let content = chat
                    .choices
                    .into_iter()
                    .next()
                    .map(|c| c.message.content)
                    .ok_or_else(|| {
                        SourceError::UnexpectedResponse("no choices returned".to_string())
                    })?;

                Ok(RawPayload {
                    provider: "perplexity".to_string(),
                    model: self.model.clone(),
                    content,
                    fetched_at: Utc::now(),
                })
            })
            .await
    }
}

fn competitor_prompt(website_url: &str, industry: &str) -> String {
    format!(
        "Analyze the competitive landscape for {website_url} in the {industry} industry. Provide:\n\n\
         1. Top 5 direct competitors with their strengths/weaknesses\n\
         2. Market positioning analysis\n\
         3. Content strategy comparison\n\
         4. SEO strategy insights from competitor analysis\n\
         5. Opportunity gaps in the market\n\
         6. Recent industry trends and changes\n\n\
         Focus on actionable competitive insights for SEO and marketing strategy."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DEFAULT_TTL;
    use tempfile::TempDir;
    use wiremock::matchers::{bearer_token, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_client(base_url: &str) -> (PerplexityClient, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let cache = Arc::new(ResponseCache::new(temp_dir.path(), DEFAULT_TTL));
        let credentials = Credentials {
            perplexity_api_key: Some("pplx-key".to_string()),
            ..Credentials::default()
        };
        (PerplexityClient::new(cache, &credentials).with_base_url(base_url), temp_dir)
    }

    #[test]
    fn test_prompt_mentions_site_and_industry() {
        let prompt = competitor_prompt("https://example.com", "saas");
        assert!(prompt.contains("https://example.com"));
        assert!(prompt.contains("saas industry"));
    }

    #[tokio::test]
    async fn test_competitor_analysis_returns_message_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(bearer_token("pplx-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "Competitors: A, B, C"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (client, _temp_dir) = create_client(&server.uri());

        let first = client.competitor_analysis("https://example.com", "saas").await.unwrap();
        let second = client.competitor_analysis("https://example.com", "saas").await.unwrap();

        assert_eq!(first.data.content, "Competitors: A, B, C");
        assert_eq!(first.data.provider, "perplexity");
        assert!(second.from_cache);
    }

    #[tokio::test]
    async fn test_model_is_part_of_the_cache_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "Competitors: A"}}]
            })))
            .expect(2)
            .mount(&server)
            .await;

        let (client, _temp_dir) = create_client(&server.uri());
        let larger = client.clone().with_model("sonar-pro");

        let first = client.competitor_analysis("https://example.com", "saas").await.unwrap();
        let second = larger.competitor_analysis("https://example.com", "saas").await.unwrap();

        assert!(!first.from_cache);
        assert!(!second.from_cache);
        assert_eq!(second.data.model, "sonar-pro");
    }

    #[tokio::test]
    async fn test_empty_choices_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let (client, _temp_dir) = create_client(&server.uri());
        let err = client
            .competitor_analysis("https://example.com", "saas")
            .await
            .unwrap_err();

        assert!(matches!(err, SourceError::UnexpectedResponse(_)));
    }
}
