//! DataForSEO API client
//!
//! Fetches domain authority (overview plus backlink summary) and starts
//! technical on-page audits. Requests use HTTP Basic auth.

use chrono::Utc;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use super::{domain_of, DomainAnalysis, OnPageAudit, SourceError};
use crate::cache::{Cached, ResponseCache};
use crate::config::Credentials;

/// Base URL for the DataForSEO v3 API
const DATAFORSEO_BASE_URL: &str = "https://api.dataforseo.com/v3";

/// Location code for the United States
const LOCATION_CODE_US: u32 = 2840;

/// Pages crawled by an on-page audit
const MAX_CRAWL_PAGES: u32 = 100;

/// Client for the DataForSEO domain analytics, backlinks and on-page APIs
#[derive(Debug, Clone)]
pub struct DataForSeoClient {
    http_client: Client,
    cache: Arc<ResponseCache>,
    /// Base URL for the API (allows override for testing)
    base_url: String,
    login: Option<String>,
    password: Option<String>,
}

impl DataForSeoClient {
    pub fn new(cache: Arc<ResponseCache>, credentials: &Credentials) -> Self {
        Self {
            http_client: Client::new(),
            cache,
            base_url: DATAFORSEO_BASE_URL.to_string(),
            login: credentials.dataforseo_login.clone(),
            password: credentials.dataforseo_password.clone(),
        }
    }

    /// Points the client at a different server
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn credentials(&self) -> Result<(&str, &str), SourceError> {
        match (self.login.as_deref(), self.password.as_deref()) {
            (Some(login), Some(password)) => Ok((login, password)),
            _ => Err(SourceError::MissingCredentials("DataForSEO")),
        }
    }

    /// Fetches the domain overview and backlink summary for the site's domain
    ///
    /// Cached under `dataforseo_domain_analysis` with `{domain, analysis}`.
    pub async fn domain_analysis(
        &self,
        website_url: &str,
    ) -> Result<Cached<DomainAnalysis>, SourceError> {
        self.credentials()?;
        let domain = domain_of(website_url)?;
        let params = json!({"domain": domain, "analysis": "comprehensive"});

        self.cache
            .fetch_or_insert("dataforseo_domain_analysis", &params, || async {
                let domain_overview = self
                    .post(
                        "domain_analytics/overview/live",
                        json!([{
                            "target": domain,
                            "location_code": LOCATION_CODE_US,
                            "language_code": "en"
                        }]),
                    )
                    .await?;

                let backlink_summary = self
                    .post(
                        "backlinks/summary/live",
                        json!([{
                            "target": domain,
                            "internal_list_limit": 10,
                            "backlinks_status_type": "live"
                        }]),
                    )
                    .await?;

                Ok(DomainAnalysis {
                    domain: domain.clone(),
                    domain_overview,
                    backlink_summary,
                    fetched_at: Utc::now(),
                })
            })
            .await
    }

    /// Submits a technical on-page audit and returns the task id
    ///
    /// Cached under `dataforseo_onpage_audit` with `{url, audit}`.
    pub async fn on_page_audit(
        &self,
        website_url: &str,
    ) -> Result<Cached<OnPageAudit>, SourceError> {
        self.credentials()?;
        let params = json!({"url": website_url, "audit": "technical"});

        self.cache
            .fetch_or_insert("dataforseo_onpage_audit", &params, || async {
                let response = self
                    .post(
                        "on_page/task_post",
                        json!([{
                            "target": website_url,
                            "max_crawl_pages": MAX_CRAWL_PAGES,
                            "load_resources": true,
                            "enable_javascript": true,
                            "enable_browser_rendering": true
                        }]),
                    )
                    .await?;

                let audit_task_id = response
                    .pointer("/tasks/0/id")
                    .and_then(Value::as_str)
                    .map(str::to_string);

                Ok(OnPageAudit {
                    target: website_url.to_string(),
                    audit_task_id,
                    status: "audit_started".to_string(),
                    requested_at: Utc::now(),
                })
            })
            .await
    }

    async fn post(&self, endpoint: &str, body: Value) -> Result<Value, SourceError> {
        let (login, password) = self.credentials()?;
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), endpoint);
        debug!(%url, "DataForSEO request");

        let response = self
            .http_client
            .post(&url)
            .basic_auth(login, Some(password))
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DEFAULT_TTL;
    use tempfile::TempDir;
    use wiremock::matchers::{basic_auth, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credentials() -> Credentials {
        Credentials {
            dataforseo_login: Some("user".to_string()),
            dataforseo_password: Some("pass".to_string()),
            ..Credentials::default()
        }
    }

    fn create_client(base_url: &str) -> (DataForSeoClient, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let cache = Arc::new(ResponseCache::new(temp_dir.path(), DEFAULT_TTL));
        let client = DataForSeoClient::new(cache, &credentials()).with_base_url(base_url);
        (client, temp_dir)
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_without_network() {
        let temp_dir = TempDir::new().unwrap();
        let cache = Arc::new(ResponseCache::new(temp_dir.path(), DEFAULT_TTL));
        let client = DataForSeoClient::new(cache, &Credentials::default())
            .with_base_url("http://127.0.0.1:9");

        let err = client.domain_analysis("example.com").await.unwrap_err();
        assert!(matches!(err, SourceError::MissingCredentials("DataForSEO")));
    }

    #[tokio::test]
    async fn test_domain_analysis_calls_both_endpoints_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/domain_analytics/overview/live"))
            .and(basic_auth("user", "pass"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"tasks": [{"result": [{"rank": 57}]}]})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/backlinks/summary/live"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"tasks": [{"result": [{"backlinks": 1200}]}]})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let (client, _temp_dir) = create_client(&server.uri());

        let first = client.domain_analysis("https://example.com/about").await.unwrap();
        assert!(!first.from_cache);
        assert_eq!(first.data.domain, "example.com");
        assert_eq!(
            first.data.domain_overview.pointer("/tasks/0/result/0/rank"),
            Some(&json!(57))
        );

        // Same domain, different path: served from cache
        let second = client.domain_analysis("example.com").await.unwrap();
        assert!(second.from_cache);
        assert_eq!(second.data, first.data);
    }

    #[tokio::test]
    async fn test_on_page_audit_extracts_task_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/on_page/task_post"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tasks": [{"id": "07281559-0695-0216-0000-c269be8b7592"}]
            })))
            .mount(&server)
            .await;

        let (client, _temp_dir) = create_client(&server.uri());
        let audit = client.on_page_audit("https://example.com").await.unwrap();

        assert_eq!(
            audit.data.audit_task_id.as_deref(),
            Some("07281559-0695-0216-0000-c269be8b7592")
        );
        assert_eq!(audit.data.status, "audit_started");
    }

    #[tokio::test]
    async fn test_error_status_is_not_cached() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;

        let (client, _temp_dir) = create_client(&server.uri());

        assert!(matches!(
            client.on_page_audit("https://example.com").await,
            Err(SourceError::Http(_))
        ));
        assert!(client.on_page_audit("https://example.com").await.is_err());
    }
}
