//! SEO analysis pipeline
//!
//! Probes the site first, derives an industry guess and candidate keywords
//! from what it finds, then fans out to the external data sources through
//! the [`MultiSourceAggregator`]. The result records which sources
//! contributed and why the others did not.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};
use std::time::Instant;
use thiserror::Error;
use tracing::info;

use crate::aggregator::{
    AggregationResult, AggregationTask, AggregatorError, MultiSourceAggregator,
};
use crate::cache::{Cached, ResponseCache};
use crate::config::Config;
use crate::recommendations::{self, Recommendation};
use crate::sources::{
    normalize_url, DataForSeoClient, KeywordsClient, PerplexityClient, SiteProbe, SiteProfile,
    SourceError,
};

/// Keywords sent for metrics lookup, to keep API credit use down
const MAX_LOOKUP_KEYWORDS: usize = 10;

/// Keywords kept from page content
const MAX_EXTRACTED_KEYWORDS: usize = 15;

/// Default country for keyword metrics
const DEFAULT_COUNTRY: &str = "US";

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by", "is",
    "are", "was", "were", "be", "been", "being", "have", "has", "had", "do", "does", "did", "will",
    "would", "could", "should",
];

/// Industries checked in order; the first with a matching term wins
const INDUSTRY_TERMS: &[(&str, &[&str])] = &[
    ("ecommerce", &["shop", "buy", "store", "product", "cart", "checkout"]),
    ("restaurant", &["restaurant", "menu", "food", "dining", "kitchen"]),
    ("legal", &["lawyer", "attorney", "legal", "law", "court"]),
    ("medical", &["doctor", "medical", "health", "clinic", "hospital"]),
    ("real_estate", &["real estate", "property", "homes", "realtor"]),
    ("local_service", &["service", "local", "repair", "cleaning", "plumbing"]),
    ("saas", &["software", "app", "platform", "service", "cloud"]),
    ("blog", &["blog", "article", "news", "post"]),
];

static WORD_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b[a-zA-Z]{3,}\b").unwrap());

/// How much data an analysis collects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisType {
    /// Keyword data only
    Quick,
    /// Every source
    Comprehensive,
    /// Domain authority and on-page audit only
    Technical,
    /// Site probe and on-page recommendations, no external sources
    Local,
}

/// An analysis type name that is not recognized
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown analysis type: '{0}'")]
pub struct UnknownAnalysisType(pub String);

impl FromStr for AnalysisType {
    type Err = UnknownAnalysisType;

    /// Parses an analysis type name, case-insensitively
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quick" => Ok(AnalysisType::Quick),
            "comprehensive" | "full" => Ok(AnalysisType::Comprehensive),
            "technical" | "tech" => Ok(AnalysisType::Technical),
            "local" => Ok(AnalysisType::Local),
            _ => Err(UnknownAnalysisType(s.to_string())),
        }
    }
}

impl AnalysisType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisType::Quick => "quick",
            AnalysisType::Comprehensive => "comprehensive",
            AnalysisType::Technical => "technical",
            AnalysisType::Local => "local",
        }
    }

    fn includes_technical(&self) -> bool {
        matches!(self, AnalysisType::Comprehensive | AnalysisType::Technical)
    }

    fn includes_keywords(&self) -> bool {
        matches!(self, AnalysisType::Comprehensive | AnalysisType::Quick)
    }

    fn includes_competitors(&self) -> bool {
        matches!(self, AnalysisType::Comprehensive)
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything gathered for one site
#[derive(Debug, Clone, Serialize)]
pub struct SeoReport {
    pub website_url: String,
    pub analysis_type: AnalysisType,
    pub industry: String,
    pub generated_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub site: SiteProfile,
    pub extracted_keywords: Vec<String>,
    /// Outcome per external data source
    pub sources: AggregationResult,
    /// Rule-based findings, highest priority first
    pub recommendations: Vec<Recommendation>,
}

impl SeoReport {
    /// e.g. "3 of 4 sources succeeded"
    pub fn summary_line(&self) -> String {
        format!(
            "{} of {} sources succeeded",
            self.sources.success_count(),
            self.sources.len()
        )
    }
}

/// Guesses the site's industry from its title and description
pub fn detect_industry(profile: &SiteProfile) -> &'static str {
    let content = format!("{} {}", profile.title, profile.meta_description).to_lowercase();

    INDUSTRY_TERMS
        .iter()
        .find(|(_, terms)| terms.iter().any(|term| content.contains(term)))
        .map(|(industry, _)| *industry)
        .unwrap_or("general")
}

/// Picks the most frequent non-stop-words from the title, description and H1s.
///
/// Ties keep the order in which words first appear.
pub fn extract_keywords(profile: &SiteProfile) -> Vec<String> {
    let content = format!(
        "{} {} {}",
        profile.title,
        profile.meta_description,
        profile.h1_tags.join(" ")
    )
    .to_lowercase();

    // word -> (count, first position)
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (position, word) in WORD_REGEX.find_iter(&content).map(|m| m.as_str()).enumerate() {
        if STOP_WORDS.contains(&word) {
            continue;
        }
        counts.entry(word).or_insert((0, position)).0 += 1;
    }

    let mut ranked: Vec<(&str, (usize, usize))> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));
    ranked
        .into_iter()
        .take(MAX_EXTRACTED_KEYWORDS)
        .map(|(word, _)| word.to_string())
        .collect()
}

/// Runs full analyses against the configured data sources
#[derive(Debug, Clone)]
pub struct SeoAnalyzer {
    probe: SiteProbe,
    dataforseo: DataForSeoClient,
    keywords: KeywordsClient,
    perplexity: PerplexityClient,
    aggregator: MultiSourceAggregator,
    country: String,
}

impl SeoAnalyzer {
    pub fn new(
        probe: SiteProbe,
        dataforseo: DataForSeoClient,
        keywords: KeywordsClient,
        perplexity: PerplexityClient,
        aggregator: MultiSourceAggregator,
    ) -> Self {
        Self {
            probe,
            dataforseo,
            keywords,
            perplexity,
            aggregator,
            country: DEFAULT_COUNTRY.to_string(),
        }
    }

    /// Wires every client to the shared cache with credentials from `config`
    pub fn from_config(config: &Config, cache: Arc<ResponseCache>) -> Self {
        Self::new(
            SiteProbe::new(),
            DataForSeoClient::new(Arc::clone(&cache), &config.credentials),
            KeywordsClient::new(Arc::clone(&cache), &config.credentials),
            PerplexityClient::new(cache, &config.credentials),
            config.aggregator(),
        )
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = country.into();
        self
    }

    /// Analyzes `website_url`. Individual source failures end up in the
    /// report; only an invalid batch is an error.
    pub async fn analyze(
        &self,
        website_url: &str,
        analysis_type: AnalysisType,
    ) -> Result<SeoReport, AggregatorError> {
        let website_url = normalize_url(website_url);
        let started = Instant::now();
        info!(url = %website_url, %analysis_type, "starting analysis");

        let site = self.probe.probe(&website_url).await;
        let industry = detect_industry(&site);
        let extracted_keywords = extract_keywords(&site);
        info!(industry, keywords = extracted_keywords.len(), "site probed");

        let tasks = self.build_tasks(&website_url, analysis_type, industry, &extracted_keywords);
        // A local analysis has no external sources to query
        let sources = if tasks.is_empty() {
            AggregationResult::default()
        } else {
            self.aggregator.run(tasks).await?
        };
        let mut recommendations = recommendations::generate(&site, &sources);
        recommendations.sort_by_key(|r| r.priority);

        let elapsed = started.elapsed().as_secs_f64();
        Ok(SeoReport {
            website_url,
            analysis_type,
            industry: industry.to_string(),
            generated_at: Utc::now(),
            duration_secs: (elapsed * 100.0).round() / 100.0,
            site,
            extracted_keywords,
            sources,
            recommendations,
        })
    }

    /// One task per data source the analysis type calls for
    pub fn build_tasks(
        &self,
        website_url: &str,
        analysis_type: AnalysisType,
        industry: &str,
        keywords: &[String],
    ) -> Vec<AggregationTask> {
        let mut tasks = Vec::new();

        if analysis_type.includes_technical() {
            let client = self.dataforseo.clone();
            let url = website_url.to_string();
            tasks.push(AggregationTask::new("domain", async move {
                into_payload(client.domain_analysis(&url).await)
            }));

            let client = self.dataforseo.clone();
            let url = website_url.to_string();
            tasks.push(AggregationTask::new("onpage", async move {
                into_payload(client.on_page_audit(&url).await)
            }));
        }

        if analysis_type.includes_keywords() {
            let client = self.keywords.clone();
            let lookup: Vec<String> = keywords.iter().take(MAX_LOOKUP_KEYWORDS).cloned().collect();
            let country = self.country.clone();
            tasks.push(AggregationTask::new("keywords", async move {
                if lookup.is_empty() {
                    return Err(SourceError::UnexpectedResponse(
                        "no candidate keywords found on the page".to_string(),
                    ));
                }
                into_payload(client.keyword_data(&lookup, &country).await)
            }));

            let client = self.keywords.clone();
            let seed = keywords.first().cloned();
            let country = self.country.clone();
            tasks.push(AggregationTask::new("related_keywords", async move {
                let Some(seed) = seed else {
                    return Err(SourceError::UnexpectedResponse(
                        "no seed keyword found on the page".to_string(),
                    ));
                };
                into_payload(client.related_keywords(&seed, &country).await)
            }));
        }

        if analysis_type.includes_competitors() {
            let client = self.perplexity.clone();
            let url = website_url.to_string();
            let industry = industry.to_string();
            tasks.push(AggregationTask::new("competitors", async move {
                into_payload(client.competitor_analysis(&url, &industry).await)
            }));
        }

        tasks
    }
}

fn into_payload<T: Serialize>(
    result: Result<Cached<T>, SourceError>,
) -> Result<Value, SourceError> {
    let cached = result?;
    Ok(serde_json::to_value(cached.data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::FailureKind;
    use crate::cache::DEFAULT_TTL;
    use crate::config::Credentials;
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn profile(title: &str, description: &str, h1: &[&str]) -> SiteProfile {
        SiteProfile {
            title: title.to_string(),
            meta_description: description.to_string(),
            h1_tags: h1.iter().map(|s| s.to_string()).collect(),
            ..SiteProfile::default()
        }
    }

    fn analyzer_without_credentials(temp_dir: &TempDir) -> SeoAnalyzer {
        let cache = Arc::new(ResponseCache::new(temp_dir.path(), DEFAULT_TTL));
        let config = Config {
            credentials: Credentials::default(),
            ..Config::default()
        };
        SeoAnalyzer::from_config(&config, cache)
    }

    #[test]
    fn test_analysis_type_from_str() {
        assert_eq!("quick".parse::<AnalysisType>(), Ok(AnalysisType::Quick));
        assert_eq!("Comprehensive".parse::<AnalysisType>(), Ok(AnalysisType::Comprehensive));
        assert_eq!("tech".parse::<AnalysisType>(), Ok(AnalysisType::Technical));
        assert_eq!("local".parse::<AnalysisType>(), Ok(AnalysisType::Local));
        assert_eq!(
            "deep".parse::<AnalysisType>(),
            Err(UnknownAnalysisType("deep".to_string()))
        );
    }

    #[test]
    fn test_detect_industry_first_match_wins() {
        assert_eq!(detect_industry(&profile("Acme Shop", "", &[])), "ecommerce");
        assert_eq!(detect_industry(&profile("Smith & Co", "Your local attorney", &[])), "legal");
        // "service" appears under local_service before saas
        assert_eq!(detect_industry(&profile("Cloud service", "", &[])), "local_service");
        assert_eq!(detect_industry(&profile("Untitled", "", &[])), "general");
    }

    #[test]
    fn test_extract_keywords_ranks_by_frequency() {
        let keywords = extract_keywords(&profile(
            "Plumbing Repair in Leeds",
            "Emergency plumbing and boiler repair for Leeds homes",
            &["Plumbing experts"],
        ));

        assert_eq!(&keywords[..3], &["plumbing", "repair", "leeds"]);
        assert!(!keywords.contains(&"and".to_string()));
        assert!(!keywords.contains(&"in".to_string()));
    }

    #[test]
    fn test_extract_keywords_caps_length_and_skips_short_words() {
        let title: Vec<String> = (0..30)
            .map(|i| format!("word{}x", "y".repeat(i % 26 + 1)))
            .collect();
        let keywords = extract_keywords(&profile(&title.join(" "), "go to it", &[]));
        assert!(keywords.len() <= MAX_EXTRACTED_KEYWORDS);
        assert!(keywords.iter().all(|k| k.len() >= 3));
    }

    #[test]
    fn test_build_tasks_per_analysis_type() {
        let temp_dir = TempDir::new().unwrap();
        let analyzer = analyzer_without_credentials(&temp_dir);
        let keywords = vec!["seo".to_string()];

        let names = |t: AnalysisType| -> Vec<String> {
            analyzer
                .build_tasks("https://example.com", t, "saas", &keywords)
                .iter()
                .map(|task| task.name().to_string())
                .collect()
        };

        assert_eq!(names(AnalysisType::Technical), vec!["domain", "onpage"]);
        assert_eq!(names(AnalysisType::Quick), vec!["keywords", "related_keywords"]);
        assert_eq!(
            names(AnalysisType::Comprehensive),
            vec!["domain", "onpage", "keywords", "related_keywords", "competitors"]
        );
        assert!(names(AnalysisType::Local).is_empty());
    }

    #[tokio::test]
    async fn test_local_analysis_skips_external_sources() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                "<html><head><title>Corner Bakery</title></head><body></body></html>",
                "text/html",
            ))
            .mount(&server)
            .await;

        let temp_dir = TempDir::new().unwrap();
        let analyzer = analyzer_without_credentials(&temp_dir);
        let report = analyzer
            .analyze(&format!("{}/", server.uri()), AnalysisType::Local)
            .await
            .unwrap();

        assert!(report.sources.is_empty());
        assert_eq!(report.site.title, "Corner Bakery");
        let issues: Vec<&str> = report.recommendations.iter().map(|r| r.issue.as_str()).collect();
        assert!(issues.contains(&"Missing meta description"));
        assert!(issues.contains(&"Not using HTTPS"));
        // High priority findings come before medium ones
        assert_eq!(issues.last(), Some(&"Missing H1 tags"));
    }

    #[tokio::test]
    async fn test_missing_credentials_become_failures() {
        let temp_dir = TempDir::new().unwrap();
        let analyzer = analyzer_without_credentials(&temp_dir);
        let tasks = analyzer.build_tasks(
            "https://example.com",
            AnalysisType::Comprehensive,
            "saas",
            &["seo".to_string()],
        );

        let result = MultiSourceAggregator::new(2, Duration::from_secs(5))
            .run(tasks)
            .await
            .unwrap();

        assert_eq!(result.len(), 5);
        assert_eq!(result.success_count(), 0);
        let failure = result.get("competitors").unwrap().failure().unwrap();
        assert_eq!(failure.kind, FailureKind::Error);
        assert!(failure.reason.contains("Perplexity credentials not configured"));
    }

    #[tokio::test]
    async fn test_empty_keywords_fail_keyword_tasks() {
        let temp_dir = TempDir::new().unwrap();
        let analyzer = analyzer_without_credentials(&temp_dir);
        let tasks =
            analyzer.build_tasks("https://example.com", AnalysisType::Quick, "general", &[]);

        let result = MultiSourceAggregator::new(2, Duration::from_secs(5))
            .run(tasks)
            .await
            .unwrap();

        let failure = result.get("keywords").unwrap().failure().unwrap();
        assert!(failure.reason.contains("no candidate keywords"));
        assert!(result.get("related_keywords").unwrap().failure().is_some());
    }
}
