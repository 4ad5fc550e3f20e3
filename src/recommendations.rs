//! Rule-based recommendations
//!
//! Checks the probed page for common on-page and technical gaps and turns
//! related-keyword results into a content suggestion. Purely deterministic:
//! the same profile and sources always give the same list, in the same order.

use serde::Serialize;
use std::fmt;

use crate::aggregator::AggregationResult;
use crate::sources::SiteProfile;

/// Page load time in seconds above which a performance issue is raised
const SLOW_LOAD_SECS: f64 = 3.0;

/// Related keywords quoted in the content recommendation
const QUOTED_OPPORTUNITIES: usize = 3;

/// Task name whose payload carries related keywords
const RELATED_KEYWORDS_SOURCE: &str = "related_keywords";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Priority {
    High,
    Medium,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Category {
    Technical,
    #[serde(rename = "On-Page")]
    OnPage,
    Performance,
    Security,
    Content,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Priority::High => "High",
            Priority::Medium => "Medium",
        })
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Category::Technical => "Technical",
            Category::OnPage => "On-Page",
            Category::Performance => "Performance",
            Category::Security => "Security",
            Category::Content => "Content",
        })
    }
}

/// A single actionable finding
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub priority: Priority,
    pub category: Category,
    pub issue: String,
    pub recommendation: String,
    pub impact: String,
}

impl Recommendation {
    fn new(
        priority: Priority,
        category: Category,
        issue: impl Into<String>,
        recommendation: impl Into<String>,
        impact: &str,
    ) -> Self {
        Self {
            priority,
            category,
            issue: issue.into(),
            recommendation: recommendation.into(),
            impact: impact.to_string(),
        }
    }
}

/// Builds the recommendation list for a probed site and its source outcomes.
///
/// On-page checks only run when the page was actually fetched; an
/// unreachable page would otherwise flag every field as missing.
pub fn generate(site: &SiteProfile, sources: &AggregationResult) -> Vec<Recommendation> {
    let mut recommendations = Vec::new();

    if site.error.is_none() {
        on_page_checks(site, &mut recommendations);
    }

    if !site.https {
        recommendations.push(Recommendation::new(
            Priority::High,
            Category::Security,
            "Not using HTTPS",
            "Implement SSL certificate and redirect HTTP to HTTPS",
            "Essential for security and search rankings",
        ));
    }

    if site.error.is_none() && site.h1_tags.is_empty() {
        recommendations.push(Recommendation::new(
            Priority::Medium,
            Category::OnPage,
            "Missing H1 tags",
            "Add descriptive H1 tags to structure content hierarchy",
            "Better content organization and keyword relevance",
        ));
    }

    let opportunities = keyword_opportunities(sources);
    if !opportunities.is_empty() {
        recommendations.push(Recommendation::new(
            Priority::Medium,
            Category::Content,
            "Keyword opportunities identified",
            format!(
                "Create content targeting high-volume keywords: {}",
                opportunities.join(", ")
            ),
            "Increased organic traffic potential",
        ));
    }

    recommendations
}

fn on_page_checks(site: &SiteProfile, out: &mut Vec<Recommendation>) {
    if site.title.is_empty() {
        out.push(Recommendation::new(
            Priority::High,
            Category::Technical,
            "Missing page title",
            "Add descriptive title tags to all pages",
            "Critical for search rankings and click-through rates",
        ));
    }

    if site.meta_description.is_empty() {
        out.push(Recommendation::new(
            Priority::High,
            Category::OnPage,
            "Missing meta description",
            "Add compelling meta descriptions to improve click-through rates",
            "Higher CTR from search results",
        ));
    }

    if !site.responsive {
        out.push(Recommendation::new(
            Priority::High,
            Category::Technical,
            "Not mobile-friendly",
            "Implement responsive design with proper viewport meta tag",
            "Critical for mobile rankings and user experience",
        ));
    }

    if let Some(load_time) = site.load_time.filter(|t| *t > SLOW_LOAD_SECS) {
        out.push(Recommendation::new(
            Priority::High,
            Category::Performance,
            format!("Slow loading time ({load_time}s)"),
            "Optimize images, enable compression, and use CDN",
            "Better user experience and search rankings",
        ));
    }
}

/// First few related keywords from a successful related-keywords lookup
fn keyword_opportunities(sources: &AggregationResult) -> Vec<String> {
    sources
        .get(RELATED_KEYWORDS_SOURCE)
        .and_then(|outcome| outcome.payload())
        .and_then(|payload| payload.get("keywords"))
        .and_then(|keywords| keywords.as_array())
        .map(|keywords| {
            keywords
                .iter()
                .filter_map(|k| k.as_str())
                .filter(|k| !k.is_empty())
                .take(QUOTED_OPPORTUNITIES)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
