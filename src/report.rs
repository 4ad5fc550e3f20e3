//! Report rendering
//!
//! Turns a [`SeoReport`] into plain text for the terminal or pretty JSON.
//! The text form lists every data source with either "ok" or the reason it
//! failed, so partial results are always visible, followed by the
//! recommendations.

use crate::aggregator::TaskOutcome;
use crate::analysis::SeoReport;

/// Renders the report for terminal output
pub fn render_text(report: &SeoReport) -> String {
    let mut lines = Vec::new();
    let site = &report.site;

    lines.push(format!("SEO analysis: {}", report.website_url));
    lines.push(format!(
        "Type: {} | Industry: {} | Took {:.2}s",
        report.analysis_type, report.industry, report.duration_secs
    ));
    lines.push(String::new());

    lines.push("Site".to_string());
    match &site.error {
        Some(error) => lines.push(format!("  Could not fetch page: {}", error)),
        None => {
            lines.push(format!(
                "  Status: {}  Load time: {}  HTTPS: {}",
                site.status_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                site.load_time
                    .map(|t| format!("{:.2}s", t))
                    .unwrap_or_else(|| "-".to_string()),
                yes_no(site.https)
            ));
            lines.push(format!("  Title: {}", or_missing(&site.title)));
            lines.push(format!("  Meta description: {}", or_missing(&site.meta_description)));
            lines.push(format!("  H1 tags: {}", site.h1_tags.len()));
            lines.push(format!("  Mobile viewport: {}", yes_no(site.responsive)));
        }
    }
    lines.push(format!(
        "  robots.txt: {}  sitemap.xml: {}",
        yes_no(site.robots_txt_exists),
        yes_no(site.sitemap_exists)
    ));

    if !report.extracted_keywords.is_empty() {
        lines.push(format!("  Keywords: {}", report.extracted_keywords.join(", ")));
    }
    lines.push(String::new());

    lines.push(format!("Data sources: {}", report.summary_line()));
    let mut sources: Vec<(&str, &TaskOutcome)> = report.sources.iter().collect();
    sources.sort_by(|a, b| a.0.cmp(b.0));
    for (name, outcome) in sources {
        match outcome {
            TaskOutcome::Success(_) => lines.push(format!("  [ok]     {}", name)),
            TaskOutcome::Failure(failure) => {
                lines.push(format!("  [failed] {}: {}", name, failure))
            }
        }
    }

    if !report.recommendations.is_empty() {
        lines.push(String::new());
        lines.push(format!("Recommendations: {}", report.recommendations.len()));
        for rec in &report.recommendations {
            lines.push(format!("  [{}] {}: {}", rec.priority, rec.category, rec.issue));
            lines.push(format!("      {}", rec.recommendation));
        }
    }

    lines.join("\n")
}

/// Renders the full report, payloads included, as pretty JSON
pub fn render_json(report: &SeoReport) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

fn or_missing(value: &str) -> &str {
    if value.is_empty() {
        "(missing)"
    } else {
        value
    }
}
