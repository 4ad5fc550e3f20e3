//! Direct site probe
//!
//! Fetches the page itself and pulls out the on-page basics (title, meta
//! tags, headings, viewport, language) plus robots.txt and sitemap.xml
//! presence. Not cached: it is cheap and should reflect the live site.

use regex::Regex;
use reqwest::{Client, StatusCode, Url};
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use tracing::debug;

use super::SiteProfile;

/// Timeout for the page request
const PAGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for robots.txt and sitemap.xml checks
const AUX_TIMEOUT: Duration = Duration::from_secs(5);

static TITLE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap());

static META_TAG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<meta\b[^>]*>").unwrap());

static NAME_ATTR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\bname\s*=\s*["']([^"']*)["']"#).unwrap());

static CONTENT_ATTR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?is)\bcontent\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap());

static H1_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<h1\b[^>]*>(.*?)</h1>").unwrap());

static HTML_LANG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?is)<html\b[^>]*\blang\s*=\s*["']([^"']+)["']"#).unwrap());

static TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

/// Fetches a site and builds a [`SiteProfile`]
#[derive(Debug, Clone)]
pub struct SiteProbe {
    http_client: Client,
}

impl Default for SiteProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SiteProbe {
    pub fn new() -> Self {
        let http_client = Client::builder()
            .user_agent(concat!("seoscout/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self { http_client }
    }

    /// Probes `url`. Never fails: a page that cannot be fetched yields a
    /// profile with `error` set.
    pub async fn probe(&self, url: &str) -> SiteProfile {
        let mut profile = SiteProfile {
            url: url.to_string(),
            https: url.starts_with("https://"),
            language: "en".to_string(),
            ..SiteProfile::default()
        };

        let started = Instant::now();
        match self.http_client.get(url).timeout(PAGE_TIMEOUT).send().await {
            Ok(response) => {
                let elapsed = started.elapsed().as_secs_f64();
                profile.load_time = Some((elapsed * 100.0).round() / 100.0);
                profile.status_code = Some(response.status().as_u16());
                profile.content_type = response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();

                if response.status() == StatusCode::OK {
                    match response.text().await {
                        Ok(body) => apply_html(&mut profile, &body),
                        Err(e) => profile.error = Some(e.to_string()),
                    }
                }
            }
            Err(e) => {
                debug!(%url, error = %e, "site fetch failed");
                profile.error = Some(e.to_string());
            }
        }

        if let Some(origin) = origin_of(url) {
            let robots_url = format!("{origin}/robots.txt");
            let sitemap_url = format!("{origin}/sitemap.xml");
            let (robots, sitemap) =
                tokio::join!(self.exists(&robots_url), self.exists(&sitemap_url));
            profile.robots_txt_exists = robots;
            profile.sitemap_exists = sitemap;
        }

        profile
    }

    async fn exists(&self, url: &str) -> bool {
        match self.http_client.get(url).timeout(AUX_TIMEOUT).send().await {
            Ok(response) => response.status() == StatusCode::OK,
            Err(_) => false,
        }
    }
}

fn origin_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed.host_str()?;
    Some(parsed.origin().ascii_serialization())
}

/// Fills the on-page fields of `profile` from an HTML document
pub fn apply_html(profile: &mut SiteProfile, html: &str) {
    if let Some(title) = TITLE_REGEX.captures(html).and_then(|c| c.get(1)) {
        profile.title = clean_text(title.as_str());
    }

    profile.meta_description = meta_content(html, "description").unwrap_or_default();
    profile.meta_keywords = meta_content(html, "keywords").unwrap_or_default();
    profile.responsive = meta_content(html, "viewport").is_some();

    profile.h1_tags = H1_REGEX
        .captures_iter(html)
        .filter_map(|c| c.get(1))
        .map(|m| clean_text(m.as_str()))
        .filter(|text| !text.is_empty())
        .collect();

    if let Some(lang) = HTML_LANG_REGEX.captures(html).and_then(|c| c.get(1)) {
        profile.language = lang.as_str().chars().take(2).collect::<String>().to_ascii_lowercase();
    }
}

/// Returns the `content` of the first `<meta name="...">` with the given name
fn meta_content(html: &str, name: &str) -> Option<String> {
    META_TAG_REGEX.find_iter(html).find_map(|tag| {
        let tag = tag.as_str();
        let tag_name = NAME_ATTR_REGEX.captures(tag)?.get(1)?.as_str();
        if !tag_name.eq_ignore_ascii_case(name) {
            return None;
        }
        let content = CONTENT_ATTR_REGEX.captures(tag);
        Some(
            content
                .and_then(|c| c.get(1).or_else(|| c.get(2)))
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default(),
        )
    })
}

/// Drops nested tags, decodes the common entities and collapses whitespace
fn clean_text(fragment: &str) -> String {
    let stripped = TAG_REGEX.replace_all(fragment, " ");
    let decoded = stripped
        .replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}
