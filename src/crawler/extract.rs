//! Resource extraction from fetched HTML pages
//!
//! Turns a page into outgoing links plus, when the page looks like learning
//! material, a [`ResourceDocument`]. Pages without a title or description,
//! or unrelated to the crawl run's query, yield no resource.

use chrono::Utc;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::url::UrlPolicy;
use super::FetchedPage;
use crate::models::{ResourceDocument, ResourceType};
use crate::utils::normalize_whitespace;

// Helper macro for selectors that are known to be valid
macro_rules! parse_selector {
    ($s:expr) => {
        Selector::parse($s).expect(concat!("Invalid CSS selector: ", $s))
    };
}

/// Languages detected by keyword in the title and description
const LANGUAGES: &[&str] = &[
    "python",
    "javascript",
    "java",
    "cpp",
    "c++",
    "ruby",
    "php",
    "golang",
    "rust",
    "typescript",
    "react",
];

/// Title keywords that mark a page as programming material
const PROGRAMMING_KEYWORDS: &[&str] = &[
    "python",
    "javascript",
    "js",
    "react",
    "node",
    "code",
    "programming",
    "tutorial",
    "guide",
];

/// URL fragments of sites that earn the domain-authority bonus
const AUTHORITATIVE_SOURCES: &[&str] = &[
    "github.com",
    "stackoverflow.com",
    "mdn",
    "w3schools",
    "reactjs.org",
];

/// Everything extracted from one page
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Absolute links found on the page, fragment removed
    pub links: Vec<String>,

    /// The page as a resource, if it qualifies
    pub resource: Option<ResourceDocument>,
}

/// Turns fetched pages into resources and links
pub trait ResourceExtractor: Send + Sync {
    /// Extract from `page`. When `query` is set, pages whose title and
    /// description do not mention it yield no resource.
    fn extract(&self, page: &FetchedPage, query: Option<&str>) -> Extraction;
}

/// Selector-based extractor built on `scraper`
pub struct HtmlExtractor {
    title: Selector,
    h1: Selector,
    meta_description: Selector,
    meta_keywords: Selector,
    paragraph: Selector,
    code_block: Selector,
    anchor: Selector,
    content: Vec<Selector>,
    indicators: Selector,
}

impl Default for HtmlExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl HtmlExtractor {
    pub fn new() -> Self {
        Self {
            title: parse_selector!("title"),
            h1: parse_selector!("h1"),
            meta_description: parse_selector!("meta[name=\"description\"]"),
            meta_keywords: parse_selector!("meta[name=\"keywords\"]"),
            paragraph: parse_selector!("p"),
            code_block: parse_selector!("pre code"),
            anchor: parse_selector!("a[href]"),
            content: vec![
                parse_selector!("article"),
                parse_selector!(".markdown-body"),
                parse_selector!(".post-content"),
                parse_selector!("#content"),
                parse_selector!(".content"),
                parse_selector!("main"),
                parse_selector!(".article-content"),
                parse_selector!(".documentation"),
                parse_selector!(".tutorial-content"),
            ],
            indicators: parse_selector!(
                "pre, code, article, .markdown-body, .documentation, .tutorial, .content-body, .post-content"
            ),
        }
    }

    fn text_of(element: ElementRef<'_>) -> String {
        normalize_whitespace(&element.text().collect::<Vec<_>>().join(" "))
    }

    fn first_text(&self, document: &Html, selector: &Selector) -> Option<String> {
        document
            .select(selector)
            .map(Self::text_of)
            .find(|t| !t.is_empty())
    }

    fn meta_content(document: &Html, selector: &Selector) -> Option<String> {
        document
            .select(selector)
            .filter_map(|e| e.value().attr("content"))
            .map(normalize_whitespace)
            .find(|c| !c.is_empty())
    }

    fn links(&self, document: &Html, base: &Url) -> Vec<String> {
        let mut links: Vec<String> = document
            .select(&self.anchor)
            .filter_map(|a| a.value().attr("href"))
            .filter_map(|href| UrlPolicy::resolve(base, href))
            .collect();
        links.sort();
        links.dedup();
        links
    }

    /// Pages with code blocks, content containers, guide headings or a
    /// programming title count as resources
    fn is_resource_page(&self, document: &Html, title: &str) -> bool {
        if document.select(&self.indicators).next().is_some() {
            return true;
        }

        let guide_heading = document.select(&self.h1).any(|h| {
            let text = Self::text_of(h);
            text.contains("Guide") || text.contains("Tutorial")
        });
        if guide_heading {
            return true;
        }

        let title = title.to_lowercase();
        PROGRAMMING_KEYWORDS.iter().any(|k| title.contains(k))
    }

    fn build_resource(
        &self,
        document: &Html,
        url: &Url,
        query: Option<&str>,
    ) -> Option<ResourceDocument> {
        let title = self
            .first_text(document, &self.title)
            .or_else(|| self.first_text(document, &self.h1))?;

        if !self.is_resource_page(document, &title) {
            return None;
        }

        let description = Self::meta_content(document, &self.meta_description).or_else(|| {
            let paragraphs: Vec<String> = document
                .select(&self.paragraph)
                .map(Self::text_of)
                .filter(|t| !t.is_empty())
                .take(3)
                .collect();
            let joined = paragraphs.join(" ");
            (!joined.is_empty()).then_some(joined)
        })?;

        let haystack = format!("{title} {description}").to_lowercase();

        if let Some(query) = query.map(str::to_lowercase).filter(|q| !q.trim().is_empty()) {
            if !haystack.contains(query.trim()) {
                return None;
            }
        }

        let languages: Vec<String> = LANGUAGES
            .iter()
            .filter(|lang| haystack.contains(*lang))
            .map(|lang| lang.to_string())
            .collect();

        let content = self
            .content
            .iter()
            .find_map(|selector| self.first_text(document, selector));

        let code_snippets: Vec<String> = document
            .select(&self.code_block)
            .map(|e| e.text().collect::<String>())
            .filter(|code| !code.trim().is_empty())
            .collect();

        let tags: Vec<String> = Self::meta_content(document, &self.meta_keywords)
            .map(|k| {
                k.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let domain = url.host_str().unwrap_or_default().to_string();
        let resource_type = classify(&title, &domain, url.as_str());
        let quality_score = quality_score(&code_snippets, &description, &tags, url.as_str());

        Some(ResourceDocument {
            url: url.to_string(),
            title,
            description,
            content,
            code_snippets,
            tags,
            domain,
            resource_type,
            languages,
            quality_score,
            timestamp: Utc::now(),
        })
    }
}

impl ResourceExtractor for HtmlExtractor {
    fn extract(&self, page: &FetchedPage, query: Option<&str>) -> Extraction {
        let Ok(base) = Url::parse(&page.url) else {
            tracing::debug!(url = %page.url, "Cannot extract from unparsable URL");
            return Extraction::default();
        };

        let document = Html::parse_document(&page.body);
        let links = self.links(&document, &base);
        let resource = self.build_resource(&document, &base, query);

        if let Some(resource) = &resource {
            tracing::info!(
                title = %resource.title,
                resource_type = %resource.resource_type,
                "Found resource"
            );
        }

        Extraction { links, resource }
    }
}

/// Resource type from title, domain and URL, first match wins
pub fn classify(title: &str, domain: &str, url: &str) -> ResourceType {
    let title = title.to_lowercase();

    if title.contains("tutorial") || title.contains("guide") {
        ResourceType::Tutorial
    } else if title.contains("video") || domain.contains("youtube") {
        ResourceType::Video
    } else if title.contains("documentation") || domain.contains("docs") {
        ResourceType::Documentation
    } else if url.contains("://github.com/") {
        ResourceType::Repository
    } else if ["docs", "documentation", "reference"]
        .iter()
        .any(|d| url.contains(d))
    {
        ResourceType::Documentation
    } else if ["tutorial", "guide", "how-to"].iter().any(|t| url.contains(t)) {
        ResourceType::Tutorial
    } else {
        ResourceType::Article
    }
}

/// Mean of four factors: has code, description length (500 chars = 1.0),
/// has tags, and a 0.5 bonus for well-known sources
pub fn quality_score(code_snippets: &[String], description: &str, tags: &[String], url: &str) -> f32 {
    let has_code = if code_snippets.is_empty() { 0.0 } else { 1.0 };
    let length = (description.chars().count() as f32 / 500.0).min(1.0);
    let has_tags = if tags.is_empty() { 0.0 } else { 1.0 };
    let authority = if AUTHORITATIVE_SOURCES.iter().any(|s| url.contains(s)) {
        0.5
    } else {
        0.0
    };

    (has_code + length + has_tags + authority) / 4.0
}
