//! Page fetching: the [`PageFetcher`] seam, the static HTTP strategy, and the
//! HTML extraction shared by every strategy.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Node, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::crawler::policy;
use crate::types::SiteChatError;

/// Elements removed before text extraction: chrome and non-content markup.
const STRIP_TAGS: &[&str] = &["head", "script", "style", "nav", "footer", "header", "noscript"];

/// Headings shorter than this are navigation artifacts, not sections.
const MIN_HEADING_CHARS: usize = 2;

/// A crawled page. Immutable once created; `url` is canonical
/// (fragment-stripped).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Page {
    pub url: String,
    pub title: String,
    pub text: String,
    /// Heading text (h1–h6) in document order.
    pub headings: Vec<String>,
    /// Absolute, fragment-stripped targets of every anchor on the page.
    pub outbound_links: BTreeSet<String>,
}

/// Why a single page could not be fetched. Never fatal to the crawl: the
/// crawler logs the failure and moves on.
#[derive(Debug, thiserror::Error)]
#[error("failed to fetch {url}: {reason}")]
pub struct FetchFailure {
    pub url: String,
    pub reason: FetchFailureReason,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchFailureReason {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("http status {0}")]
    Status(u16),
    #[error("render timed out: {0}")]
    RenderTimeout(String),
}

impl FetchFailure {
    pub fn transport(url: &Url, err: impl std::fmt::Display) -> Self {
        Self {
            url: url.to_string(),
            reason: FetchFailureReason::Transport(err.to_string()),
        }
    }

    pub fn status(url: &Url, status: u16) -> Self {
        Self {
            url: url.to_string(),
            reason: FetchFailureReason::Status(status),
        }
    }

    #[allow(dead_code)] // constructed by the rendered strategy
    pub fn render_timeout(url: &Url, err: impl std::fmt::Display) -> Self {
        Self {
            url: url.to_string(),
            reason: FetchFailureReason::RenderTimeout(err.to_string()),
        }
    }
}

/// Strategy seam for retrieving a rendered page. The static HTTP strategy and
/// the headless-browser strategy both implement this contract.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<Page, FetchFailure>;
}

/// Shared HTML → [`Page`] extraction.
///
/// Selectors are compiled once at construction so extraction itself is
/// infallible.
#[derive(Clone, Debug)]
pub struct Extractor {
    title: Selector,
    headings: Selector,
    anchors: Selector,
}

impl Extractor {
    pub fn new() -> Result<Self, SiteChatError> {
        Ok(Self {
            title: parse_selector("title")?,
            headings: parse_selector("h1, h2, h3, h4, h5, h6")?,
            anchors: parse_selector("a[href]")?,
        })
    }

    /// Builds a [`Page`] from raw markup. `url` must already be canonical.
    pub fn extract(&self, url: &Url, html: &str) -> Page {
        let doc = Html::parse_document(html);

        let title = doc
            .select(&self.title)
            .next()
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| url.to_string());

        let mut raw_text = String::new();
        collect_text(doc.root_element(), &mut raw_text);
        let text = collapse_whitespace(&raw_text);

        let headings = doc
            .select(&self.headings)
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
            .filter(|h| h.chars().count() >= MIN_HEADING_CHARS)
            .collect();

        let outbound_links = doc
            .select(&self.anchors)
            .filter_map(|el| el.value().attr("href"))
            .filter_map(|href| url.join(href).ok())
            .map(|mut target| {
                target.set_fragment(None);
                target.to_string()
            })
            .collect();

        Page {
            url: url.to_string(),
            title,
            text,
            headings,
            outbound_links,
        }
    }
}

fn parse_selector(css: &str) -> Result<Selector, SiteChatError> {
    Selector::parse(css).map_err(|err| SiteChatError::Config(format!("invalid selector '{css}': {err}")))
}

/// Depth-first text collection, skipping stripped elements entirely.
fn collect_text(element: ElementRef<'_>, out: &mut String) {
    if STRIP_TAGS.contains(&element.value().name()) {
        return;
    }
    for child in element.children() {
        if let Some(child_el) = ElementRef::wrap(child) {
            collect_text(child_el, out);
        } else if let Node::Text(text) = child.value() {
            out.push_str(text);
            out.push(' ');
        }
    }
}

fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// One HTTP GET per page with a bounded timeout; no script execution.
#[derive(Clone, Debug)]
pub struct StaticFetcher {
    client: reqwest::Client,
    extractor: Extractor,
}

impl StaticFetcher {
    pub fn new(timeout: Duration) -> Result<Self, SiteChatError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("sitechat/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| SiteChatError::Config(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            extractor: Extractor::new()?,
        })
    }
}

#[async_trait]
impl PageFetcher for StaticFetcher {
    async fn fetch(&self, url: &Url) -> Result<Page, FetchFailure> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|err| FetchFailure::transport(url, err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchFailure::status(url, status.as_u16()));
        }

        let html = response
            .text()
            .await
            .map_err(|err| FetchFailure::transport(url, err))?;

        Ok(self.extractor.extract(url, &html))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(html: &str) -> Page {
        let extractor = Extractor::new().unwrap();
        let url = Url::parse("https://example.com/docs/guide").unwrap();
        extractor.extract(&url, html)
    }

    #[test]
    fn strips_chrome_and_collapses_whitespace() {
        let page = extract(
            r#"<html><head><title>  Guide  </title><script>var x = 1;</script></head>
               <body>
                 <nav>Home | About</nav>
                 <header>Site header</header>
                 <p>Hello
                    world.</p>
                 <style>p { color: red }</style>
                 <footer>Copyright</footer>
               </body></html>"#,
        );
        assert_eq!(page.title, "Guide");
        assert!(page.text.contains("Hello world."));
        assert!(!page.text.contains("Guide"), "head content is not page text");
        assert!(!page.text.contains("Home | About"));
        assert!(!page.text.contains("var x"));
        assert!(!page.text.contains("Copyright"));
        assert!(!page.text.contains("color"));
    }

    #[test]
    fn headings_come_back_in_document_order() {
        let page = extract(
            "<html><body>\
             <h2>Second level first</h2>\
             <h1>Top level after</h1>\
             <h3>X</h3>\
             <h3>Deep dive</h3>\
             </body></html>",
        );
        assert_eq!(
            page.headings,
            vec!["Second level first", "Top level after", "Deep dive"]
        );
    }

    #[test]
    fn links_are_resolved_absolute_and_defragmented() {
        let page = extract(
            r##"<html><body>
               <a href="/about">About</a>
               <a href="contact#team">Contact</a>
               <a href="https://other.com/page">Other</a>
               <a href="/about">Duplicate</a>
             </body></html>"##,
        );
        assert!(page.outbound_links.contains("https://example.com/about"));
        assert!(page.outbound_links.contains("https://example.com/docs/contact"));
        assert!(page.outbound_links.contains("https://other.com/page"));
        assert_eq!(page.outbound_links.len(), 3);
    }

    #[test]
    fn missing_title_falls_back_to_url() {
        let page = extract("<html><body><p>No title here.</p></body></html>");
        assert_eq!(page.title, "https://example.com/docs/guide");
    }

    #[test]
    fn empty_body_yields_empty_text_not_error() {
        let page = extract("<html><body></body></html>");
        assert!(page.text.is_empty());
        assert!(page.headings.is_empty());
    }
}
