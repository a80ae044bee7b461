//! Bounded breadth-first website crawling.
//!
//! The crawler owns a FIFO frontier of `(url, depth)` pairs and a visited set
//! of canonical URLs. Shallower pages are always preferred when the page cap
//! is reached because the frontier is processed strictly in discovery order.

pub mod fetch;
pub mod policy;
#[cfg(feature = "rendered")]
pub mod rendered;

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tracing::{debug, info, warn};
use url::Url;

pub use fetch::{Extractor, FetchFailure, FetchFailureReason, Page, PageFetcher, StaticFetcher};
#[cfg(feature = "rendered")]
pub use rendered::RenderedFetcher;

use crate::config::CrawlConfig;
use crate::types::SiteChatError;

/// Bounded BFS traversal over one site.
pub struct SiteCrawler {
    fetcher: Arc<dyn PageFetcher>,
    config: CrawlConfig,
}

impl SiteCrawler {
    /// Validates the configuration up front; a bad origin or zero page cap is
    /// a construction-time error, not a mid-crawl surprise.
    pub fn new(fetcher: Arc<dyn PageFetcher>, config: CrawlConfig) -> Result<Self, SiteChatError> {
        config.validate()?;
        Ok(Self { fetcher, config })
    }

    /// Crawls from the configured origin and returns pages in discovery
    /// order. Per-page fetch failures are logged and skipped; a failing
    /// origin yields an empty result, not an error.
    pub async fn crawl(&self) -> Result<Vec<Page>, SiteChatError> {
        let origin = policy::canonicalize(&self.config.origin)
            .ok_or_else(|| SiteChatError::Crawl(format!("origin '{}' is not a valid URL", self.config.origin)))?;
        let origin_host = origin.host_str().unwrap_or_default().to_string();

        info!(
            origin = %origin,
            max_depth = self.config.max_depth,
            max_pages = self.config.max_pages,
            "starting crawl"
        );

        let mut frontier: VecDeque<(Url, usize)> = VecDeque::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut pages: Vec<Page> = Vec::new();

        // The origin defines the host, so it bypasses the scope policy.
        frontier.push_back((origin, 0));

        while let Some((url, depth)) = frontier.pop_front() {
            if pages.len() >= self.config.max_pages {
                break;
            }
            if depth > self.config.max_depth || visited.contains(url.as_str()) {
                continue;
            }
            // Mark before fetching so a rediscovery while this fetch is
            // outstanding cannot re-enqueue the same URL.
            visited.insert(url.as_str().to_string());

            debug!(url = %url, depth, recorded = pages.len(), "fetching page");

            match self.fetcher.fetch(&url).await {
                Ok(page) => {
                    for link in &page.outbound_links {
                        if !policy::is_in_scope(link, &origin_host) {
                            continue;
                        }
                        let Some(target) = policy::canonicalize(link) else {
                            continue;
                        };
                        if !visited.contains(target.as_str()) {
                            frontier.push_back((target, depth + 1));
                        }
                    }
                    // Zero-text pages are still recorded; the chunker filters
                    // empty content later.
                    pages.push(page);
                }
                Err(failure) => {
                    warn!(url = %failure.url, reason = %failure.reason, "skipping page");
                }
            }

            // Politeness throttle, applied regardless of outcome.
            if !self.config.delay.is_zero() {
                tokio::time::sleep(self.config.delay).await;
            }
        }

        info!(pages = pages.len(), "crawl complete");
        Ok(pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Serves pages from a canned map and records fetch order.
    struct MapFetcher {
        pages: Vec<(String, Page)>,
        fetched: Mutex<Vec<String>>,
    }

    impl MapFetcher {
        fn new(pages: Vec<Page>) -> Self {
            Self {
                pages: pages.into_iter().map(|p| (p.url.clone(), p)).collect(),
                fetched: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PageFetcher for MapFetcher {
        async fn fetch(&self, url: &Url) -> Result<Page, FetchFailure> {
            self.fetched.lock().unwrap().push(url.to_string());
            self.pages
                .iter()
                .find(|(u, _)| u == url.as_str())
                .map(|(_, p)| p.clone())
                .ok_or_else(|| FetchFailure::status(url, 404))
        }
    }

    fn page(url: &str, links: &[&str]) -> Page {
        Page {
            url: url.to_string(),
            title: url.to_string(),
            text: format!("content of {url}"),
            headings: vec![],
            outbound_links: links.iter().map(|l| l.to_string()).collect::<BTreeSet<_>>(),
        }
    }

    fn config(origin: &str) -> CrawlConfig {
        CrawlConfig::new(origin).with_delay(Duration::ZERO)
    }

    #[tokio::test]
    async fn three_page_site_is_crawled_once_per_page() {
        let fetcher = Arc::new(MapFetcher::new(vec![
            page(
                "https://example.com/",
                &["https://example.com/about", "https://example.com/contact"],
            ),
            page(
                "https://example.com/about",
                &["https://example.com/", "https://example.com/contact"],
            ),
            page(
                "https://example.com/contact",
                &["https://example.com/", "https://example.com/about"],
            ),
        ]));
        let crawler = SiteCrawler::new(
            fetcher.clone(),
            config("https://example.com/").with_max_depth(2).with_max_pages(10),
        )
        .unwrap();

        let pages = crawler.crawl().await.unwrap();
        assert_eq!(pages.len(), 3);

        let fetched = fetcher.fetched.lock().unwrap().clone();
        assert_eq!(fetched.len(), 3, "each page fetched exactly once: {fetched:?}");
    }

    #[tokio::test]
    async fn failing_origin_yields_zero_pages_without_error() {
        let fetcher = Arc::new(MapFetcher::new(vec![]));
        let crawler = SiteCrawler::new(fetcher, config("https://example.com/")).unwrap();
        let pages = crawler.crawl().await.unwrap();
        assert!(pages.is_empty());
    }

    #[tokio::test]
    async fn page_cap_prefers_shallow_pages() {
        let fetcher = Arc::new(MapFetcher::new(vec![
            page(
                "https://example.com/",
                &["https://example.com/a", "https://example.com/b", "https://example.com/c"],
            ),
            page("https://example.com/a", &["https://example.com/deep"]),
            page("https://example.com/b", &[]),
            page("https://example.com/c", &[]),
            page("https://example.com/deep", &[]),
        ]));
        let crawler = SiteCrawler::new(
            fetcher,
            config("https://example.com/").with_max_depth(3).with_max_pages(3),
        )
        .unwrap();

        let pages = crawler.crawl().await.unwrap();
        let urls: Vec<_> = pages.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://example.com/", "https://example.com/a", "https://example.com/b"]
        );
    }

    #[tokio::test]
    async fn depth_limit_is_enforced() {
        let fetcher = Arc::new(MapFetcher::new(vec![
            page("https://example.com/", &["https://example.com/l1"]),
            page("https://example.com/l1", &["https://example.com/l2"]),
            page("https://example.com/l2", &["https://example.com/l3"]),
            page("https://example.com/l3", &[]),
        ]));
        let crawler = SiteCrawler::new(
            fetcher,
            config("https://example.com/").with_max_depth(1).with_max_pages(100),
        )
        .unwrap();

        let pages = crawler.crawl().await.unwrap();
        let urls: Vec<_> = pages.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(urls, vec!["https://example.com/", "https://example.com/l1"]);
    }

    #[tokio::test]
    async fn fragment_variants_do_not_cause_revisits() {
        let fetcher = Arc::new(MapFetcher::new(vec![
            page(
                "https://example.com/",
                // Links arrive already defragmented from extraction, but a
                // hand-fed duplicate must still dedup through the canonical key.
                &["https://example.com/about", "https://example.com/about"],
            ),
            page("https://example.com/about", &[]),
        ]));
        let crawler = SiteCrawler::new(fetcher.clone(), config("https://example.com/")).unwrap();
        let pages = crawler.crawl().await.unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(fetcher.fetched.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn out_of_scope_links_are_never_fetched() {
        let fetcher = Arc::new(MapFetcher::new(vec![
            page(
                "https://example.com/",
                &["https://other.com/x", "https://example.com/file.pdf", "mailto:x@example.com"],
            ),
        ]));
        let crawler = SiteCrawler::new(fetcher.clone(), config("https://example.com/")).unwrap();
        let pages = crawler.crawl().await.unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(fetcher.fetched.lock().unwrap().len(), 1);
    }
}
