//! Headless-browser fetch strategy for JavaScript-heavy sites.
//!
//! Loads each page in headless Chromium, waits for navigation to settle
//! (bounded), gives client-side frameworks a short delay to paint, then
//! extracts from the rendered DOM with the same extraction path as the static
//! strategy.

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use url::Url;

use crate::crawler::fetch::{Extractor, FetchFailure, Page, PageFetcher};
use crate::types::SiteChatError;

/// Extra time after navigation for client-side rendering to paint.
const SETTLE_DELAY: Duration = Duration::from_millis(500);

pub struct RenderedFetcher {
    browser: Browser,
    extractor: Extractor,
    navigation_timeout: Duration,
    handler: JoinHandle<()>,
}

impl RenderedFetcher {
    /// Launches a headless browser. The returned fetcher owns the browser
    /// process; dropping it shuts the handler task down.
    pub async fn launch(navigation_timeout: Duration) -> Result<Self, SiteChatError> {
        let config = BrowserConfig::builder()
            .build()
            .map_err(SiteChatError::Crawl)?;
        let (browser, mut events) = Browser::launch(config)
            .await
            .map_err(|err| SiteChatError::Crawl(format!("failed to launch browser: {err}")))?;
        let handler = tokio::spawn(async move { while events.next().await.is_some() {} });
        Ok(Self {
            browser,
            extractor: Extractor::new()?,
            navigation_timeout,
            handler,
        })
    }

    async fn render(&self, url: &Url) -> Result<String, FetchFailure> {
        let page = self
            .browser
            .new_page(url.as_str())
            .await
            .map_err(|err| FetchFailure::transport(url, err))?;

        let navigation = tokio::time::timeout(self.navigation_timeout, page.wait_for_navigation())
            .await
            .map(|nav| nav.map(|_| ()));
        match navigation {
            Err(_) => {
                let _ = page.close().await;
                return Err(FetchFailure::render_timeout(url, "navigation did not settle"));
            }
            Ok(Err(err)) => {
                let _ = page.close().await;
                return Err(FetchFailure::transport(url, err));
            }
            Ok(Ok(())) => {}
        }

        tokio::time::sleep(SETTLE_DELAY).await;

        let html = page
            .content()
            .await
            .map_err(|err| FetchFailure::transport(url, err));
        let _ = page.close().await;
        html
    }
}

impl Drop for RenderedFetcher {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

#[async_trait]
impl PageFetcher for RenderedFetcher {
    async fn fetch(&self, url: &Url) -> Result<Page, FetchFailure> {
        let html = self.render(url).await?;
        Ok(self.extractor.extract(url, &html))
    }
}
