//! End-to-end crawl tests against a mock HTTP site.

use std::sync::Arc;
use std::time::Duration;

use httpmock::prelude::*;

use sitechat::config::CrawlConfig;
use sitechat::crawler::{SiteCrawler, StaticFetcher};

fn html(title: &str, body: &str) -> String {
    format!("<html><head><title>{title}</title></head><body>{body}</body></html>")
}

fn crawler_for(server: &MockServer, max_depth: usize, max_pages: usize) -> SiteCrawler {
    let config = CrawlConfig::new(server.url("/"))
        .with_max_depth(max_depth)
        .with_max_pages(max_pages)
        .with_delay(Duration::ZERO);
    let fetcher = Arc::new(StaticFetcher::new(Duration::from_secs(5)).unwrap());
    SiteCrawler::new(fetcher, config).unwrap()
}

#[tokio::test]
async fn cross_linked_site_is_crawled_exactly_once_per_page() {
    let server = MockServer::start_async().await;

    let home = server
        .mock_async(|when, then| {
            when.method(GET).path("/");
            then.status(200).header("content-type", "text/html").body(html(
                "Home",
                r#"<h1>Welcome</h1><p>Start here.</p>
                   <a href="/about">About</a> <a href="/contact">Contact</a>"#,
            ));
        })
        .await;
    let about = server
        .mock_async(|when, then| {
            when.method(GET).path("/about");
            then.status(200).header("content-type", "text/html").body(html(
                "About",
                r#"<h1>About us</h1><p>We make widgets.</p>
                   <a href="/">Home</a> <a href="/contact">Contact</a>"#,
            ));
        })
        .await;
    let contact = server
        .mock_async(|when, then| {
            when.method(GET).path("/contact");
            then.status(200).header("content-type", "text/html").body(html(
                "Contact",
                r#"<h1>Contact</h1><p>Email us.</p>
                   <a href="/">Home</a> <a href="/about">About</a>"#,
            ));
        })
        .await;

    let pages = crawler_for(&server, 2, 10).crawl().await.unwrap();

    assert_eq!(pages.len(), 3);
    home.assert_hits_async(1).await;
    about.assert_hits_async(1).await;
    contact.assert_hits_async(1).await;

    // Discovery order: origin first, then its links breadth-first.
    assert_eq!(pages[0].title, "Home");
    assert!(pages[0].text.contains("Start here."));
    assert_eq!(pages[1].title, "About");
    assert_eq!(pages[2].title, "Contact");
}

#[tokio::test]
async fn unreachable_origin_yields_zero_pages_without_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/");
            then.status(500);
        })
        .await;

    let pages = crawler_for(&server, 2, 10).crawl().await.unwrap();
    assert!(pages.is_empty());
}

#[tokio::test]
async fn broken_link_is_skipped_and_the_crawl_continues() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/");
            then.status(200).header("content-type", "text/html").body(html(
                "Home",
                r#"<a href="/missing">Missing</a> <a href="/ok">Ok</a>"#,
            ));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/missing");
            then.status(404);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/ok");
            then.status(200)
                .header("content-type", "text/html")
                .body(html("Ok", "<p>Fine.</p>"));
        })
        .await;

    let pages = crawler_for(&server, 2, 10).crawl().await.unwrap();
    let titles: Vec<_> = pages.iter().map(|p| p.title.as_str()).collect();
    assert_eq!(titles, vec!["Home", "Ok"]);
}

#[tokio::test]
async fn page_cap_stops_the_crawl() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/");
            then.status(200).header("content-type", "text/html").body(html(
                "Home",
                r#"<a href="/p1">1</a> <a href="/p2">2</a> <a href="/p3">3</a>"#,
            ));
        })
        .await;
    for i in 1..=3 {
        let path = format!("/p{i}");
        server
            .mock_async(move |when, then| {
                when.method(GET).path(path);
                then.status(200)
                    .header("content-type", "text/html")
                    .body(html("Page", "<p>Content.</p>"));
            })
            .await;
    }

    let pages = crawler_for(&server, 3, 2).crawl().await.unwrap();
    assert_eq!(pages.len(), 2);
}

#[tokio::test]
async fn out_of_scope_and_binary_links_are_not_followed() {
    let server = MockServer::start_async().await;
    let origin = server
        .mock_async(|when, then| {
            when.method(GET).path("/");
            then.status(200).header("content-type", "text/html").body(html(
                "Home",
                r#"<a href="https://elsewhere.example/">External</a>
                   <a href="/report.pdf">Report</a>
                   <a href="mailto:hi@example.com">Mail</a>
                   <a href="/docs">Docs</a>"#,
            ));
        })
        .await;
    let docs = server
        .mock_async(|when, then| {
            when.method(GET).path("/docs");
            then.status(200)
                .header("content-type", "text/html")
                .body(html("Docs", "<p>Documentation.</p>"));
        })
        .await;
    let pdf = server
        .mock_async(|when, then| {
            when.method(GET).path("/report.pdf");
            then.status(200).body("%PDF-1.4");
        })
        .await;

    let pages = crawler_for(&server, 2, 10).crawl().await.unwrap();
    assert_eq!(pages.len(), 2);
    origin.assert_hits_async(1).await;
    docs.assert_hits_async(1).await;
    pdf.assert_hits_async(0).await;
}

#[tokio::test]
async fn fragment_links_collapse_to_one_fetch() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/");
            then.status(200).header("content-type", "text/html").body(html(
                "Home",
                r#"<a href="/faq#shipping">Shipping</a> <a href="/faq#returns">Returns</a>"#,
            ));
        })
        .await;
    let faq = server
        .mock_async(|when, then| {
            when.method(GET).path("/faq");
            then.status(200)
                .header("content-type", "text/html")
                .body(html("FAQ", "<p>Answers.</p>"));
        })
        .await;

    let pages = crawler_for(&server, 2, 10).crawl().await.unwrap();
    assert_eq!(pages.len(), 2);
    faq.assert_hits_async(1).await;
}

#[tokio::test]
async fn extraction_strips_boilerplate_and_collects_headings() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/");
            then.status(200).header("content-type", "text/html").body(html(
                "Guide",
                r#"<nav>Menu items</nav>
                   <script>var x = 1;</script>
                   <h2>Billing</h2><p>Invoices are monthly.</p>
                   <footer>Copyright</footer>"#,
            ));
        })
        .await;

    let pages = crawler_for(&server, 0, 10).crawl().await.unwrap();
    assert_eq!(pages.len(), 1);
    let page = &pages[0];
    assert!(page.text.contains("Invoices are monthly."));
    assert!(!page.text.contains("Menu items"));
    assert!(!page.text.contains("var x"));
    assert!(!page.text.contains("Copyright"));
    assert_eq!(page.headings, vec!["Billing".to_string()]);
}
