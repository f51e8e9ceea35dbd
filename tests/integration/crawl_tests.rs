//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and run the full
//! crawl cycle end-to-end: fetch, extraction, asset download, assembly and
//! the Markdown hand-off.

use image::{DynamicImage, ImageFormat, RgbImage};
use site_binder::config::Config;
use site_binder::crawler::{ChannelSink, Coordinator, CrawlEvent};
use site_binder::output::{format_markdown, write_markdown, PAGE_SEPARATOR};
use site_binder::state::FailureKind;
use site_binder::{run_crawl, BinderError};
use std::io::Cursor;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration for a crawl of the mock server
fn create_test_config(server: &MockServer, assets: &TempDir, max_depth: u32) -> Config {
    let mut config = Config::for_seed(format!("{}/", server.uri()));
    config.crawler.max_depth = max_depth;
    config.crawler.workers = 3;
    config.fetcher.max_attempts = 2;
    config.fetcher.retry_delay_ms = 10;
    config.fetcher.timeout_secs = 5;
    config.assets.directory = assets.path().to_path_buf();
    config.output.document_path = assets.path().join("capture.md");
    config
}

fn png_bytes() -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::new(4, 4));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("Failed to encode test image");
    bytes
}

async fn mount_page(server: &MockServer, page: &str, html: &str) {
    Mock::given(method("GET"))
        .and(path(page))
        .respond_with(ResponseTemplate::new(200).set_body_raw(html.to_string(), "text/html"))
        .mount(server)
        .await;
}

async fn mount_never_requested(server: &MockServer, page: &str) {
    Mock::given(method("GET"))
        .and(path(page))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_full_crawl_single_site() {
    let server = MockServer::start().await;
    let assets = TempDir::new().unwrap();

    mount_page(
        &server,
        "/",
        r#"<html><head><title>Home</title></head><body>
            <p>Welcome to the site.</p>
            <a href="/a">A</a>
            <a href="b">B</a>
            <a href="http://other.test/x">External</a>
            <a href="/newsletter">Sign up</a>
            <a href="mailto:team@example.test">Mail</a>
        </body></html>"#,
    )
    .await;
    mount_page(
        &server,
        "/a",
        r#"<html><head><title>Page A</title></head><body>
            <p>First paragraph.</p><p>Second paragraph.</p>
            <img src="/img/cat.png"><img src="/img/logo.svg">
        </body></html>"#,
    )
    .await;
    mount_page(
        &server,
        "/b",
        r#"<html><body><div>Only a div here</div><a href="/">home</a></body></html>"#,
    )
    .await;
    mount_never_requested(&server, "/newsletter").await;

    Mock::given(method("GET"))
        .and(path("/img/cat.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(png_bytes(), "image/png"))
        .expect(1)
        .mount(&server)
        .await;
    mount_never_requested(&server, "/img/logo.svg").await;

    let config = create_test_config(&server, &assets, 2);
    let document = run_crawl(config).await.expect("Crawl failed");

    let paths: Vec<_> = document.pages.iter().map(|p| p.url.path().to_string()).collect();
    assert_eq!(paths, vec!["/", "/a", "/b"]);
    assert!(document.failures.is_empty());
    assert!(!document.cancelled);

    assert_eq!(document.pages[0].title.as_deref(), Some("Home"));
    assert_eq!(
        document.text(),
        format!(
            "Welcome to the site.{sep}First paragraph.\n\nSecond paragraph.{sep}Only a div here",
            sep = PAGE_SEPARATOR
        )
    );

    assert_eq!(document.assets.len(), 1);
    assert!(document.assets[0].exists());
    assert_eq!(document.pages[1].assets.len(), 1);

    // other.test and /newsletter were excluded, mailto was invalid
    assert_eq!(document.frontier.rejected_excluded, 2);
    assert_eq!(document.frontier.rejected_invalid, 0);
}

#[tokio::test]
async fn test_depth_bound_respected() {
    let server = MockServer::start().await;
    let assets = TempDir::new().unwrap();

    mount_page(&server, "/", r#"<p>root</p><a href="/level1">next</a>"#).await;
    mount_page(&server, "/level1", r#"<p>one</p><a href="/level2">next</a>"#).await;
    mount_never_requested(&server, "/level2").await;

    let config = create_test_config(&server, &assets, 1);
    let document = run_crawl(config).await.unwrap();

    assert_eq!(document.pages.len(), 2);
    assert!(document.pages.iter().all(|p| p.depth <= 1));
    assert_eq!(document.frontier.rejected_depth, 1);
}

#[tokio::test]
async fn test_failed_pages_do_not_stop_the_crawl() {
    let server = MockServer::start().await;
    let assets = TempDir::new().unwrap();

    mount_page(
        &server,
        "/",
        r#"<p>root</p><a href="/broken">broken</a><a href="/file.pdf">pdf</a><a href="/ok">ok</a>"#,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/file.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"%PDF-1.4".to_vec(), "application/pdf"))
        .expect(1)
        .mount(&server)
        .await;
    mount_page(&server, "/ok", "<p>fine</p>").await;

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let coordinator = Coordinator::new(create_test_config(&server, &assets, 1))
        .unwrap()
        .with_event_sink(Arc::new(ChannelSink::new(tx)));

    let document = coordinator.run(CancellationToken::new()).await.unwrap();

    assert_eq!(document.pages.len(), 2);
    assert_eq!(document.failures.len(), 2);
    assert_eq!(document.failures[0].url.path(), "/broken");
    assert_eq!(document.failures[0].kind, FailureKind::Network);
    assert_eq!(document.failures[1].kind, FailureKind::Parse);
    assert_eq!(document.text(), format!("root{}fine", PAGE_SEPARATOR));

    let mut failed_events = 0;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, CrawlEvent::PageFailed { .. }) {
            failed_events += 1;
        }
    }
    assert_eq!(failed_events, 2);
}

#[tokio::test]
async fn test_shared_image_downloaded_once_and_listed_once() {
    let server = MockServer::start().await;
    let assets = TempDir::new().unwrap();

    mount_page(
        &server,
        "/",
        r#"<p>root</p><img src="/shared.png"><a href="/other">other</a>"#,
    )
    .await;
    mount_page(&server, "/other", r#"<p>other</p><img src="shared.png">"#).await;
    Mock::given(method("GET"))
        .and(path("/shared.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(png_bytes(), "image/png"))
        .expect(1)
        .mount(&server)
        .await;

    let document = run_crawl(create_test_config(&server, &assets, 1)).await.unwrap();

    assert_eq!(document.assets.len(), 1);
    assert_eq!(document.pages[0].assets, document.pages[1].assets);
}

#[tokio::test]
async fn test_markdown_hand_off() {
    let server = MockServer::start().await;
    let assets = TempDir::new().unwrap();

    mount_page(
        &server,
        "/",
        r#"<html><head><title>Start</title></head><body><p>Hello</p><img src="/pic.png"></body></html>"#,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/pic.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(png_bytes(), "image/png"))
        .mount(&server)
        .await;

    let config = create_test_config(&server, &assets, 1);
    let output_path = config.output.document_path.clone();
    let document = run_crawl(config).await.unwrap();

    write_markdown(&document, &output_path).unwrap();
    let written = std::fs::read_to_string(&output_path).unwrap();

    assert_eq!(written, format_markdown(&document));
    assert!(written.contains("## Start"));
    assert!(written.contains("Hello"));
    assert!(written.contains(&format!("]({})", document.assets[0].display())));
}

#[tokio::test]
async fn test_invalid_seed_rejected() {
    let result = run_crawl(Config::for_seed("mailto:someone@example.test")).await;
    assert!(matches!(result, Err(BinderError::InvalidSeed { .. })));

    let result = run_crawl(Config::for_seed("not a url")).await;
    assert!(matches!(result, Err(BinderError::InvalidSeed { .. })));
}
