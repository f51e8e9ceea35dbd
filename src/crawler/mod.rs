//! Crawler module for page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with retry logic
//! - HTML parsing and link harvesting
//! - Text extraction with escalating strategies
//! - Image asset resolution
//! - Overall crawl coordination and progress events

pub mod assets;
mod coordinator;
pub mod events;
pub mod extract;
mod fetcher;
mod parser;

pub use assets::{AssetError, AssetFormat, AssetResolver, ResolvedAsset};
pub use coordinator::{run_crawl, Coordinator};
pub use events::{ChannelSink, CrawlEvent, EventSink, LogSink};
pub use extract::{extract_static, Extraction, Extractor, Strategy};
pub use fetcher::{build_http_client, Fetch, FetchError, FetchedPage, HttpFetcher};
pub use parser::{parse_document, parse_page, ParsedPage};
