//! Site-Binder: offline capture of a single website
//!
//! This crate walks a site's internal link graph from a seed URL, extracts the
//! readable text and images of every reachable page, and assembles them into a
//! single ordered document that an external renderer can turn into a file.

pub mod config;
pub mod crawler;
pub mod output;
pub mod render;
pub mod state;
pub mod url;

use thiserror::Error;

/// Main error type for Site-Binder operations
///
/// Only conditions that prevent a run from starting end up here. Failures of
/// individual pages or assets are reported through the event stream instead.
#[derive(Debug, Error)]
pub enum BinderError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid seed URL '{url}': {reason}")]
    InvalidSeed { url: String, reason: String },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// Result type alias for Site-Binder operations
pub type Result<T> = std::result::Result<T, BinderError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{run_crawl, Coordinator, CrawlEvent, EventSink};
pub use output::{Document, DocumentPage};
pub use state::{FrontierEntry, PageResult, PageStatus};
pub use url::{normalize_url, LinkClass, LinkClassifier};
