//! Configuration module for Site-Binder
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use site_binder::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("binder.toml")).unwrap();
//! println!("Crawler will use max depth: {}", config.crawler.max_depth);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    AssetConfig, Config, CrawlerConfig, FetcherConfig, LinkConfig, OutputConfig,
    RenderingConfig, DEFAULT_USER_AGENT,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::{validate, validate_seed, MAX_WORKERS};
