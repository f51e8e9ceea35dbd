//! Output module for assembling and handing off a capture
//!
//! This module handles:
//! - Ordering page results into the final `Document`
//! - Writing the document as Markdown for the external renderer
//! - Summarizing run statistics

mod document;
mod markdown;
pub mod stats;

pub use document::{Document, DocumentAssembler, DocumentPage, PageFailure, PAGE_SEPARATOR};
pub use markdown::{format_markdown, write_markdown};
pub use stats::{print_statistics, CrawlStatistics};

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;
