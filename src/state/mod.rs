//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `Frontier`: visited set plus breadth-first queue of `FrontierEntry`s
//! - `PageResult`: immutable outcome of processing one entry

mod frontier;
mod page;

// Re-export main types
pub use frontier::{Frontier, FrontierEntry, FrontierStats};
pub use page::{FailureKind, PageContent, PageResult, PageStatus};
