//! Statistics for a finished crawl
//!
//! Summarizes a `Document` for display after a run.

use crate::output::Document;
use crate::state::{FailureKind, FrontierStats};
use std::collections::BTreeMap;

/// Crawl statistics summary
#[derive(Debug, Clone, Default)]
pub struct CrawlStatistics {
    /// Pages captured (with or without content)
    pub pages: u64,

    /// Captured pages with neither text nor images
    pub empty_pages: u64,

    /// Total characters of extracted text
    pub text_chars: u64,

    /// Failed pages by kind
    pub failures: BTreeMap<String, u64>,

    /// Captured pages by extraction strategy ("none" when nothing was found)
    pub strategies: BTreeMap<String, u64>,

    /// Captured pages by depth
    pub depths: BTreeMap<u32, u64>,

    /// Distinct asset files
    pub assets: u64,

    /// Asset files that are page screenshots
    pub screenshots: u64,

    pub frontier: FrontierStats,
    pub duration_seconds: i64,
    pub cancelled: bool,
}

impl CrawlStatistics {
    pub fn from_document(document: &Document) -> Self {
        let mut stats = Self {
            pages: document.pages.len() as u64,
            assets: document.assets.len() as u64,
            frontier: document.frontier,
            duration_seconds: document.duration_seconds(),
            cancelled: document.cancelled,
            ..Self::default()
        };

        let mut screenshot_paths = Vec::new();
        for page in &document.pages {
            if page.is_empty() {
                stats.empty_pages += 1;
            }
            stats.text_chars += page.text.chars().count() as u64;

            let strategy = page
                .strategy
                .map(|s| s.to_string())
                .unwrap_or_else(|| "none".to_string());
            *stats.strategies.entry(strategy).or_insert(0) += 1;
            *stats.depths.entry(page.depth).or_insert(0) += 1;

            for asset in page.assets.iter().filter(|a| a.screenshot) {
                if !screenshot_paths.contains(&asset.path) {
                    screenshot_paths.push(asset.path.clone());
                }
            }
        }
        stats.screenshots = screenshot_paths.len() as u64;

        for failure in &document.failures {
            *stats.failures.entry(failure.kind.to_string()).or_insert(0) += 1;
        }

        stats
    }

    pub fn total_failures(&self) -> u64 {
        self.failures.values().sum()
    }

    /// Share of attempted pages that were captured, in percent
    pub fn success_rate(&self) -> f64 {
        let attempted = self.pages + self.total_failures();
        if attempted == 0 {
            0.0
        } else {
            (self.pages as f64 / attempted as f64) * 100.0
        }
    }

    pub fn failures_of(&self, kind: FailureKind) -> u64 {
        self.failures.get(&kind.to_string()).copied().unwrap_or(0)
    }
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Overview:");
    println!("  Pages captured: {}", stats.pages);
    println!("  Pages without content: {}", stats.empty_pages);
    println!("  Text extracted: {} chars", stats.text_chars);
    println!(
        "  Images: {} ({} screenshots)",
        stats.assets, stats.screenshots
    );
    println!("  Duration: {}s", stats.duration_seconds);
    if stats.cancelled {
        println!("  Run was cancelled; capture is partial");
    }
    println!();

    println!("Extraction Strategies:");
    for (strategy, count) in &stats.strategies {
        println!("  {}: {}", strategy, count);
    }
    println!();

    println!("Pages by Depth:");
    for (depth, count) in &stats.depths {
        println!("  {}: {}", depth, count);
    }
    println!();

    println!("Links:");
    println!("  Queued: {}", stats.frontier.enqueued);
    println!("  Duplicates: {}", stats.frontier.duplicates);
    println!("  Beyond depth bound: {}", stats.frontier.rejected_depth);
    println!("  Excluded: {}", stats.frontier.rejected_excluded);
    println!("  Invalid: {}", stats.frontier.rejected_invalid);
    println!();

    if !stats.failures.is_empty() {
        println!("Failure Summary:");
        for (kind, count) in &stats.failures {
            println!("  {}: {}", kind, count);
        }
        println!();
    }

    println!(
        "Success Rate: {:.1}% ({} / {} pages captured)",
        stats.success_rate(),
        stats.pages,
        stats.pages + stats.total_failures()
    );
}
