//! Document assembly
//!
//! Page results arrive in completion order. The assembler buffers them by
//! discovery sequence and `finalize` lays them out in that order, so the same
//! seed and options always produce the same document however workers were
//! scheduled.

use crate::crawler::{ResolvedAsset, Strategy};
use crate::state::{FailureKind, FrontierStats, PageResult, PageStatus};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use url::Url;

/// Line placed between page texts in `Document::text`
pub const PAGE_SEPARATOR: &str = "\n\n----------------------------------------\n\n";

/// One captured page, in document order
#[derive(Debug, Clone)]
pub struct DocumentPage {
    pub url: Url,
    pub seq: u64,
    pub depth: u32,
    pub title: Option<String>,
    pub text: String,
    pub strategy: Option<Strategy>,

    /// Images for this page in reference order
    pub assets: Vec<ResolvedAsset>,

    /// Non-navigable hrefs recorded for this page
    pub annotations: Vec<String>,
}

impl DocumentPage {
    /// True when the page contributed neither text nor images
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.assets.is_empty()
    }
}

/// A page that could not be captured
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFailure {
    pub url: Url,
    pub seq: u64,
    pub kind: FailureKind,
    pub reason: String,
}

/// The finished capture handed to the renderer
#[derive(Debug, Clone)]
pub struct Document {
    pub seed: Url,

    /// Captured pages ordered by discovery sequence
    pub pages: Vec<DocumentPage>,

    /// Failed pages ordered by discovery sequence
    pub failures: Vec<PageFailure>,

    /// Every asset path once, first appearance in page order
    pub assets: Vec<PathBuf>,

    /// The run was stopped before the frontier drained
    pub cancelled: bool,

    pub frontier: FrontierStats,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    /// SHA-256 of the configuration file, when loaded from one
    pub config_hash: Option<String>,
}

impl Document {
    /// Page texts joined by `PAGE_SEPARATOR`, skipping pages without text
    pub fn text(&self) -> String {
        self.pages
            .iter()
            .filter(|page| !page.text.is_empty())
            .map(|page| page.text.as_str())
            .collect::<Vec<_>>()
            .join(PAGE_SEPARATOR)
    }

    pub fn is_empty(&self) -> bool {
        self.pages.iter().all(DocumentPage::is_empty)
    }

    pub fn duration_seconds(&self) -> i64 {
        (self.finished_at - self.started_at).num_seconds()
    }
}

/// Collects page results and produces the ordered `Document`
#[derive(Debug)]
pub struct DocumentAssembler {
    seed: Url,
    started_at: DateTime<Utc>,
    results: BTreeMap<u64, PageResult>,
}

impl DocumentAssembler {
    pub fn new(seed: Url) -> Self {
        Self {
            seed,
            started_at: Utc::now(),
            results: BTreeMap::new(),
        }
    }

    /// Buffers a result; a second result for the same sequence is ignored
    pub fn merge(&mut self, result: PageResult) {
        if self.results.contains_key(&result.seq) {
            tracing::warn!("Ignoring duplicate result for [{}] {}", result.seq, result.url);
            return;
        }
        self.results.insert(result.seq, result);
    }

    /// Number of results merged so far
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn failures(&self) -> usize {
        self.results.values().filter(|r| !r.is_success()).count()
    }

    /// Orders everything by discovery sequence and builds the document
    pub fn finalize(self, cancelled: bool, frontier: FrontierStats) -> Document {
        let mut pages = Vec::new();
        let mut failures = Vec::new();
        let mut assets = Vec::new();
        let mut seen_assets = HashSet::new();

        // BTreeMap iterates in ascending seq
        for (seq, result) in self.results {
            match result.status {
                PageStatus::Ok(content) => {
                    for asset in &content.assets {
                        if seen_assets.insert(asset.path.clone()) {
                            assets.push(asset.path.clone());
                        }
                    }

                    pages.push(DocumentPage {
                        url: result.url,
                        seq,
                        depth: result.depth,
                        title: content.title,
                        text: content.text,
                        strategy: content.strategy,
                        assets: content.assets,
                        annotations: content.annotations,
                    });
                }
                PageStatus::Failed { kind, reason } => failures.push(PageFailure {
                    url: result.url,
                    seq,
                    kind,
                    reason,
                }),
            }
        }

        Document {
            seed: self.seed,
            pages,
            failures,
            assets,
            cancelled,
            frontier,
            started_at: self.started_at,
            finished_at: Utc::now(),
            config_hash: None,
        }
    }
}
