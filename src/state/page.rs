/// Per-page results produced by crawl workers
///
/// A `PageResult` is created once by the worker that processed the page and
/// is never modified afterwards.
use crate::crawler::{ResolvedAsset, Strategy};
use crate::state::FrontierEntry;
use std::fmt;
use url::Url;

/// Why a page could not be captured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Timeout, connection error, or non-2xx status after all attempts
    Network,

    /// A response arrived but could not be used as markup
    Parse,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::Parse => write!(f, "parse"),
        }
    }
}

/// Content captured from a successfully fetched page
#[derive(Debug, Clone, Default)]
pub struct PageContent {
    /// URL after redirects; relative links are resolved against it
    pub final_url: Option<Url>,

    /// Text of the `<title>` element, if any
    pub title: Option<String>,

    /// Extracted text, possibly empty
    pub text: String,

    /// Strategy that produced `text`; `None` when every strategy came up empty
    pub strategy: Option<Strategy>,

    /// Raw hrefs harvested from the page, in document order
    pub links: Vec<String>,

    /// Images resolved for this page, in reference order
    pub assets: Vec<ResolvedAsset>,

    /// Non-navigable hrefs (mailto:, tel:, javascript:) kept when configured
    pub annotations: Vec<String>,
}

impl PageContent {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.assets.is_empty()
    }
}

/// Outcome of processing one frontier entry
#[derive(Debug, Clone)]
pub enum PageStatus {
    Ok(PageContent),
    Failed { kind: FailureKind, reason: String },
}

/// Result of processing one frontier entry
#[derive(Debug, Clone)]
pub struct PageResult {
    pub url: Url,
    pub seq: u64,
    pub depth: u32,
    pub status: PageStatus,
}

impl PageResult {
    pub fn ok(entry: &FrontierEntry, content: PageContent) -> Self {
        Self {
            url: entry.url.clone(),
            seq: entry.seq,
            depth: entry.depth,
            status: PageStatus::Ok(content),
        }
    }

    pub fn failed(entry: &FrontierEntry, kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            url: entry.url.clone(),
            seq: entry.seq,
            depth: entry.depth,
            status: PageStatus::Failed {
                kind,
                reason: reason.into(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, PageStatus::Ok(_))
    }

    pub fn content(&self) -> Option<&PageContent> {
        match &self.status {
            PageStatus::Ok(content) => Some(content),
            PageStatus::Failed { .. } => None,
        }
    }

    /// Base URL for resolving this page's links
    pub fn base_url(&self) -> &Url {
        self.content()
            .and_then(|c| c.final_url.as_ref())
            .unwrap_or(&self.url)
    }
}
