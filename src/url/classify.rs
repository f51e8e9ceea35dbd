//! Link classification
//!
//! Decides whether an href found on a page is worth visiting. The classifier
//! is a pure function of the href, the page it was found on, the seed host and
//! the configured keyword policy.

use crate::config::LinkConfig;
use crate::url::normalize::normalize_parsed;
use std::collections::BTreeMap;
use url::Url;

/// Schemes that never lead to a crawlable page
const INVALID_SCHEMES: &[&str] = &["mailto:", "tel:", "javascript:", "data:"];

/// Outcome of classifying one href
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkClass {
    /// Same host as the seed; carries the normalized absolute URL
    Internal(Url),

    /// Well-formed but filtered out by policy
    Excluded(ExclusionReason),

    /// Not a crawlable http(s) reference at all
    Invalid,
}

impl LinkClass {
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(_))
    }
}

/// Why a link was excluded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExclusionReason {
    /// Raw href contained a keyword from the named policy category
    Keyword { category: String, keyword: String },

    /// Resolved URL points at a different host than the seed
    ExternalHost(String),
}

/// Named keyword categories checked against raw hrefs
///
/// Matching is a case-sensitive substring test. Categories are checked in
/// name order so the reported category is stable.
#[derive(Debug, Clone, Default)]
pub struct ExclusionPolicy {
    categories: BTreeMap<String, Vec<String>>,
}

impl ExclusionPolicy {
    pub fn new(categories: BTreeMap<String, Vec<String>>) -> Self {
        Self { categories }
    }

    /// Returns the first category/keyword pair contained in `href`
    pub fn matches(&self, href: &str) -> Option<ExclusionReason> {
        self.categories.iter().find_map(|(category, keywords)| {
            keywords
                .iter()
                .find(|keyword| href.contains(keyword.as_str()))
                .map(|keyword| ExclusionReason::Keyword {
                    category: category.clone(),
                    keyword: keyword.clone(),
                })
        })
    }

    pub fn is_empty(&self) -> bool {
        self.categories.values().all(|k| k.is_empty())
    }
}

impl From<&LinkConfig> for ExclusionPolicy {
    fn from(config: &LinkConfig) -> Self {
        Self::new(config.exclusions.clone())
    }
}

/// Classifies hrefs relative to a fixed seed host
#[derive(Debug, Clone)]
pub struct LinkClassifier {
    seed_host: String,
    policy: ExclusionPolicy,
}

impl LinkClassifier {
    /// Creates a classifier for the host of `seed`
    ///
    /// Returns `None` when the seed has no host.
    pub fn new(seed: &Url, policy: ExclusionPolicy) -> Option<Self> {
        let seed_host = seed.host_str()?.to_lowercase();
        Some(Self { seed_host, policy })
    }

    pub fn seed_host(&self) -> &str {
        &self.seed_host
    }

    /// Classifies `href` as found on the page at `base_url`
    ///
    /// # Rules
    ///
    /// 1. `mailto:`, `tel:`, `javascript:` and `data:` hrefs are `Invalid`
    /// 2. Hrefs containing a policy keyword are `Excluded`
    /// 3. Hrefs that do not resolve to an http(s) URL are `Invalid`
    /// 4. Resolved URLs on another host are `Excluded`
    /// 5. Everything else is `Internal`, normalized
    ///
    /// # Examples
    ///
    /// ```
    /// use site_binder::url::{ExclusionPolicy, LinkClass, LinkClassifier};
    /// use url::Url;
    ///
    /// let seed = Url::parse("https://example.test/").unwrap();
    /// let classifier = LinkClassifier::new(&seed, ExclusionPolicy::default()).unwrap();
    ///
    /// assert!(classifier.classify("/a", &seed).is_internal());
    /// assert_eq!(classifier.classify("mailto:x@example.test", &seed), LinkClass::Invalid);
    /// assert!(!classifier.classify("https://other.test/x", &seed).is_internal());
    /// ```
    pub fn classify(&self, href: &str, base_url: &Url) -> LinkClass {
        let href = href.trim();

        if href.is_empty() || is_invalid_scheme(href) {
            return LinkClass::Invalid;
        }

        if let Some(reason) = self.policy.matches(href) {
            return LinkClass::Excluded(reason);
        }

        let resolved = match base_url.join(href) {
            Ok(url) => url,
            Err(_) => return LinkClass::Invalid,
        };

        let normalized = match normalize_parsed(resolved) {
            Ok(url) => url,
            Err(_) => return LinkClass::Invalid,
        };

        match normalized.host_str() {
            Some(host) if host == self.seed_host => LinkClass::Internal(normalized),
            Some(host) => LinkClass::Excluded(ExclusionReason::ExternalHost(host.to_string())),
            None => LinkClass::Invalid,
        }
    }
}

/// Returns true for hrefs using a scheme that never names a page
pub fn is_invalid_scheme(href: &str) -> bool {
    let lower = href.trim_start().to_ascii_lowercase();
    INVALID_SCHEMES.iter().any(|scheme| lower.starts_with(scheme))
}
