//! Frontier management for the crawl
//!
//! The frontier owns the visited set and the pending queue. A URL is admitted
//! at most once over the whole run: once queued or visited, later discoveries
//! of the same normalized URL are ignored.

use crate::url::{LinkClass, LinkClassifier};
use std::collections::{HashSet, VecDeque};
use url::Url;

/// A URL waiting to be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    /// Normalized absolute URL
    pub url: Url,

    /// Link distance from the seed (the seed is 0)
    pub depth: u32,

    /// Assigned at enqueue time; strictly increasing over the run
    pub seq: u64,
}

/// Counters describing what the frontier admitted and rejected
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrontierStats {
    pub enqueued: u64,
    pub duplicates: u64,
    pub rejected_depth: u64,
    pub rejected_excluded: u64,
    pub rejected_invalid: u64,
}

/// Breadth-first frontier with a depth bound
#[derive(Debug)]
pub struct Frontier {
    classifier: LinkClassifier,
    max_depth: u32,
    queue: VecDeque<FrontierEntry>,
    queued: HashSet<String>,
    visited: HashSet<String>,
    next_seq: u64,
    stats: FrontierStats,
}

impl Frontier {
    /// Creates an empty frontier
    ///
    /// # Arguments
    ///
    /// * `classifier` - Decides which discovered hrefs are internal
    /// * `max_depth` - Entries deeper than this are never queued
    pub fn new(classifier: LinkClassifier, max_depth: u32) -> Self {
        Self {
            classifier,
            max_depth,
            queue: VecDeque::new(),
            queued: HashSet::new(),
            visited: HashSet::new(),
            next_seq: 0,
            stats: FrontierStats::default(),
        }
    }

    /// Queues the seed at depth 0
    ///
    /// The seed bypasses the keyword policy; it was chosen by the operator.
    pub fn enqueue_seed(&mut self, seed: Url) -> bool {
        self.admit(seed, 0)
    }

    /// Queues `href` found on `base_url` at `depth` if it is new and allowed
    ///
    /// Returns `true` only when a new entry was added. Rejected when:
    /// - `depth` exceeds the configured bound
    /// - the classifier marks the href `Excluded` or `Invalid`
    /// - the normalized URL is already visited or already queued
    pub fn enqueue_if_new(&mut self, href: &str, base_url: &Url, depth: u32) -> bool {
        if depth > self.max_depth {
            self.stats.rejected_depth += 1;
            return false;
        }

        match self.classifier.classify(href, base_url) {
            LinkClass::Internal(url) => self.admit(url, depth),
            LinkClass::Excluded(reason) => {
                tracing::trace!("Excluded link {}: {:?}", href, reason);
                self.stats.rejected_excluded += 1;
                false
            }
            LinkClass::Invalid => {
                tracing::trace!("Invalid link {}", href);
                self.stats.rejected_invalid += 1;
                false
            }
        }
    }

    fn admit(&mut self, url: Url, depth: u32) -> bool {
        let key = url.as_str();
        if self.visited.contains(key) || self.queued.contains(key) {
            self.stats.duplicates += 1;
            return false;
        }

        self.queued.insert(key.to_string());
        let seq = self.next_seq;
        self.next_seq += 1;
        self.stats.enqueued += 1;

        tracing::trace!("Queued [{}] depth {}: {}", seq, depth, url);
        self.queue.push_back(FrontierEntry { url, depth, seq });
        true
    }

    /// Takes the oldest pending entry and claims it as visited
    ///
    /// Entries whose URL became visited while they waited (for example as the
    /// redirect target of another page) are skipped.
    pub fn dequeue(&mut self) -> Option<FrontierEntry> {
        while let Some(entry) = self.queue.pop_front() {
            self.queued.remove(entry.url.as_str());
            if self.mark_visited(&entry.url) {
                return Some(entry);
            }
            self.stats.duplicates += 1;
        }
        None
    }

    /// Records `url` as visited; returns `false` if it already was
    pub fn mark_visited(&mut self, url: &Url) -> bool {
        self.visited.insert(url.as_str().to_string())
    }

    pub fn is_visited(&self, url: &Url) -> bool {
        self.visited.contains(url.as_str())
    }

    /// Number of entries waiting to be dequeued
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Pending entries in dequeue order
    pub fn pending_entries(&self) -> impl Iterator<Item = &FrontierEntry> {
        self.queue.iter()
    }

    pub fn stats(&self) -> FrontierStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::url::ExclusionPolicy;

    fn seed() -> Url {
        Url::parse("https://example.test/").unwrap()
    }

    fn frontier(max_depth: u32) -> Frontier {
        let classifier = LinkClassifier::new(&seed(), ExclusionPolicy::default()).unwrap();
        Frontier::new(classifier, max_depth)
    }

    #[test]
    fn test_seed_then_children() {
        let mut frontier = frontier(1);
        assert!(frontier.enqueue_seed(seed()));

        let entry = frontier.dequeue().unwrap();
        assert_eq!(entry.seq, 0);
        assert_eq!(entry.depth, 0);

        assert!(frontier.enqueue_if_new("/a", &entry.url, 1));
        assert!(frontier.enqueue_if_new("/b", &entry.url, 1));
        assert!(!frontier.enqueue_if_new("https://other.test/x", &entry.url, 1));

        let pending: Vec<_> = frontier
            .pending_entries()
            .map(|e| (e.url.as_str().to_string(), e.depth))
            .collect();
        assert_eq!(
            pending,
            vec![
                ("https://example.test/a".to_string(), 1),
                ("https://example.test/b".to_string(), 1),
            ]
        );
        assert_eq!(frontier.stats().rejected_excluded, 1);
    }

    #[test]
    fn test_depth_bound() {
        let mut frontier = frontier(1);
        frontier.enqueue_seed(seed());
        assert!(!frontier.enqueue_if_new("/deep", &seed(), 2));
        assert_eq!(frontier.stats().rejected_depth, 1);
        assert_eq!(frontier.pending(), 1);
    }

    #[test]
    fn test_duplicates_rejected_while_queued_and_after_visit() {
        let mut frontier = frontier(3);
        frontier.enqueue_seed(seed());

        assert!(frontier.enqueue_if_new("/a", &seed(), 1));
        assert!(!frontier.enqueue_if_new("/a#frag", &seed(), 1));

        frontier.dequeue();
        frontier.dequeue();
        assert!(!frontier.enqueue_if_new("/a", &seed(), 2));
        assert!(!frontier.enqueue_if_new("/", &seed(), 1));
        assert_eq!(frontier.stats().duplicates, 3);
    }

    #[test]
    fn test_fifo_order_and_monotonic_seq() {
        let mut frontier = frontier(5);
        frontier.enqueue_seed(seed());
        for path in ["/c", "/a", "/b"] {
            frontier.enqueue_if_new(path, &seed(), 1);
        }

        let mut seqs = Vec::new();
        let mut paths = Vec::new();
        while let Some(entry) = frontier.dequeue() {
            seqs.push(entry.seq);
            paths.push(entry.url.path().to_string());
        }

        assert_eq!(seqs, vec![0, 1, 2, 3]);
        assert_eq!(paths, vec!["/", "/c", "/a", "/b"]);
    }

    #[test]
    fn test_mark_visited_idempotent() {
        let mut frontier = frontier(1);
        let url = Url::parse("https://example.test/x").unwrap();
        assert!(frontier.mark_visited(&url));
        assert!(!frontier.mark_visited(&url));
        assert!(frontier.is_visited(&url));
    }

    #[test]
    fn test_visited_while_queued_is_skipped() {
        let mut frontier = frontier(2);
        frontier.enqueue_seed(seed());
        frontier.enqueue_if_new("/moved", &seed(), 1);

        let redirected = Url::parse("https://example.test/moved").unwrap();
        frontier.mark_visited(&redirected);

        assert_eq!(frontier.dequeue().unwrap().url, seed());
        assert!(frontier.dequeue().is_none());
    }

    #[test]
    fn test_invalid_and_excluded_never_queued() {
        let classifier = LinkClassifier::new(
            &seed(),
            ExclusionPolicy::from(&crate::config::LinkConfig::default()),
        )
        .unwrap();
        let mut frontier = Frontier::new(classifier, 3);

        assert!(!frontier.enqueue_if_new("mailto:a@example.test", &seed(), 1));
        assert!(!frontier.enqueue_if_new("/p?utm_source=x", &seed(), 1));
        assert!(!frontier.enqueue_if_new("/newsletter", &seed(), 1));
        assert!(frontier.is_empty());
        assert_eq!(frontier.stats().rejected_invalid, 1);
        assert_eq!(frontier.stats().rejected_excluded, 2);
    }
}
