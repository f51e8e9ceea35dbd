//! Progress and failure events emitted during a crawl
//!
//! Events are delivered synchronously from the coordinator task, so a sink
//! must not block. `ChannelSink` hands events to another task; `LogSink`
//! writes them through `tracing`.

use crate::crawler::Strategy;
use crate::state::FailureKind;
use std::path::PathBuf;
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Clone, PartialEq)]
pub enum CrawlEvent {
    PageCompleted {
        url: String,
        seq: u64,
        strategy: Option<Strategy>,
        chars: usize,
    },
    PageFailed {
        url: String,
        seq: u64,
        kind: FailureKind,
        reason: String,
    },
    AssetResolved {
        source: String,
        path: PathBuf,
    },
    AssetFailed {
        source: String,
        reason: String,
    },
    /// A mailto:, tel: or javascript: href surfaced instead of dropped
    InvalidLink {
        page: String,
        href: String,
    },
    /// `fraction` is `completed / (completed + in_flight + pending)`
    Progress {
        completed: usize,
        in_flight: usize,
        pending: usize,
        fraction: f64,
    },
    Cancelled,
    Finished {
        pages: usize,
        failures: usize,
    },
}

/// Receives crawl events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: CrawlEvent);
}

/// Forwards events to an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: UnboundedSender<CrawlEvent>,
}

impl ChannelSink {
    pub fn new(tx: UnboundedSender<CrawlEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: CrawlEvent) {
        // Receiver gone means nobody is listening any more
        let _ = self.tx.send(event);
    }
}

/// Writes events to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: CrawlEvent) {
        match event {
            CrawlEvent::PageCompleted {
                url,
                seq,
                strategy,
                chars,
            } => match strategy {
                Some(strategy) => {
                    tracing::info!("[{}] {} ({} chars via {})", seq, url, chars, strategy)
                }
                None => tracing::info!("[{}] {} (no text)", seq, url),
            },
            CrawlEvent::PageFailed {
                url,
                seq,
                kind,
                reason,
            } => tracing::warn!("[{}] {} failed ({}): {}", seq, url, kind, reason),
            CrawlEvent::AssetResolved { source, path } => {
                tracing::debug!("Asset {} -> {}", source, path.display())
            }
            CrawlEvent::AssetFailed { source, reason } => {
                tracing::warn!("Asset {} dropped: {}", source, reason)
            }
            CrawlEvent::InvalidLink { page, href } => {
                tracing::debug!("Non-navigable link on {}: {}", page, href)
            }
            CrawlEvent::Progress {
                completed,
                in_flight,
                pending,
                fraction,
            } => tracing::info!(
                "Progress: {:.1}% ({} done, {} in flight, {} pending)",
                fraction * 100.0,
                completed,
                in_flight,
                pending
            ),
            CrawlEvent::Cancelled => tracing::info!("Crawl cancelled, finishing in-flight pages"),
            CrawlEvent::Finished { pages, failures } => {
                tracing::info!("Crawl finished: {} pages, {} failures", pages, failures)
            }
        }
    }
}

/// Progress estimate; the denominator grows as links are discovered
pub fn progress_fraction(completed: usize, in_flight: usize, pending: usize) -> f64 {
    let total = completed + in_flight + pending;
    if total == 0 {
        1.0
    } else {
        completed as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_fraction() {
        assert_eq!(progress_fraction(0, 0, 0), 1.0);
        assert_eq!(progress_fraction(1, 1, 2), 0.25);
        assert_eq!(progress_fraction(3, 0, 0), 1.0);
    }

    #[tokio::test]
    async fn test_channel_sink_delivers_in_order() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sink = ChannelSink::new(tx);

        sink.emit(CrawlEvent::Cancelled);
        sink.emit(CrawlEvent::Finished {
            pages: 2,
            failures: 0,
        });

        assert_eq!(rx.recv().await, Some(CrawlEvent::Cancelled));
        assert_eq!(
            rx.recv().await,
            Some(CrawlEvent::Finished {
                pages: 2,
                failures: 0
            })
        );
    }

    #[test]
    fn test_channel_sink_tolerates_closed_receiver() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        drop(rx);
        ChannelSink::new(tx).emit(CrawlEvent::Cancelled);
    }
}
