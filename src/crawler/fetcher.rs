//! HTTP fetcher implementation
//!
//! This module handles all page requests for the crawler, including:
//! - Building one HTTP client per run (spoofed user agent, cookie session)
//! - GET requests with redirect following and a per-request timeout
//! - Fixed-delay retry for transport and status failures
//! - Error classification into network and parse failures

use crate::config::FetcherConfig;
use crate::state::FailureKind;
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Upper bound on connection setup, independent of the request timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A successfully fetched page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Page body decoded as text
    pub markup: String,

    /// URL after redirects
    pub final_url: Url,
}

/// Why a fetch failed
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Network failure for {url} after {attempts} attempt(s): {message}")]
    Network {
        url: String,
        attempts: u32,
        message: String,
    },

    #[error("Unusable response from {url}: {message}")]
    Parse { url: String, message: String },
}

impl FetchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Network { .. } => FailureKind::Network,
            Self::Parse { .. } => FailureKind::Parse,
        }
    }
}

/// Fetches page markup
///
/// The coordinator only talks to this trait, so tests can replace the network
/// with scripted pages.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError>;
}

/// Builds the HTTP client shared by every fetch in a run
///
/// The client keeps a cookie store, so session cookies set by one page are
/// sent with every later request of the same run.
///
/// # Example
///
/// ```no_run
/// use site_binder::config::FetcherConfig;
/// use site_binder::crawler::build_http_client;
///
/// let client = build_http_client(&FetcherConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &FetcherConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(config.timeout())
        .connect_timeout(CONNECT_TIMEOUT.min(config.timeout()))
        .redirect(Policy::limited(config.max_redirects))
        .cookie_store(true)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Outcome of a single attempt
enum AttemptError {
    /// Worth retrying: transport error or non-2xx status
    Transient(String),

    /// Retrying would not help
    Permanent(String),
}

/// `Fetch` implementation over reqwest with bounded retries
///
/// # Retry Logic
///
/// | Condition                        | Action                          |
/// |----------------------------------|---------------------------------|
/// | Timeout / connection error       | Retry after fixed delay         |
/// | Non-2xx status after redirects   | Retry after fixed delay         |
/// | Body read interrupted            | Retry after fixed delay         |
/// | Non-markup Content-Type          | Immediate `Parse` failure       |
/// | Attempts exhausted               | `Network` failure               |
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    max_attempts: u32,
    retry_delay: Duration,
}

impl HttpFetcher {
    pub fn new(config: &FetcherConfig) -> Result<Self, reqwest::Error> {
        Ok(Self::with_client(build_http_client(config)?, config))
    }

    /// Wraps an existing client, keeping the retry policy from `config`
    pub fn with_client(client: Client, config: &FetcherConfig) -> Self {
        Self {
            client,
            max_attempts: config.max_attempts.max(1),
            retry_delay: config.retry_delay(),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn attempt(&self, url: &Url) -> Result<FetchedPage, AttemptError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| AttemptError::Transient(describe_reqwest_error(&e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AttemptError::Transient(format!("HTTP {}", status.as_u16())));
        }

        let final_url = response.url().clone();

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if !is_markup_content_type(&content_type) {
            return Err(AttemptError::Permanent(format!(
                "expected markup, got Content-Type '{}'",
                content_type
            )));
        }

        let markup = response
            .text()
            .await
            .map_err(|e| AttemptError::Transient(describe_reqwest_error(&e)))?;

        Ok(FetchedPage { markup, final_url })
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            tracing::debug!("GET {} (attempt {}/{})", url, attempt, self.max_attempts);

            match self.attempt(url).await {
                Ok(page) => return Ok(page),
                Err(AttemptError::Permanent(message)) => {
                    return Err(FetchError::Parse {
                        url: url.to_string(),
                        message,
                    });
                }
                Err(AttemptError::Transient(message)) => {
                    tracing::debug!("Attempt {} for {} failed: {}", attempt, url, message);
                    last_error = message;
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        Err(FetchError::Network {
            url: url.to_string(),
            attempts: self.max_attempts,
            message: last_error,
        })
    }
}

/// Accepts HTML, XML and plain text; a missing header is given the benefit of the doubt
fn is_markup_content_type(content_type: &str) -> bool {
    let lower = content_type.to_ascii_lowercase();
    lower.is_empty() || lower.contains("html") || lower.contains("xml") || lower.starts_with("text/")
}

fn describe_reqwest_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "request timeout".to_string()
    } else if e.is_connect() {
        "connection failed".to_string()
    } else if e.is_redirect() {
        "too many redirects".to_string()
    } else {
        e.to_string()
    }
}
