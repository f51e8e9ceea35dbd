use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Desktop browser identity presented to sites that gate content on it
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36";

/// Main configuration structure for Site-Binder
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub links: LinkConfig,
    #[serde(default)]
    pub rendering: RenderingConfig,
    #[serde(default)]
    pub assets: AssetConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Builds a configuration with defaults for everything but the seed
    pub fn for_seed(seed: impl Into<String>) -> Self {
        Self {
            crawler: CrawlerConfig {
                seed: seed.into(),
                max_depth: default_max_depth(),
                workers: default_workers(),
                page_delay_ms: 0,
                deadline_secs: None,
            },
            fetcher: FetcherConfig::default(),
            links: LinkConfig::default(),
            rendering: RenderingConfig::default(),
            assets: AssetConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Absolute http(s) URL the crawl starts from
    pub seed: String,

    /// Maximum link depth from the seed (the seed is depth 0)
    #[serde(rename = "max-depth", default = "default_max_depth")]
    pub max_depth: u32,

    /// Number of pages processed concurrently
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// Fixed delay applied before each dequeue (milliseconds)
    #[serde(rename = "page-delay-ms", default)]
    pub page_delay_ms: u64,

    /// Optional bound on the whole run (seconds)
    #[serde(rename = "deadline-secs", default)]
    pub deadline_secs: Option<u64>,
}

impl CrawlerConfig {
    pub fn page_delay(&self) -> Option<Duration> {
        (self.page_delay_ms > 0).then(|| Duration::from_millis(self.page_delay_ms))
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }
}

/// Page fetching configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FetcherConfig {
    /// Total number of attempts per page, including the first
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed delay between attempts (milliseconds)
    #[serde(rename = "retry-delay-ms", default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Per-request timeout (seconds)
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// User-Agent header sent with page requests
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum redirect hops followed per request
    #[serde(rename = "max-redirects", default = "default_max_redirects")]
    pub max_redirects: usize,
}

impl FetcherConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            max_redirects: default_max_redirects(),
        }
    }
}

/// Link filtering configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LinkConfig {
    /// Record mailto:, tel: and javascript: links on the page instead of dropping them
    #[serde(rename = "surface-invalid", default)]
    pub surface_invalid: bool,

    /// Category name -> substrings that exclude an href (case-sensitive)
    #[serde(default = "default_exclusions")]
    pub exclusions: BTreeMap<String, Vec<String>>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            surface_invalid: false,
            exclusions: default_exclusions(),
        }
    }
}

/// Headless rendering configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RenderingConfig {
    /// Enables the rendered-markup extraction step and screenshot fallback
    #[serde(default)]
    pub dynamic: bool,

    /// Chrome/Chromium executable used for rendering
    #[serde(rename = "chrome-path", default = "default_chrome_path")]
    pub chrome_path: String,

    /// Upper bound for one render or screenshot (seconds)
    #[serde(rename = "timeout-secs", default = "default_render_timeout_secs")]
    pub timeout_secs: u64,
}

impl RenderingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for RenderingConfig {
    fn default() -> Self {
        Self {
            dynamic: false,
            chrome_path: default_chrome_path(),
            timeout_secs: default_render_timeout_secs(),
        }
    }
}

/// Image asset configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AssetConfig {
    /// Directory downloaded images are written to
    #[serde(default = "default_asset_dir")]
    pub directory: PathBuf,

    /// Recognized image extensions (lowercase, without dot)
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            directory: default_asset_dir(),
            extensions: default_extensions(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path of the Markdown document handed to the renderer
    #[serde(rename = "document-path", default = "default_document_path")]
    pub document_path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            document_path: default_document_path(),
        }
    }
}

fn default_max_depth() -> u32 {
    2
}

fn default_workers() -> u32 {
    4
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_max_redirects() -> usize {
    10
}

fn default_chrome_path() -> String {
    "chromium".to_string()
}

fn default_render_timeout_secs() -> u64 {
    60
}

fn default_asset_dir() -> PathBuf {
    PathBuf::from("./assets")
}

fn default_document_path() -> PathBuf {
    PathBuf::from("./capture.md")
}

fn default_extensions() -> Vec<String> {
    ["jpg", "jpeg", "png", "gif", "bmp", "webp", "tiff"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_exclusions() -> BTreeMap<String, Vec<String>> {
    let categories: [(&str, &[&str]); 4] = [
        ("tracking", &["utm_", "fbclid", "gclid"]),
        ("advertising", &["/ads/", "doubleclick", "adservice"]),
        ("subscription", &["subscribe", "newsletter"]),
        ("payment", &["checkout", "payment", "/cart"]),
    ];

    categories
        .iter()
        .map(|(name, keywords)| {
            (
                name.to_string(),
                keywords.iter().map(|k| k.to_string()).collect(),
            )
        })
        .collect()
}
