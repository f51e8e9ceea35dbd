use crate::config::{FetcherConfig, RenderingConfig};
use crate::render::{RenderError, Renderer};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::{Output, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::Semaphore;
use url::Url;

/// Flags shared by every headless invocation
const BASE_ARGS: &[&str] = &[
    "--headless=new",
    "--disable-gpu",
    "--no-sandbox",
    "--disable-dev-shm-usage",
    "--disable-extensions",
    "--no-first-run",
    "--hide-scrollbars",
];

/// Tall viewport so one screenshot covers most pages
const SCREENSHOT_WINDOW: &str = "--window-size=1280,4096";

/// Concurrent browser processes allowed per renderer
const MAX_CONCURRENT_RENDERS: usize = 2;

/// Renderer that drives a Chrome/Chromium executable in headless mode
///
/// `render` uses `--dump-dom`; `screenshot` uses `--screenshot` into a scratch
/// file that is removed after reading.
pub struct ChromeRenderer {
    binary: PathBuf,
    user_agent: String,
    timeout: Duration,
    scratch_dir: PathBuf,
    permits: Semaphore,
    counter: AtomicU64,
}

impl ChromeRenderer {
    pub fn new(binary: impl Into<PathBuf>, user_agent: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            user_agent: user_agent.into(),
            timeout,
            scratch_dir: std::env::temp_dir(),
            permits: Semaphore::new(MAX_CONCURRENT_RENDERS),
            counter: AtomicU64::new(0),
        }
    }

    pub fn from_config(rendering: &RenderingConfig, fetcher: &FetcherConfig) -> Self {
        Self::new(
            &rendering.chrome_path,
            &fetcher.user_agent,
            rendering.timeout(),
        )
    }

    fn scratch_file(&self) -> PathBuf {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        self.scratch_dir
            .join(format!("site-binder-{}-{}.png", std::process::id(), n))
    }

    async fn run(&self, url: &Url, extra: &[String]) -> Result<Output, RenderError> {
        let _permit = self.permits.acquire().await.map_err(|e| RenderError::Failed {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let mut command = Command::new(&self.binary);
        command
            .args(BASE_ARGS)
            .arg(format!("--user-agent={}", self.user_agent))
            .args(extra)
            .arg(url.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!("Rendering {} with {}", url, self.binary.display());

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| RenderError::Timeout {
                url: url.to_string(),
                elapsed: self.timeout,
            })?
            .map_err(|source| RenderError::Launch {
                binary: self.binary.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RenderError::Failed {
                url: url.to_string(),
                message: format!(
                    "exit status {}: {}",
                    output.status,
                    stderr.lines().last().unwrap_or("").trim()
                ),
            });
        }

        Ok(output)
    }
}

#[async_trait]
impl Renderer for ChromeRenderer {
    async fn render(&self, url: &Url) -> Result<String, RenderError> {
        let output = self.run(url, &["--dump-dom".to_string()]).await?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn screenshot(&self, url: &Url) -> Result<Vec<u8>, RenderError> {
        let path = self.scratch_file();
        let args = [
            format!("--screenshot={}", path.display()),
            SCREENSHOT_WINDOW.to_string(),
        ];

        self.run(url, &args).await?;

        let bytes = tokio::fs::read(&path).await?;
        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::debug!("Could not remove scratch file {}: {}", path.display(), e);
        }

        if bytes.is_empty() {
            return Err(RenderError::Failed {
                url: url.to_string(),
                message: "empty screenshot".to_string(),
            });
        }

        Ok(bytes)
    }
}
