//! Headless rendering capability
//!
//! Rendering is the expensive path: it is only used when the cheaper
//! extraction strategies come up empty and for screenshot fallbacks of images
//! that could not be downloaded. Callers hold one `Renderer` for the whole run
//! and go through this trait, so tests can substitute a scripted renderer.

mod chrome;

pub use chrome::ChromeRenderer;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors produced by a renderer
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Failed to launch renderer '{binary}': {source}")]
    Launch {
        binary: String,
        source: std::io::Error,
    },

    #[error("Rendering {url} timed out after {elapsed:?}")]
    Timeout { url: String, elapsed: Duration },

    #[error("Renderer failed for {url}: {message}")]
    Failed { url: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Renders pages through a headless browser
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Returns the markup of `url` after scripts have run
    async fn render(&self, url: &Url) -> Result<String, RenderError>;

    /// Returns a full-page PNG screenshot of `url`
    async fn screenshot(&self, url: &Url) -> Result<Vec<u8>, RenderError>;
}
