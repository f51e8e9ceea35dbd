//! Image asset resolution
//!
//! Image references found on a page are resolved to absolute URLs, downloaded
//! once per run, normalized to a format the document renderer understands and
//! written to the asset directory. When a download fails and a renderer is
//! available, a screenshot of the referencing page stands in for the image.

use crate::config::{AssetConfig, FetcherConfig};
use crate::render::Renderer;
use futures::future::join_all;
use image::ImageFormat;
use reqwest::header::USER_AGENT;
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::OnceCell;
use url::Url;

/// Hex characters of the URL hash appended to asset file names
const NAME_HASH_LEN: usize = 12;

/// Longest file stem kept from the source URL
const MAX_STEM_LEN: usize = 64;

/// Formats assets are stored in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetFormat {
    Png,
    Jpeg,
    Gif,
}

impl AssetFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Gif => "gif",
        }
    }
}

impl fmt::Display for AssetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// An image stored in the asset directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAsset {
    /// Absolute URL the image was referenced by
    pub source: Url,

    /// Local file holding the image
    pub path: PathBuf,

    pub format: AssetFormat,

    /// Whether the file is a screenshot of the referencing page
    pub screenshot: bool,
}

/// Why an image reference could not be resolved
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("Unsupported image reference: {0}")]
    UnsupportedExtension(String),

    #[error("Download of {url} failed: {message}")]
    Download { url: String, message: String },

    #[error("Could not decode image {url}: {message}")]
    Decode { url: String, message: String },

    #[error("Could not write asset {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Screenshot fallback for {url} failed: {message}")]
    Screenshot { url: String, message: String },

    #[error("{url} already failed earlier in this run")]
    PreviouslyFailed { url: String },
}

type AssetCell = Arc<OnceCell<Option<ResolvedAsset>>>;

/// Resolves image references to local files, once per distinct URL
///
/// # Resolution Steps
///
/// 1. Resolve the reference against the page URL
/// 2. Reject paths whose extension is not configured
/// 3. Return the cached entry if this URL was already resolved in the run
/// 4. Download with a plain request, then once more with the browser user agent
/// 5. Keep PNG/JPEG/GIF bytes as they are; re-encode anything else to PNG
/// 6. On failure, fall back to a screenshot of the page (renderer required)
pub struct AssetResolver {
    client: Client,
    user_agent: String,
    directory: PathBuf,
    extensions: HashSet<String>,
    renderer: Option<Arc<dyn Renderer>>,
    cache: Mutex<HashMap<String, AssetCell>>,
    screenshots: Mutex<HashMap<String, AssetCell>>,
}

impl AssetResolver {
    /// Creates a resolver without screenshot fallback
    pub fn new(assets: &AssetConfig, fetcher: &FetcherConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(fetcher.timeout())
            .redirect(reqwest::redirect::Policy::limited(fetcher.max_redirects))
            .build()?;

        Ok(Self {
            client,
            user_agent: fetcher.user_agent.clone(),
            directory: assets.directory.clone(),
            extensions: assets
                .extensions
                .iter()
                .map(|ext| ext.to_ascii_lowercase())
                .collect(),
            renderer: None,
            cache: Mutex::new(HashMap::new()),
            screenshots: Mutex::new(HashMap::new()),
        })
    }

    /// Enables the screenshot fallback
    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Number of distinct image URLs seen so far
    pub fn cached(&self) -> usize {
        self.cache.lock().map(|cache| cache.len()).unwrap_or(0)
    }

    /// Resolves every reference of one page concurrently, keeping input order
    pub async fn resolve_all(
        &self,
        sources: &[String],
        page_url: &Url,
    ) -> Vec<(String, Result<ResolvedAsset, AssetError>)> {
        let resolutions = sources.iter().map(|src| async move {
            (src.clone(), self.resolve(src, page_url).await)
        });
        join_all(resolutions).await
    }

    /// Resolves one image reference found on `page_url`
    pub async fn resolve(&self, src: &str, page_url: &Url) -> Result<ResolvedAsset, AssetError> {
        let source = resolve_source(src, page_url)
            .ok_or_else(|| AssetError::UnsupportedExtension(src.to_string()))?;

        if !self.has_allowed_extension(&source) {
            return Err(AssetError::UnsupportedExtension(source.to_string()));
        }

        // Only the download outcome is shared; the fallback depends on the page
        let cell = cell_for(&self.cache, source.as_str());
        let mut failure = None;
        let slot = &mut failure;
        let target = &source;

        let downloaded = cell
            .get_or_init(|| async move {
                match self.download_and_store(target).await {
                    Ok(asset) => Some(asset),
                    Err(e) => {
                        tracing::debug!("{}", e);
                        *slot = Some(e);
                        None
                    }
                }
            })
            .await;

        if let Some(asset) = downloaded {
            return Ok(asset.clone());
        }

        let failure = failure.unwrap_or_else(|| AssetError::PreviouslyFailed {
            url: source.to_string(),
        });
        match self.screenshot_fallback(&source, page_url).await {
            Ok(asset) => Ok(asset),
            Err(Some(fallback)) => Err(fallback),
            Err(None) => Err(failure),
        }
    }

    fn has_allowed_extension(&self, url: &Url) -> bool {
        url_extension(url)
            .map(|ext| self.extensions.contains(&ext))
            .unwrap_or(false)
    }

    async fn download_and_store(&self, source: &Url) -> Result<ResolvedAsset, AssetError> {
        let bytes = self.download(source).await?;
        let (format, bytes) = normalize_image(source, bytes)?;
        let path = self.directory.join(asset_file_name(source, format));
        self.write(&path, &bytes).await?;

        tracing::debug!("Stored {} as {}", source, path.display());
        Ok(ResolvedAsset {
            source: source.clone(),
            path,
            format,
            screenshot: false,
        })
    }

    async fn download(&self, source: &Url) -> Result<Vec<u8>, AssetError> {
        match self.get(source, false).await {
            Ok(bytes) => Ok(bytes),
            Err(first) => {
                tracing::debug!("Plain download of {} failed ({}), retrying", source, first);
                self.get(source, true).await.map_err(|message| AssetError::Download {
                    url: source.to_string(),
                    message,
                })
            }
        }
    }

    async fn get(&self, source: &Url, spoof: bool) -> Result<Vec<u8>, String> {
        let mut request = self.client.get(source.clone());
        if spoof {
            request = request.header(USER_AGENT, self.user_agent.as_str());
        }

        let response = request.send().await.map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {}", status.as_u16()));
        }

        let bytes = response.bytes().await.map_err(|e| e.to_string())?;
        if bytes.is_empty() {
            return Err("empty body".to_string());
        }
        Ok(bytes.to_vec())
    }

    /// Screenshots `page_url` once per run
    ///
    /// `Err(None)` means no renderer is configured.
    async fn screenshot_fallback(
        &self,
        source: &Url,
        page_url: &Url,
    ) -> Result<ResolvedAsset, Option<AssetError>> {
        let Some(renderer) = &self.renderer else {
            return Err(None);
        };

        let cell = cell_for(&self.screenshots, page_url.as_str());
        let mut failure = None;
        let slot = &mut failure;

        let captured = cell
            .get_or_init(|| async move {
                tracing::debug!("Falling back to screenshot of {} for {}", page_url, source);
                let result = match renderer.screenshot(page_url).await {
                    Ok(bytes) => self.store_screenshot(page_url, bytes).await,
                    Err(e) => Err(AssetError::Screenshot {
                        url: page_url.to_string(),
                        message: e.to_string(),
                    }),
                };
                match result {
                    Ok(asset) => Some(asset),
                    Err(e) => {
                        *slot = Some(e);
                        None
                    }
                }
            })
            .await;

        match captured {
            Some(asset) => Ok(ResolvedAsset {
                source: source.clone(),
                ..asset.clone()
            }),
            None => Err(Some(failure.unwrap_or_else(|| AssetError::Screenshot {
                url: page_url.to_string(),
                message: "screenshot already failed".to_string(),
            }))),
        }
    }

    async fn store_screenshot(&self, page_url: &Url, bytes: Vec<u8>) -> Result<ResolvedAsset, AssetError> {
        let (format, bytes) = normalize_image(page_url, bytes)?;
        let name = format!("screenshot-{}.{}", short_hash(page_url), format.extension());
        let path = self.directory.join(name);
        self.write(&path, &bytes).await?;

        Ok(ResolvedAsset {
            source: page_url.clone(),
            path,
            format,
            screenshot: true,
        })
    }

    async fn write(&self, path: &Path, bytes: &[u8]) -> Result<(), AssetError> {
        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|source| AssetError::Write {
                path: self.directory.clone(),
                source,
            })?;

        tokio::fs::write(path, bytes)
            .await
            .map_err(|source| AssetError::Write {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Removes every file in the asset directory
    ///
    /// Assets must outlive the document hand-off, so this is left to callers.
    /// Returns the number of files removed; a missing directory counts as empty.
    pub async fn clear_directory(directory: &Path) -> std::io::Result<usize> {
        let mut entries = match tokio::fs::read_dir(directory).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                tokio::fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn cell_for(map: &Mutex<HashMap<String, AssetCell>>, key: &str) -> AssetCell {
    match map.lock() {
        Ok(mut map) => map.entry(key.to_string()).or_default().clone(),
        // A poisoned map only loses deduplication, not correctness
        Err(poisoned) => poisoned
            .into_inner()
            .entry(key.to_string())
            .or_default()
            .clone(),
    }
}

/// Resolves `src` against the page, keeping only http(s) URLs
fn resolve_source(src: &str, page_url: &Url) -> Option<Url> {
    let mut url = page_url.join(src.trim()).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    url.set_fragment(None);
    Some(url)
}

/// Lowercased extension of the URL's last path segment
fn url_extension(url: &Url) -> Option<String> {
    let name = url.path_segments()?.next_back()?;
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Keeps PNG/JPEG/GIF as downloaded and re-encodes other raster formats to PNG
fn normalize_image(source: &Url, bytes: Vec<u8>) -> Result<(AssetFormat, Vec<u8>), AssetError> {
    let decode_error = |message: String| AssetError::Decode {
        url: source.to_string(),
        message,
    };

    let detected = image::guess_format(&bytes).map_err(|e| decode_error(e.to_string()))?;
    match detected {
        ImageFormat::Png => return Ok((AssetFormat::Png, bytes)),
        ImageFormat::Jpeg => return Ok((AssetFormat::Jpeg, bytes)),
        ImageFormat::Gif => return Ok((AssetFormat::Gif, bytes)),
        _ => {}
    }

    let decoded = image::load_from_memory_with_format(&bytes, detected)
        .map_err(|e| decode_error(e.to_string()))?;

    let mut png = Vec::new();
    decoded
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| decode_error(e.to_string()))?;

    tracing::trace!("Converted {:?} image {} to PNG", detected, source);
    Ok((AssetFormat::Png, png))
}

fn short_hash(url: &Url) -> String {
    let digest = hex::encode(Sha256::digest(url.as_str().as_bytes()));
    digest[..NAME_HASH_LEN].to_string()
}

/// `<basename stem>-<url hash>.<ext>`, unique per source URL
fn asset_file_name(source: &Url, format: AssetFormat) -> String {
    let basename = source
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("");
    let stem = basename.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(basename);

    let mut sanitized: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .take(MAX_STEM_LEN)
        .collect();
    if sanitized.is_empty() {
        sanitized.push_str("image");
    }

    format!("{}-{}.{}", sanitized, short_hash(source), format.extension())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::RenderError;
    use async_trait::async_trait;
    use image::{DynamicImage, RgbImage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn encoded(format: ImageFormat) -> Vec<u8> {
        let image = DynamicImage::ImageRgb8(RgbImage::new(2, 2));
        let mut bytes = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
        bytes
    }

    fn resolver(dir: &TempDir) -> AssetResolver {
        let assets = AssetConfig {
            directory: dir.path().to_path_buf(),
            ..AssetConfig::default()
        };
        AssetResolver::new(&assets, &FetcherConfig::default()).unwrap()
    }

    fn page(server: &MockServer) -> Url {
        Url::parse(&format!("{}/gallery/", server.uri())).unwrap()
    }

    struct ScreenshotRenderer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Renderer for ScreenshotRenderer {
        async fn render(&self, url: &Url) -> Result<String, RenderError> {
            Err(RenderError::Failed {
                url: url.to_string(),
                message: "not scripted".to_string(),
            })
        }

        async fn screenshot(&self, _url: &Url) -> Result<Vec<u8>, RenderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(encoded(ImageFormat::Png))
        }
    }

    #[test]
    fn test_asset_file_name() {
        let url = Url::parse("https://example.test/img/My Photo.final.JPG").unwrap();
        let name = asset_file_name(&url, AssetFormat::Jpeg);
        assert!(name.starts_with("My_20Photo_final-"));
        assert!(name.ends_with(".jpg"));

        let other = Url::parse("https://example.test/other/My Photo.final.JPG").unwrap();
        assert_ne!(name, asset_file_name(&other, AssetFormat::Jpeg));
    }

    #[test]
    fn test_url_extension() {
        let ext = |s: &str| url_extension(&Url::parse(s).unwrap());
        assert_eq!(ext("https://example.test/a/b.PNG?x=1"), Some("png".to_string()));
        assert_eq!(ext("https://example.test/a/"), None);
        assert_eq!(ext("https://example.test/.hidden"), None);
    }

    #[tokio::test]
    async fn test_unsupported_extension_rejected_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let resolver = resolver(&dir);

        let result = resolver.resolve("/icon.svg", &page(&server)).await;
        assert!(matches!(result, Err(AssetError::UnsupportedExtension(_))));

        let result = resolver.resolve("data:image/png;base64,AA", &page(&server)).await;
        assert!(matches!(result, Err(AssetError::UnsupportedExtension(_))));
    }

    #[tokio::test]
    async fn test_same_image_downloaded_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gallery/cat.png"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(encoded(ImageFormat::Png), "image/png"))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let resolver = resolver(&dir);
        let page_url = page(&server);

        let first = resolver.resolve("cat.png", &page_url).await.unwrap();
        let second = resolver.resolve("/gallery/cat.png", &page_url).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.format, AssetFormat::Png);
        assert!(first.path.exists());
        assert_eq!(resolver.cached(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_download() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gallery/dog.jpg"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(encoded(ImageFormat::Jpeg), "image/jpeg")
                    .set_delay(std::time::Duration::from_millis(50)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let resolver = resolver(&dir);
        let sources = vec!["dog.jpg".to_string(), "dog.jpg".to_string()];

        let results = resolver.resolve_all(&sources, &page(&server)).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(_, r)| r.is_ok()));
    }

    #[tokio::test]
    async fn test_non_standard_format_converted_to_png() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gallery/old.bmp"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(encoded(ImageFormat::Bmp), "image/bmp"))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let resolver = resolver(&dir);

        let asset = resolver.resolve("old.bmp", &page(&server)).await.unwrap();
        assert_eq!(asset.format, AssetFormat::Png);
        assert_eq!(asset.path.extension().unwrap(), "png");

        let stored = std::fs::read(&asset.path).unwrap();
        assert_eq!(image::guess_format(&stored).unwrap(), ImageFormat::Png);
    }

    #[tokio::test]
    async fn test_retries_with_browser_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gallery/guarded.png"))
            .and(header("user-agent", crate::config::DEFAULT_USER_AGENT))
            .respond_with(ResponseTemplate::new(200).set_body_raw(encoded(ImageFormat::Png), "image/png"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gallery/guarded.png"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let resolver = resolver(&dir);

        assert!(resolver.resolve("guarded.png", &page(&server)).await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_download_without_renderer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gallery/missing.png"))
            .respond_with(ResponseTemplate::new(404))
            .expect(2)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let resolver = resolver(&dir);
        let page_url = page(&server);

        let first = resolver.resolve("missing.png", &page_url).await;
        assert!(matches!(first, Err(AssetError::Download { .. })));

        let second = resolver.resolve("missing.png", &page_url).await;
        assert!(matches!(second, Err(AssetError::PreviouslyFailed { .. })));
    }

    #[tokio::test]
    async fn test_screenshot_fallback_once_per_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let renderer = Arc::new(ScreenshotRenderer {
            calls: AtomicUsize::new(0),
        });
        let resolver = resolver(&dir).with_renderer(renderer.clone());
        let page_url = page(&server);

        let a = resolver.resolve("a.png", &page_url).await.unwrap();
        let b = resolver.resolve("b.gif", &page_url).await.unwrap();

        assert!(a.screenshot && b.screenshot);
        assert_eq!(a.path, b.path);
        assert_ne!(a.source, b.source);
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_image_falls_back_to_each_referencing_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/logo.png"))
            .respond_with(ResponseTemplate::new(404))
            .expect(2)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let renderer = Arc::new(ScreenshotRenderer {
            calls: AtomicUsize::new(0),
        });
        let resolver = resolver(&dir).with_renderer(renderer.clone());
        let first_page = Url::parse(&format!("{}/first", server.uri())).unwrap();
        let second_page = Url::parse(&format!("{}/second", server.uri())).unwrap();

        let on_first = resolver.resolve("/logo.png", &first_page).await.unwrap();
        let on_second = resolver.resolve("/logo.png", &second_page).await.unwrap();

        assert!(on_first.screenshot && on_second.screenshot);
        assert_ne!(on_first.path, on_second.path);
        assert_eq!(on_first.source, on_second.source);
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_clear_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.png"), b"x").unwrap();
        std::fs::write(dir.path().join("b.png"), b"y").unwrap();

        assert_eq!(AssetResolver::clear_directory(dir.path()).await.unwrap(), 2);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        let missing = dir.path().join("missing");
        assert_eq!(AssetResolver::clear_directory(&missing).await.unwrap(), 0);
    }
}
