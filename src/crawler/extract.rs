//! Text extraction with escalating strategies
//!
//! Strategies run in a fixed order and the pipeline only moves to the next one
//! when the current one produced no text:
//!
//! 1. `Paragraphs`: the text of every `<p>`, separated by a blank line
//! 2. `Containers`: the text of every `<div>`/`<span>`, nested containers
//!    contributing their own entry
//! 3. `Rendered*`: the page is rendered by a headless browser and 1 then 2
//!    are re-run on the rendered markup (only with dynamic rendering enabled)

use crate::render::Renderer;
use scraper::{ElementRef, Html, Node, Selector};
use std::fmt;
use std::sync::Arc;
use url::Url;

/// Which strategy produced a page's text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    Paragraphs,
    Containers,
    RenderedParagraphs,
    RenderedContainers,
}

impl Strategy {
    /// Whether the headless renderer was needed
    pub fn is_rendered(&self) -> bool {
        matches!(self, Self::RenderedParagraphs | Self::RenderedContainers)
    }

    fn rendered(self) -> Self {
        match self {
            Self::Paragraphs => Self::RenderedParagraphs,
            Self::Containers => Self::RenderedContainers,
            other => other,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Paragraphs => write!(f, "paragraphs"),
            Self::Containers => write!(f, "containers"),
            Self::RenderedParagraphs => write!(f, "rendered/paragraphs"),
            Self::RenderedContainers => write!(f, "rendered/containers"),
        }
    }
}

/// Result of running the pipeline on one page
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Extracted text; empty when every strategy came up empty
    pub text: String,

    pub strategy: Option<Strategy>,

    /// Rendered markup, when the renderer was invoked successfully
    pub rendered: Option<String>,
}

/// Runs the extraction strategies for a page
#[derive(Clone)]
pub struct Extractor {
    renderer: Option<Arc<dyn Renderer>>,
    dynamic: bool,
}

impl Extractor {
    /// # Arguments
    ///
    /// * `renderer` - Headless capability used by the rendered strategies
    /// * `dynamic` - Whether escalating to the renderer is allowed at all
    pub fn new(renderer: Option<Arc<dyn Renderer>>, dynamic: bool) -> Self {
        Self { renderer, dynamic }
    }

    fn can_render(&self) -> bool {
        self.dynamic && self.renderer.is_some()
    }

    /// Extracts text from `markup`, fetched from `url`
    pub async fn extract(&self, markup: &str, url: &Url) -> Extraction {
        if let Some((strategy, text)) = extract_static(markup) {
            return Extraction {
                text,
                strategy: Some(strategy),
                rendered: None,
            };
        }

        let renderer = match &self.renderer {
            Some(renderer) if self.can_render() => renderer,
            _ => return Extraction::default(),
        };

        tracing::debug!("Static extraction empty for {}, rendering", url);

        match renderer.render(url).await {
            Ok(rendered) => {
                let found = extract_static(&rendered);
                let (strategy, text) = match found {
                    Some((strategy, text)) => (Some(strategy.rendered()), text),
                    None => (None, String::new()),
                };
                Extraction {
                    text,
                    strategy,
                    rendered: Some(rendered),
                }
            }
            Err(e) => {
                tracing::warn!("Render failed for {}: {}", url, e);
                Extraction::default()
            }
        }
    }
}

impl fmt::Debug for Extractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extractor")
            .field("dynamic", &self.dynamic)
            .field("renderer", &self.renderer.is_some())
            .finish()
    }
}

/// Runs the paragraph then container strategies on `markup`
///
/// Returns `None` when both yield no text.
pub fn extract_static(markup: &str) -> Option<(Strategy, String)> {
    let document = Html::parse_document(markup);

    let paragraphs = paragraph_text(&document);
    if !paragraphs.is_empty() {
        return Some((Strategy::Paragraphs, paragraphs));
    }

    let containers = container_text(&document);
    if !containers.is_empty() {
        return Some((Strategy::Containers, containers));
    }

    None
}

fn paragraph_text(document: &Html) -> String {
    let Ok(selector) = Selector::parse("p") else {
        return String::new();
    };

    document
        .select(&selector)
        .map(|p| collapse_whitespace(&p.text().collect::<String>()))
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Elements whose subtree never contributes container text
const SKIPPED: &[&str] = &["div", "span", "script", "style", "noscript", "template"];

/// Elements that flow into the surrounding text without a word break
const INLINE: &[&str] = &[
    "a", "abbr", "b", "bdi", "bdo", "cite", "code", "data", "dfn", "em", "i", "kbd", "mark", "q",
    "s", "samp", "small", "strong", "sub", "sup", "time", "u", "var",
];

/// Text of each container in document order
///
/// Nested `div`/`span` subtrees are left out of their parent's text since
/// they are emitted as containers of their own.
fn container_text(document: &Html) -> String {
    let Ok(selector) = Selector::parse("div, span") else {
        return String::new();
    };

    document
        .select(&selector)
        .map(own_text)
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn own_text(element: ElementRef<'_>) -> String {
    let mut raw = String::new();
    push_text(element, &mut raw);
    collapse_whitespace(&raw)
}

fn push_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) if SKIPPED.contains(&el.name()) => out.push(' '),
            Node::Element(el) => {
                let Some(child) = ElementRef::wrap(child) else {
                    continue;
                };
                if INLINE.contains(&el.name()) {
                    push_text(child, out);
                } else {
                    out.push(' ');
                    push_text(child, out);
                    out.push(' ');
                }
            }
            _ => {}
        }
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::RenderError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Renderer returning canned markup and counting calls
    struct ScriptedRenderer {
        markup: Option<String>,
        calls: AtomicUsize,
    }

    impl ScriptedRenderer {
        fn new(markup: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                markup: markup.map(str::to_string),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Renderer for ScriptedRenderer {
        async fn render(&self, url: &Url) -> Result<String, RenderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.markup.clone().ok_or_else(|| RenderError::Failed {
                url: url.to_string(),
                message: "scripted failure".to_string(),
            })
        }

        async fn screenshot(&self, url: &Url) -> Result<Vec<u8>, RenderError> {
            Err(RenderError::Failed {
                url: url.to_string(),
                message: "not scripted".to_string(),
            })
        }
    }

    fn url() -> Url {
        Url::parse("https://example.test/page").unwrap()
    }

    #[test]
    fn test_paragraphs_joined_by_blank_line() {
        let html = "<html><body><p>First   para</p><p></p><p>Second\n para</p></body></html>";
        let (strategy, text) = extract_static(html).unwrap();
        assert_eq!(strategy, Strategy::Paragraphs);
        assert_eq!(text, "First para\n\nSecond para");
    }

    #[test]
    fn test_containers_use_own_text_only() {
        let html = r#"<html><body>
            <div>outer <span>inner</span> tail</div>
            <div><div>nested</div></div>
        </body></html>"#;
        let (strategy, text) = extract_static(html).unwrap();
        assert_eq!(strategy, Strategy::Containers);
        assert_eq!(text, "outer tail\ninner\nnested");
    }

    #[test]
    fn test_containers_keep_inline_children() {
        let html = r#"<div>hello <b>world</b>, see <a href="/x">the docs</a> or v<sub>2</sub></div>"#;
        let (strategy, text) = extract_static(html).unwrap();
        assert_eq!(strategy, Strategy::Containers);
        assert_eq!(text, "hello world, see the docs or v2");
    }

    #[test]
    fn test_containers_keep_headings_and_lists() {
        let html = r#"<html><body><div>
            <h2>Heading</h2><ul><li>first</li><li>second</li></ul>
            <script>var hidden = 1;</script>
        </div></body></html>"#;
        let (strategy, text) = extract_static(html).unwrap();
        assert_eq!(strategy, Strategy::Containers);
        assert_eq!(text, "Heading first second");
    }

    #[test]
    fn test_nothing_found() {
        assert!(extract_static("<html><body><ul><li>x</li></ul></body></html>").is_none());
    }

    #[tokio::test]
    async fn test_div_text_without_dynamic_never_renders() {
        let renderer = ScriptedRenderer::new(Some("<p>rendered</p>"));
        let extractor = Extractor::new(Some(renderer.clone()), false);

        let result = extractor
            .extract("<html><body><div>hello</div></body></html>", &url())
            .await;

        assert_eq!(result.text, "hello");
        assert_eq!(result.strategy, Some(Strategy::Containers));
        assert_eq!(renderer.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_page_without_dynamic_is_empty() {
        let renderer = ScriptedRenderer::new(Some("<p>rendered</p>"));
        let extractor = Extractor::new(Some(renderer.clone()), false);

        let result = extractor.extract("<html><body></body></html>", &url()).await;

        assert!(result.text.is_empty());
        assert!(result.strategy.is_none());
        assert_eq!(renderer.calls(), 0);
    }

    #[tokio::test]
    async fn test_escalates_to_renderer_when_static_empty() {
        let renderer = ScriptedRenderer::new(Some("<html><body><p>from js</p></body></html>"));
        let extractor = Extractor::new(Some(renderer.clone()), true);

        let result = extractor
            .extract("<html><body><script>app()</script></body></html>", &url())
            .await;

        assert_eq!(result.text, "from js");
        assert_eq!(result.strategy, Some(Strategy::RenderedParagraphs));
        assert!(result.rendered.is_some());
        assert_eq!(renderer.calls(), 1);
    }

    #[tokio::test]
    async fn test_static_success_skips_renderer_even_when_dynamic() {
        let renderer = ScriptedRenderer::new(Some("<p>rendered</p>"));
        let extractor = Extractor::new(Some(renderer.clone()), true);

        let result = extractor.extract("<p>static</p>", &url()).await;

        assert_eq!(result.strategy, Some(Strategy::Paragraphs));
        assert_eq!(renderer.calls(), 0);
    }

    #[tokio::test]
    async fn test_render_failure_counts_as_empty() {
        let renderer = ScriptedRenderer::new(None);
        let extractor = Extractor::new(Some(renderer.clone()), true);

        let result = extractor.extract("<html></html>", &url()).await;

        assert!(result.text.is_empty());
        assert!(result.strategy.is_none());
        assert!(result.rendered.is_none());
        assert_eq!(renderer.calls(), 1);
    }

    #[test]
    fn test_strategy_display() {
        assert_eq!(Strategy::Containers.to_string(), "containers");
        assert!(Strategy::RenderedContainers.is_rendered());
        assert!(!Strategy::Paragraphs.is_rendered());
    }
}
