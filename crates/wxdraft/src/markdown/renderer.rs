//! Markdown to WeChat-ready HTML.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use async_trait::async_trait;
use pulldown_cmark::{html, CowStr, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

static IMG_SRC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(<img\b[^>]*?\bsrc\s*=\s*)(["'])([^"']*)(["'])"#)
        .unwrap_or_else(|e| panic!("invalid img src pattern: {e}"))
});

/// A per-image problem that did not stop the render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageWarning {
    pub reference: String,
    pub reason: String,
}

impl fmt::Display for ImageWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Image '{}': {}", self.reference, self.reason)
    }
}

/// Turns a local image reference from the Markdown into a remote URL.
#[async_trait]
pub trait ImageResolver: Send + Sync {
    async fn resolve(&self, reference: &str) -> Result<String, ImageWarning>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedHtml {
    pub html: String,
    pub warnings: Vec<ImageWarning>,
}

/// Whether an image source points at a local file that needs uploading.
pub fn is_local_reference(src: &str) -> bool {
    let src = src.trim();
    let lower = src.to_ascii_lowercase();
    !(src.is_empty()
        || lower.starts_with("http://")
        || lower.starts_with("https://")
        || lower.starts_with("data:")
        || lower.starts_with("//"))
}

pub struct MarkdownRenderer<R> {
    resolver: R,
    options: Options,
}

impl<R: ImageResolver> MarkdownRenderer<R> {
    pub fn new(resolver: R) -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_FOOTNOTES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        Self { resolver, options }
    }

    /// Renders `markdown` to an HTML fragment. Every distinct local image is
    /// resolved once, in document order; failures leave the original
    /// reference in place and are reported as warnings.
    pub async fn render(&self, markdown: &str) -> RenderedHtml {
        let events: Vec<Event<'_>> = Parser::new_ext(markdown, self.options).collect();

        let mut resolved: HashMap<String, String> = HashMap::new();
        let mut warnings = Vec::new();
        for src in collect_local_images(&events) {
            match self.resolver.resolve(&src).await {
                Ok(url) => {
                    resolved.insert(src, url);
                }
                Err(warning) => {
                    tracing::warn!(%warning, "image left unresolved");
                    warnings.push(warning);
                }
            }
        }

        let mut output = String::with_capacity(markdown.len() * 2);
        html::push_html(&mut output, rewrite(events, &resolved).into_iter());

        RenderedHtml {
            html: output,
            warnings,
        }
    }
}

/// Local image sources in document order, without duplicates.
fn collect_local_images(events: &[Event<'_>]) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    let mut push = |src: &str| {
        if is_local_reference(src) && !found.iter().any(|s| s == src) {
            found.push(src.to_string());
        }
    };

    for event in events {
        match event {
            Event::Start(Tag::Image { dest_url, .. }) => push(dest_url.as_ref()),
            Event::Html(raw) | Event::InlineHtml(raw) => {
                for caps in IMG_SRC.captures_iter(raw) {
                    push(&caps[3]);
                }
            }
            _ => {}
        }
    }
    found
}

fn rewrite<'a>(events: Vec<Event<'a>>, resolved: &HashMap<String, String>) -> Vec<Event<'a>> {
    events
        .into_iter()
        .map(|event| match event {
            Event::Start(Tag::Image {
                link_type,
                dest_url,
                title,
                id,
            }) => {
                let dest_url = match resolved.get(&*dest_url) {
                    Some(url) => CowStr::from(url.clone()),
                    None => dest_url,
                };
                Event::Start(Tag::Image {
                    link_type,
                    dest_url,
                    title,
                    id,
                })
            }
            Event::Html(raw) => Event::Html(replace_img_sources(raw, resolved)),
            Event::InlineHtml(raw) => Event::InlineHtml(replace_img_sources(raw, resolved)),
            Event::Start(Tag::Heading {
                level, id, classes, ..
            }) => Event::Html(heading_open(level, id.as_deref(), &classes).into()),
            Event::End(TagEnd::Heading(level)) => Event::Html(
                format!(
                    "</span><span class=\"suffix\"></span></{}>\n",
                    heading_tag(level)
                )
                .into(),
            ),
            other => other,
        })
        .collect()
}

fn replace_img_sources<'a>(raw: CowStr<'a>, resolved: &HashMap<String, String>) -> CowStr<'a> {
    if resolved.is_empty() || !IMG_SRC.is_match(&raw) {
        return raw;
    }
    let replaced = IMG_SRC.replace_all(&raw, |caps: &Captures<'_>| {
        let src = &caps[3];
        let new_src = resolved.get(src).map(String::as_str).unwrap_or(src);
        format!("{}{}{}{}", &caps[1], &caps[2], new_src, &caps[4])
    });
    CowStr::from(replaced.into_owned())
}

fn heading_tag(level: HeadingLevel) -> &'static str {
    match level {
        HeadingLevel::H1 => "h1",
        HeadingLevel::H2 => "h2",
        HeadingLevel::H3 => "h3",
        HeadingLevel::H4 => "h4",
        HeadingLevel::H5 => "h5",
        HeadingLevel::H6 => "h6",
    }
}

fn heading_open(level: HeadingLevel, id: Option<&str>, classes: &[CowStr<'_>]) -> String {
    let mut open = format!("<{}", heading_tag(level));
    if let Some(id) = id {
        open.push_str(&format!(" id=\"{}\"", escape_attr(id)));
    }
    if !classes.is_empty() {
        let joined: Vec<&str> = classes.iter().map(|c| c.as_ref()).collect();
        open.push_str(&format!(" class=\"{}\"", escape_attr(&joined.join(" "))));
    }
    open.push_str("><span class=\"prefix\"></span><span class=\"content\">");
    open
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Resolves `ok-*` references and fails everything else.
    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ImageResolver for Recorder {
        async fn resolve(&self, reference: &str) -> Result<String, ImageWarning> {
            self.calls.lock().unwrap().push(reference.to_string());
            if reference.starts_with("ok-") {
                Ok(format!("https://mmbiz.qpic.cn/{}", reference))
            } else {
                Err(ImageWarning {
                    reference: reference.to_string(),
                    reason: "not found".to_string(),
                })
            }
        }
    }

    fn visible_text(html: &str) -> String {
        Regex::new("<[^>]+>").unwrap().replace_all(html, "").trim().to_string()
    }

    #[tokio::test]
    async fn test_heading_wrapped_with_spans() {
        let rendered = MarkdownRenderer::new(Recorder::default())
            .render("# Title")
            .await;

        assert_eq!(
            rendered.html.trim(),
            "<h1><span class=\"prefix\"></span><span class=\"content\">Title</span><span class=\"suffix\"></span></h1>"
        );
        assert_eq!(visible_text(&rendered.html), "Title");
    }

    #[tokio::test]
    async fn test_heading_with_inline_markup() {
        let rendered = MarkdownRenderer::new(Recorder::default())
            .render("## Some *emphasis* here")
            .await;
        assert!(rendered.html.starts_with("<h2><span class=\"prefix\"></span>"));
        assert!(rendered.html.contains("<em>emphasis</em>"));
        assert_eq!(visible_text(&rendered.html), "Some emphasis here");
    }

    #[tokio::test]
    async fn test_markdown_images_resolved_in_order() {
        let resolver = Recorder::default();
        let renderer = MarkdownRenderer::new(resolver);
        let rendered = renderer
            .render("![a](ok-1.png)\n\n![b](ok-2.jpg)\n\n![c](https://example.com/x.png)")
            .await;

        assert_eq!(
            *renderer.resolver.calls.lock().unwrap(),
            vec!["ok-1.png".to_string(), "ok-2.jpg".to_string()]
        );
        assert!(rendered.html.contains("src=\"https://mmbiz.qpic.cn/ok-1.png\""));
        assert!(rendered.html.contains("src=\"https://mmbiz.qpic.cn/ok-2.jpg\""));
        assert!(rendered.html.contains("src=\"https://example.com/x.png\""));
        assert!(rendered.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_failed_image_keeps_reference_and_warns_once() {
        let renderer = MarkdownRenderer::new(Recorder::default());
        let rendered = renderer
            .render("Text ![gone](images/missing.png) more ![again](images/missing.png)")
            .await;

        assert!(rendered.html.contains("src=\"images/missing.png\""));
        assert_eq!(rendered.warnings.len(), 1);
        assert_eq!(rendered.warnings[0].reference, "images/missing.png");
        assert_eq!(renderer.resolver.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_raw_html_img_rewritten() {
        let renderer = MarkdownRenderer::new(Recorder::default());
        let rendered = renderer
            .render("<p><img alt=\"x\" src='ok-raw.png' width=\"10\"></p>\n\ninline <img src=\"ok-inline.gif\"> too")
            .await;

        assert!(rendered.html.contains("src='https://mmbiz.qpic.cn/ok-raw.png'"));
        assert!(rendered.html.contains("src=\"https://mmbiz.qpic.cn/ok-inline.gif\""));
        assert!(rendered.html.contains("width=\"10\""));
    }

    #[tokio::test]
    async fn test_data_uri_not_resolved() {
        let renderer = MarkdownRenderer::new(Recorder::default());
        renderer
            .render("![x](data:image/png;base64,AAAA) <img src=\"//cdn/x.png\">")
            .await;
        assert!(renderer.resolver.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_extensions_enabled() {
        let rendered = MarkdownRenderer::new(Recorder::default())
            .render("| a | b |\n|---|---|\n| 1 | 2 |\n\n~~old~~\n\n- [x] done")
            .await;
        assert!(rendered.html.contains("<table>"));
        assert!(rendered.html.contains("<del>old</del>"));
        assert!(rendered.html.contains("type=\"checkbox\""));
    }

    #[test]
    fn test_is_local_reference() {
        assert!(is_local_reference("images/a.png"));
        assert!(is_local_reference("./a.png"));
        assert!(!is_local_reference("HTTPS://x/a.png"));
        assert!(!is_local_reference("data:image/png;base64,xx"));
        assert!(!is_local_reference("  "));
    }
}
