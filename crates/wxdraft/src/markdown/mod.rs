//! Markdown handling: frontmatter, HTML rendering, previews and digests.

pub mod digest;
pub mod frontmatter;
pub mod preview;
pub mod renderer;

pub use digest::{derive_digest, html_to_text, FALLBACK_DIGEST};
pub use frontmatter::{parse_document, ArticleMetadata, ParsedDocument};
pub use preview::build_preview_document;
pub use renderer::{
    is_local_reference, ImageResolver, ImageWarning, MarkdownRenderer, RenderedHtml,
};
