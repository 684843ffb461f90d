use std::sync::LazyLock;

use regex::Regex;

/// Used when neither the metadata nor the article text yields a summary.
pub const FALLBACK_DIGEST: &str = "No summary provided.";

/// Elements whose content is never shown; `head` goes first since it may
/// contain the others.
static HIDDEN_BLOCKS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    ["head", "style", "script"]
        .iter()
        .map(|tag| {
            Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>"))
                .unwrap_or_else(|e| panic!("invalid hidden block pattern: {e}"))
        })
        .collect()
});

static TAGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<[^>]*>").unwrap_or_else(|e| panic!("invalid tag pattern: {e}"))
});

/// Visible text of an HTML document or fragment, whitespace collapsed.
pub fn html_to_text(html: &str) -> String {
    let mut visible = html.to_string();
    for block in HIDDEN_BLOCKS.iter() {
        visible = block.replace_all(&visible, " ").into_owned();
    }
    let without_tags = TAGS.replace_all(&visible, " ");
    let decoded = decode_entities(&without_tags);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}

/// Truncates to at most `max_chars` characters, never splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].trim_end().to_string(),
        None => text.to_string(),
    }
}

/// The article digest: the author-supplied one if present, otherwise the
/// leading text of the rendered HTML.
pub fn derive_digest(explicit: Option<&str>, html: &str, max_chars: usize) -> String {
    if let Some(digest) = explicit.map(str::trim).filter(|d| !d.is_empty()) {
        return truncate_chars(digest, max_chars);
    }

    let text = html_to_text(html);
    if text.is_empty() {
        return FALLBACK_DIGEST.to_string();
    }
    truncate_chars(&text, max_chars)
}
