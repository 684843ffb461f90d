//! Standalone preview documents.

/// Wraps a rendered fragment into a self-contained HTML5 page.
///
/// The fragment sits inside `<div id="nice">` so theme CSS written for the
/// WeChat editor applies unchanged.
pub fn build_preview_document(title: &str, fragment: &str, css: Option<&str>) -> String {
    let mut page = String::with_capacity(fragment.len() + css.map_or(0, str::len) + 512);
    page.push_str("<!DOCTYPE html>\n<html lang=\"zh-CN\">\n<head>\n");
    page.push_str("<meta charset=\"utf-8\">\n");
    page.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    page.push_str("<title>");
    page.push_str(&escape_text(title));
    page.push_str("</title>\n");
    if let Some(css) = css.filter(|c| !c.trim().is_empty()) {
        page.push_str("<style>\n");
        // A literal closing tag inside the stylesheet would end the element early.
        page.push_str(&css.replace("</style", "<\\/style"));
        page.push_str("\n</style>\n");
    }
    page.push_str("</head>\n<body>\n<div id=\"nice\">\n");
    page.push_str(fragment);
    page.push_str("\n</div>\n</body>\n</html>\n");
    page
}

fn escape_text(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
