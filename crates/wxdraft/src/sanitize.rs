//! Helpers for keeping sensitive data out of log lines and span fields.
//!
//! Access tokens and upload paths show up in nearly every WeChat call; these
//! functions reduce them to something safe to share in a bug report.

use std::path::Path;

/// Returns only the filename component of a path.
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Masks an access token, keeping a short prefix for correlation.
pub fn redact_token(token: &str) -> String {
    let prefix: String = token.chars().take(6).collect();
    if prefix.chars().count() < 6 {
        return "****".to_string();
    }
    format!("{}****", prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_path_returns_filename() {
        assert_eq!(
            redact_path(Path::new("/srv/media/uploads/cover_images/abc.jpg")),
            "abc.jpg"
        );
    }

    #[test]
    fn test_redact_path_no_filename() {
        assert_eq!(redact_path(Path::new("/")), "<unknown>");
    }

    #[test]
    fn test_redact_token_keeps_prefix() {
        assert_eq!(redact_token("78_AbCdEfGhIjK"), "78_AbC****");
    }

    #[test]
    fn test_redact_token_short() {
        assert_eq!(redact_token("abc"), "****");
        assert_eq!(redact_token(""), "****");
    }
}
