//! Snippet extraction for findings.

use crate::shared::models::MAX_SNIPPET_LEN;

/// The trimmed source line at `line` (1-based), capped at the finding
/// snippet limit. Returns an empty string for out-of-range lines.
pub fn line_snippet(content: &str, line: u32) -> String {
    if line == 0 {
        return String::new();
    }
    content
        .lines()
        .nth((line - 1) as usize)
        .map(|l| l.trim().chars().take(MAX_SNIPPET_LEN).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_snippet() {
        let content = "def a():\n    return request.args.get('q')\n";
        assert_eq!(line_snippet(content, 2), "return request.args.get('q')");
        assert_eq!(line_snippet(content, 0), "");
        assert_eq!(line_snippet(content, 99), "");
    }
}
