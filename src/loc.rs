//! Line metrics reported before and after a rewrite.

/// Prefixes that mark a comment-only line across the common languages.
const COMMENT_PREFIXES: &[&str] = &["#", "//", "/*", "*", "--", ";"];

/// Counts physical lines. A trailing newline does not start a new line.
#[must_use]
pub fn line_count(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }

    let newlines = memchr::memchr_iter(b'\n', text.as_bytes()).count();
    if text.ends_with('\n') {
        newlines
    } else {
        newlines + 1
    }
}

/// Counts lines of code, skipping blank and comment-only lines.
#[must_use]
pub fn count_loc(text: &str) -> usize {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !is_comment(line))
        .count()
}

fn is_comment(trimmed: &str) -> bool {
    // "*" alone would swallow pointer derefs like `*ptr = 0;`
    if trimmed.starts_with('*') {
        return trimmed == "*" || trimmed.starts_with("* ") || trimmed.starts_with("*/");
    }
    COMMENT_PREFIXES.iter().any(|p| trimmed.starts_with(p))
}

/// Percentage of LOC removed; negative when the rewrite grew the file.
#[must_use]
pub fn reduction_percent(before: usize, after: usize) -> f64 {
    if before == 0 {
        return 0.0;
    }
    (before as f64 - after as f64) / before as f64 * 100.0
}
