use crate::{
    config::Config,
    error::{Error, Result},
    source::SourceFile,
    token::{TokenEstimator, TokenizerKind},
};
use std::sync::Arc;
use tracing::trace;

/// Leading keywords that continue a construct opened on an earlier line.
const CONTINUATION_KEYWORDS: &[&str] = &["else", "elif", "except", "finally", "catch"];

/// A contiguous slice of the source text sent to the provider in one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// Sequential chunk index (0-based)
    pub index: usize,

    /// Line the chunk starts on (0-based)
    pub start_line: usize,

    /// Chunk text, line terminators included
    pub text: &'a str,

    /// Estimated token count
    pub tokens: usize,
}

impl Chunk<'_> {
    /// Returns the number of lines this chunk touches.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.text.split_inclusive('\n').count()
    }

    /// Returns true if the chunk ends with a line terminator.
    #[must_use]
    pub fn ends_with_newline(&self) -> bool {
        self.text.ends_with('\n')
    }
}

/// Splits source text into chunks bounded by line and token limits.
pub struct ChunkPlanner {
    max_lines: usize,
    max_tokens: usize,
    lookback_lines: usize,
    tokenizer: Arc<dyn TokenEstimator>,
}

impl ChunkPlanner {
    /// Creates a planner from configuration.
    pub fn new(config: &Config) -> Self {
        Self::with_limits(
            config.max_lines,
            config.max_tokens,
            config.lookback_lines,
            config.tokenizer,
        )
    }

    /// Creates a planner with explicit limits.
    ///
    /// Zero limits are raised to 1 so planning always makes progress.
    pub fn with_limits(
        max_lines: usize,
        max_tokens: usize,
        lookback_lines: usize,
        tokenizer: TokenizerKind,
    ) -> Self {
        Self {
            max_lines: max_lines.max(1),
            max_tokens: max_tokens.max(1),
            lookback_lines,
            tokenizer: tokenizer.create(),
        }
    }

    /// Plans the chunks of a source file.
    ///
    /// The returned iterator is lazy; clone it (or call `plan` again) to
    /// walk the same chunks a second time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the file is empty.
    pub fn plan<'a>(&'a self, source: &'a SourceFile) -> Result<Chunks<'a>> {
        if source.is_empty() {
            return Err(Error::invalid_input(source.path(), "file is empty"));
        }
        Ok(self.plan_text(source.content()))
    }

    /// Plans the chunks of raw text. Empty text yields no chunks.
    #[must_use]
    pub fn plan_text<'a>(&'a self, text: &'a str) -> Chunks<'a> {
        Chunks {
            planner: self,
            text,
            pos: 0,
            line: 0,
            index: 0,
        }
    }

    /// Returns the byte length of the next chunk taken from the front of `rest`.
    fn next_cut(&self, rest: &str) -> usize {
        // ends[i] is the byte offset just past line i
        let mut ends = Vec::with_capacity(self.max_lines.min(1024));
        let mut offset = 0usize;
        let mut limited = false;

        for line in rest.split_inclusive('\n') {
            let next = offset + line.len();
            // Estimates are not additive across lines, so the prefix is measured whole
            if ends.len() == self.max_lines || self.tokenizer.estimate(&rest[..next]) > self.max_tokens {
                limited = true;
                break;
            }
            offset = next;
            ends.push(offset);
        }

        if ends.is_empty() {
            // A single line over the token budget
            let line = rest.split_inclusive('\n').next().unwrap_or(rest);
            return self.hard_cut(line);
        }

        if !limited {
            return offset;
        }

        self.boundary_cut(rest, &ends).unwrap_or(offset)
    }

    /// Looks back from the limit for the nearest clean split point.
    fn boundary_cut(&self, rest: &str, ends: &[usize]) -> Option<usize> {
        let n = ends.len();
        let floor = n.saturating_sub(self.lookback_lines).max(1);

        for k in (floor..=n).rev() {
            let cut = ends[k - 1];
            let last = &rest[if k >= 2 { ends[k - 2] } else { 0 }..cut];
            let next = rest[cut..].split_inclusive('\n').next().unwrap_or("");

            if is_blank(last) || is_top_level_start(next) {
                trace!(lines = k, limit = n, "split at boundary");
                return Some(cut);
            }
        }

        trace!(limit = n, "no boundary within lookback, hard line cut");
        None
    }

    /// Cuts an oversized line at the last char boundary that fits the budget.
    fn hard_cut(&self, line: &str) -> usize {
        let boundaries: Vec<usize> = line
            .char_indices()
            .map(|(i, _)| i)
            .skip(1)
            .chain(std::iter::once(line.len()))
            .collect();

        // Always take at least one char
        let mut lo = 0usize;
        let mut hi = boundaries.len();
        while lo + 1 < hi {
            let mid = (lo + hi) / 2;
            if self.tokenizer.estimate(&line[..boundaries[mid]]) <= self.max_tokens {
                lo = mid;
            } else {
                hi = mid;
            }
        }

        trace!(bytes = boundaries[lo], "hard character cut");
        boundaries[lo]
    }
}

/// Lazy iterator over the chunks of a text.
#[derive(Clone)]
pub struct Chunks<'a> {
    planner: &'a ChunkPlanner,
    text: &'a str,
    pos: usize,
    line: usize,
    index: usize,
}

impl std::fmt::Debug for Chunks<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunks")
            .field("pos", &self.pos)
            .field("line", &self.line)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.text.len() {
            return None;
        }

        let rest = &self.text[self.pos..];
        let len = self.planner.next_cut(rest);
        let text = &rest[..len];

        let chunk = Chunk {
            index: self.index,
            start_line: self.line,
            text,
            tokens: self.planner.tokenizer.estimate(text),
        };

        self.pos += len;
        self.line += memchr::memchr_iter(b'\n', text.as_bytes()).count();
        self.index += 1;

        Some(chunk)
    }
}

impl std::iter::FusedIterator for Chunks<'_> {}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// A non-indented line that opens a new construct rather than closing or
/// continuing one.
fn is_top_level_start(line: &str) -> bool {
    let Some(first) = line.chars().next() else {
        return false;
    };

    if first.is_whitespace() || matches!(first, '}' | ')' | ']' | '.' | ',') {
        return false;
    }

    let word: String = line
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    !CONTINUATION_KEYWORDS.contains(&word.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planner(max_lines: usize, max_tokens: usize, lookback: usize) -> ChunkPlanner {
        ChunkPlanner::with_limits(max_lines, max_tokens, lookback, TokenizerKind::Simple)
    }

    fn numbered_lines(n: usize) -> String {
        (1..=n).map(|i| format!("line {i}\n")).collect()
    }

    fn concat(chunks: Chunks<'_>) -> String {
        chunks.map(|c| c.text).collect()
    }

    #[test]
    fn test_small_file_single_chunk() {
        let planner = planner(200, 4096, 20);
        let text = "def main():\n    pass\n";

        let chunks: Vec<_> = planner.plan_text(text).collect();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, text);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].start_line, 0);
    }

    #[test]
    fn test_five_hundred_lines_by_two_hundred() {
        let planner = planner(200, 100_000, 20);
        let text = numbered_lines(500);

        let chunks: Vec<_> = planner.plan_text(&text).collect();
        let sizes: Vec<_> = chunks.iter().map(Chunk::line_count).collect();

        assert_eq!(sizes, vec![200, 200, 100]);
        assert_eq!(chunks[1].start_line, 200);
        assert_eq!(chunks[2].start_line, 400);
        assert_eq!(concat(planner.plan_text(&text)), text);
    }

    #[test]
    fn test_prefers_blank_line_boundary() {
        let planner = planner(6, 100_000, 3);
        let text = "def a():\n    x = 1\n\n    y = 2\n    z = 3\n    return x\n    pass\n";

        let first = planner.plan_text(text).next().unwrap();

        // Line 6 would be the limit; the blank line sits at line 3
        assert_eq!(first.text, "def a():\n    x = 1\n\n");
    }

    #[test]
    fn test_prefers_top_level_declaration() {
        let planner = planner(5, 100_000, 3);
        let text = "def a():\n    return 1\ndef b():\n    x = 2\n    y = 3\n    return x + y\n";

        let first = planner.plan_text(text).next().unwrap();
        assert_eq!(first.text, "def a():\n    return 1\n");
    }

    #[test]
    fn test_skips_continuation_keywords() {
        assert!(is_top_level_start("def f():\n"));
        assert!(is_top_level_start("@decorator\n"));
        assert!(!is_top_level_start("else:\n"));
        assert!(!is_top_level_start("except ValueError:\n"));
        assert!(!is_top_level_start("}\n"));
        assert!(!is_top_level_start("    return 1\n"));
        assert!(!is_top_level_start(""));
    }

    #[test]
    fn test_hard_line_cut_without_boundary() {
        let planner = planner(4, 100_000, 2);
        let text = "f(\n  1,\n  2,\n  3,\n  4,\n  5,\n)\n";

        let chunks: Vec<_> = planner.plan_text(text).collect();

        assert_eq!(chunks[0].line_count(), 4);
        assert_eq!(concat(planner.plan_text(text)), text);
    }

    #[test]
    fn test_hard_character_cut_for_long_line() {
        let planner = planner(100, 10, 5);
        let text = format!("{}\nshort\n", "x".repeat(100));

        let chunks: Vec<_> = planner.plan_text(&text).collect();

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.tokens <= 10));
        assert_eq!(concat(planner.plan_text(&text)), text);
    }

    #[test]
    fn test_hard_cut_respects_char_boundaries() {
        let planner = planner(100, 3, 5);
        let text = "ééééééééééééééééééééééé\n";

        assert_eq!(concat(planner.plan_text(text)), text);
    }

    #[test]
    fn test_token_limit_splits_before_line_limit() {
        let short_words: String = (0..200).map(|i| format!("w{i}\n")).collect();

        for kind in [TokenizerKind::Simple, TokenizerKind::Enhanced] {
            for text in [numbered_lines(50), short_words.clone()] {
                let planner = ChunkPlanner::with_limits(1000, 20, 0, kind);

                let chunks: Vec<_> = planner.plan_text(&text).collect();

                assert!(chunks.len() > 1, "{kind:?}");
                assert!(
                    chunks.iter().all(|c| c.tokens <= 20),
                    "{kind:?}: {:?}",
                    chunks.iter().map(|c| c.tokens).collect::<Vec<_>>()
                );
                assert_eq!(concat(planner.plan_text(&text)), text);
            }
        }
    }

    #[test]
    fn test_concatenation_invariant_across_limits() {
        let text = "import os\n\nclass A:\n    def f(self):\n        return 1\n\n\
                    \n    def g(self):\n        pass\n\ndef main():\n    A().f()\nmain()";

        for max_lines in 1..8 {
            for max_tokens in [1, 3, 7, 50] {
                for lookback in 0..max_lines {
                    let planner = planner(max_lines, max_tokens, lookback);
                    let chunks: Vec<_> = planner.plan_text(text).collect();

                    assert_eq!(concat(planner.plan_text(text)), text);
                    for (i, chunk) in chunks.iter().enumerate() {
                        assert_eq!(chunk.index, i);
                        assert!(!chunk.text.is_empty());
                        assert!(chunk.line_count() <= max_lines);
                    }
                }
            }
        }
    }

    #[test]
    fn test_plan_is_restartable() {
        let planner = planner(3, 100, 1);
        let text = numbered_lines(10);

        let chunks = planner.plan_text(&text);
        let first: Vec<_> = chunks.clone().collect();
        let second: Vec<_> = chunks.collect();

        assert_eq!(first, second);
    }

    #[test]
    fn test_plan_empty_source_is_invalid() {
        let planner = planner(10, 100, 2);
        let source = SourceFile::new("empty.py", "");

        let result = planner.plan(&source);
        assert!(result.unwrap_err().is_invalid_input());
    }

    #[test]
    fn test_no_trailing_newline_preserved() {
        let planner = planner(2, 100, 0);
        let text = "a\nb\nc";

        let chunks: Vec<_> = planner.plan_text(text).collect();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].text, "c");
        assert!(!chunks[1].ends_with_newline());
    }
}
