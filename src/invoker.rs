use crate::{
    error::{Error, Result},
    planner::Chunk,
    provider::{RewriteInput, Rewriter},
};
use std::time::Instant;
use tracing::debug;

/// Output of rewriting one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenChunk {
    /// Index of the source chunk (0-based)
    pub index: usize,

    /// Rewritten code
    pub content: String,
}

/// File-level details every chunk is sent with.
#[derive(Debug, Clone, Copy)]
pub struct ChunkContext<'a> {
    /// Number of chunks in the file
    pub total_chunks: usize,
    /// Fence language of the file
    pub language: &'a str,
    /// File name shown to the model
    pub file_name: &'a str,
}

/// Sends single chunks through a [`Rewriter`].
///
/// Failures are reported per chunk and never retried here.
pub struct RewriteInvoker {
    rewriter: Box<dyn Rewriter>,
}

impl RewriteInvoker {
    /// Wraps a rewriter.
    #[must_use]
    pub fn new(rewriter: Box<dyn Rewriter>) -> Self {
        Self { rewriter }
    }

    /// Returns the provider name.
    #[must_use]
    pub fn provider(&self) -> &str {
        self.rewriter.name()
    }

    /// Rewrites one chunk.
    ///
    /// If the chunk ended with a line terminator and a non-empty answer does
    /// not, the terminator is restored so neighbouring chunks do not fuse
    /// lines.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Provider`] naming the provider and the 1-based chunk
    /// index.
    pub fn invoke(&self, chunk: &Chunk<'_>, context: &ChunkContext<'_>) -> Result<RewrittenChunk> {
        let input = RewriteInput {
            code: chunk.text,
            index: chunk.index,
            total_chunks: context.total_chunks,
            language: context.language,
            file_name: context.file_name,
        };

        let started = Instant::now();
        let mut content = self.rewriter.rewrite(&input).map_err(|e| {
            Error::provider(
                self.rewriter.name(),
                chunk.index,
                context.total_chunks,
                e.to_string(),
            )
        })?;

        restore_terminator(chunk, &mut content);

        debug!(
            chunk = chunk.index + 1,
            total = context.total_chunks,
            lines = chunk.line_count(),
            bytes_in = chunk.text.len(),
            bytes_out = content.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "chunk rewritten"
        );

        Ok(RewrittenChunk {
            index: chunk.index,
            content,
        })
    }
}

fn restore_terminator(chunk: &Chunk<'_>, rewritten: &mut String) {
    if !chunk.ends_with_newline() || rewritten.is_empty() || rewritten.ends_with('\n') {
        return;
    }
    if chunk.text.ends_with("\r\n") {
        rewritten.push_str("\r\n");
    } else {
        rewritten.push('\n');
    }
}
