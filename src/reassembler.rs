use crate::{
    error::{Error, Result},
    invoker::RewrittenChunk,
};

/// Joins rewritten chunks back into one text, in planned order.
#[derive(Debug, Clone, Copy)]
pub struct Reassembler {
    expected: usize,
}

impl Reassembler {
    /// Creates a reassembler for `expected` planned chunks.
    #[must_use]
    pub const fn new(expected: usize) -> Self {
        Self { expected }
    }

    /// Concatenates the chunks by index, whatever order they arrive in.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IncompleteResult`] if any planned index is missing,
    /// appears twice, or lies outside the plan.
    pub fn assemble(&self, mut chunks: Vec<RewrittenChunk>) -> Result<String> {
        let mut seen = vec![0usize; self.expected];
        let mut unexpected = Vec::new();

        for chunk in &chunks {
            match seen.get_mut(chunk.index) {
                Some(count) => *count += 1,
                None => unexpected.push(chunk.index),
            }
        }

        let missing: Vec<usize> = (0..self.expected).filter(|&i| seen[i] == 0).collect();
        let duplicated: Vec<usize> = (0..self.expected).filter(|&i| seen[i] > 1).collect();

        if self.expected == 0 || !missing.is_empty() || !duplicated.is_empty() || !unexpected.is_empty()
        {
            return Err(Error::IncompleteResult {
                expected: self.expected,
                missing,
                duplicated,
                unexpected,
            });
        }

        chunks.sort_unstable_by_key(|c| c.index);

        let capacity = chunks.iter().map(|c| c.content.len()).sum();
        let mut output = String::with_capacity(capacity);
        for chunk in &chunks {
            output.push_str(&chunk.content);
        }

        Ok(output)
    }
}
