use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline stage an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Reading the source file
    Read,
    /// Rewriting chunks through a provider
    Rewrite,
    /// Reassembling rewritten chunks
    Reassemble,
    /// Writing the backup and the result
    Persist,
    /// Building configuration
    Config,
}

impl Stage {
    /// Returns the stage name as shown to the user.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Rewrite => "rewrite",
            Self::Reassemble => "reassemble",
            Self::Persist => "persist",
            Self::Config => "config",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error types for the llm-debloat library.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Source file is missing, unreadable, or empty.
    #[error("Invalid input '{path}': {reason}")]
    InvalidInput {
        /// Path of the source file
        path: PathBuf,
        /// Why the input was rejected
        reason: String,
    },

    /// The rewrite provider failed for a chunk.
    #[error("Provider '{provider}' failed on chunk {chunk_index}/{total_chunks}: {message}")]
    Provider {
        /// Provider identifier
        provider: String,
        /// 1-based chunk index
        chunk_index: usize,
        /// Number of chunks in the run
        total_chunks: usize,
        /// Error message
        message: String,
    },

    /// Reassembly is missing, duplicated, or has unplanned chunk outputs.
    #[error(
        "Incomplete result: expected {expected} chunks, missing {missing:?}, duplicated {duplicated:?}, unexpected {unexpected:?}"
    )]
    IncompleteResult {
        /// Number of chunks planned
        expected: usize,
        /// 0-based indices with no output
        missing: Vec<usize>,
        /// 0-based indices with more than one output
        duplicated: Vec<usize>,
        /// Indices beyond the planned range
        unexpected: Vec<usize>,
    },

    /// IO error with context about the file path.
    #[error("IO error accessing '{path}': {message}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Configuration validation error.
    #[error("Invalid configuration: {message}")]
    Config {
        /// Detailed error message
        message: String,
    },

    /// Prompt template error.
    #[error("Failed to render template '{template}': {message}")]
    Template {
        /// Template name
        template: String,
        /// Error message
        message: String,
    },

    /// JSON serialization error.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message
        message: String,
    },
}

impl Error {
    /// Creates an invalid input error.
    #[must_use]
    pub fn invalid_input(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a provider error for a 0-based chunk index.
    #[must_use]
    pub fn provider(
        provider: impl Into<String>,
        index: usize,
        total_chunks: usize,
        message: impl Into<String>,
    ) -> Self {
        Self::Provider {
            provider: provider.into(),
            chunk_index: index + 1,
            total_chunks,
            message: message.into(),
        }
    }

    /// Creates an IO error with path context.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: source.to_string(),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a template error.
    #[must_use]
    pub fn template(template: impl Into<String>, source: tera::Error) -> Self {
        Self::Template {
            template: template.into(),
            message: source.to_string(),
        }
    }

    /// Returns the pipeline stage this error belongs to.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        match self {
            Self::InvalidInput { .. } => Stage::Read,
            Self::Provider { .. } => Stage::Rewrite,
            Self::IncompleteResult { .. } => Stage::Reassemble,
            Self::Io { .. } | Self::Serialization { .. } => Stage::Persist,
            Self::Config { .. } | Self::Template { .. } => Stage::Config,
        }
    }

    /// Returns true if this is an invalid input error.
    #[must_use]
    pub const fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput { .. })
    }

    /// Returns true if this is a provider error.
    #[must_use]
    pub const fn is_provider(&self) -> bool {
        matches!(self, Self::Provider { .. })
    }

    /// Returns true if this is an incomplete result error.
    #[must_use]
    pub const fn is_incomplete(&self) -> bool {
        matches!(self, Self::IncompleteResult { .. })
    }

    /// Returns true if this is an IO error.
    #[must_use]
    pub const fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }
}

impl From<tera::Error> for Error {
    fn from(e: tera::Error) -> Self {
        Self::template("unknown", e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization {
            message: e.to_string(),
        }
    }
}
