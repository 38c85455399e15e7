use crate::error::{Error, Result};
use crate::loc;
use std::fs;
use std::path::{Path, PathBuf};

/// Bytes inspected when looking for NUL bytes.
const BINARY_SNIFF_LEN: usize = 8192;

/// A source file read once at the start of a run.
#[derive(Debug, Clone)]
pub struct SourceFile {
    path: PathBuf,
    content: String,
}

impl SourceFile {
    /// Reads a source file from disk.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the file cannot be read, is empty,
    /// looks binary, or is not valid UTF-8.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| Error::invalid_input(path, e.to_string()))?;

        if bytes.is_empty() {
            return Err(Error::invalid_input(path, "file is empty"));
        }

        let sniff = &bytes[..bytes.len().min(BINARY_SNIFF_LEN)];
        if memchr::memchr(0, sniff).is_some() {
            return Err(Error::invalid_input(path, "file appears to be binary"));
        }

        let content = String::from_utf8(bytes)
            .map_err(|_| Error::invalid_input(path, "file is not valid UTF-8"))?;

        Ok(Self::new(path, content))
    }

    /// Wraps already loaded content.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    /// Returns the file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the full text.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Returns true if there is nothing to rewrite.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Returns the number of physical lines.
    #[must_use]
    pub fn line_count(&self) -> usize {
        loc::line_count(&self.content)
    }

    /// Returns the lines of code, ignoring blanks and comments.
    #[must_use]
    pub fn loc(&self) -> usize {
        loc::count_loc(&self.content)
    }

    /// Returns the Markdown fence language for this file, or "" if unknown.
    #[must_use]
    pub fn language(&self) -> &'static str {
        language_for(&self.path)
    }
}

/// Maps a file extension to the language tag used in code fences.
#[must_use]
pub fn language_for(path: &Path) -> &'static str {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return "";
    };

    match ext.to_ascii_lowercase().as_str() {
        "rs" => "rust",
        "py" | "pyw" => "python",
        "js" | "mjs" | "cjs" => "javascript",
        "ts" => "typescript",
        "jsx" => "jsx",
        "tsx" => "tsx",
        "go" => "go",
        "java" => "java",
        "c" | "h" => "c",
        "cpp" | "cc" | "cxx" | "hpp" | "hh" | "hxx" => "cpp",
        "cs" => "csharp",
        "rb" => "ruby",
        "php" => "php",
        "swift" => "swift",
        "kt" | "kts" => "kotlin",
        "scala" => "scala",
        "sh" | "bash" => "bash",
        "ps1" => "powershell",
        "lua" => "lua",
        "sql" => "sql",
        "html" | "htm" => "html",
        "css" => "css",
        "scss" => "scss",
        _ => "",
    }
}
