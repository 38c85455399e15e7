//! # llm-debloat
//!
//! Removes bloat from a single source file by sending it to an LLM chunk by
//! chunk and stitching the cleaned chunks back together.
//!
//! ## Features
//!
//! - Line and token bounded chunking that prefers blank lines and top-level
//!   declarations as cut points
//! - Local (Ollama-compatible), OpenAI and DeepSeek providers
//! - Customizable Tera prompt template
//! - Backup of the original and atomic replacement of the file
//! - Lines-of-code report with reduction percentage
//!
//! ## Quick Start
//!
//! ```no_run
//! use llm_debloat::{Config, Debloater, ProviderKind};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::builder()
//!     .source_path("./legacy/app.py")
//!     .provider(ProviderKind::OpenAi)
//!     .api_key(std::env::var("OPENAI_API_KEY")?)
//!     .build()?;
//!
//! let report = Debloater::new(config)?.run()?;
//! println!("{:.1}% smaller", report.reduction_percent);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! The library follows a pipeline architecture:
//! 1. **Planner**: Splits the file into contiguous chunks
//! 2. **Invoker**: Rewrites each chunk through a [`Rewriter`]
//! 3. **Reassembler**: Joins the rewritten chunks in order
//! 4. **Writer**: Backs up the original and replaces it atomically

#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery
)]
#![allow(clippy::module_name_repetitions)]

mod config;
mod error;
mod invoker;
mod pipeline;
mod planner;
mod prompt;
mod provider;
mod reassembler;
mod source;
mod token;
mod writer;

pub mod loc;

pub use config::{Config, ConfigBuilder};
pub use error::{Error, Result, Stage};
pub use invoker::{ChunkContext, RewriteInvoker, RewrittenChunk};
pub use pipeline::{DebloatReport, Debloater, PendingWrite};
pub use planner::{Chunk, ChunkPlanner, Chunks};
pub use prompt::{PromptBuilder, SYSTEM_PROMPT, extract_code};
pub use provider::{LlmRewriter, ProviderKind, RewriteError, RewriteInput, Rewriter};
pub use reassembler::Reassembler;
pub use source::{SourceFile, language_for};
pub use token::{TokenEstimator, TokenizerKind};

/// Debloats the file named in `config` and writes the result.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration is invalid
/// - The source file is missing, empty, or not text
/// - The provider fails on any chunk
/// - The backup or the result cannot be written
///
/// # Examples
///
/// ```no_run
/// use llm_debloat::{Config, run};
///
/// # fn main() -> anyhow::Result<()> {
/// let config = Config::builder()
///     .source_path("main.py")
///     .build()?;
///
/// run(config)?;
/// # Ok(())
/// # }
/// ```
pub fn run(config: Config) -> Result<DebloatReport> {
    Debloater::new(config)?.run()
}
