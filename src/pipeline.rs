use crate::{
    config::Config,
    error::{Error, Result},
    invoker::{ChunkContext, RewriteInvoker, RewrittenChunk},
    loc,
    planner::{Chunk, ChunkPlanner},
    provider::{LlmRewriter, Rewriter},
    reassembler::Reassembler,
    source::SourceFile,
    writer::Writer,
};
use serde::Serialize;
use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};
use tracing::{debug, info, instrument, warn};

/// Outcome of a debloat run.
#[derive(Debug, Clone, Serialize)]
pub struct DebloatReport {
    /// Rewritten file
    pub path: PathBuf,

    /// Provider identifier
    pub provider: String,

    /// Model requests were sent to
    pub model: String,

    /// Number of chunks the file was split into
    pub chunks: usize,

    /// Physical lines before the rewrite
    pub original_lines: usize,

    /// Physical lines after the rewrite
    pub new_lines: usize,

    /// Lines of code before the rewrite
    pub original_loc: usize,

    /// Lines of code after the rewrite
    pub new_loc: usize,

    /// Share of lines of code removed, in percent
    pub reduction_percent: f64,

    /// Time spent reading and planning
    pub plan_duration: Duration,

    /// Time spent waiting on the provider
    pub rewrite_duration: Duration,

    /// Time spent writing the backup and the result
    pub persist_duration: Duration,

    /// Total execution time
    pub duration: Duration,

    /// Where the original was saved, if anything was written
    pub backup_path: Option<PathBuf>,

    /// Whether writes were skipped
    pub dry_run: bool,

    /// Generation timestamp
    pub generated_at: String,
}

impl DebloatReport {
    /// Serializes the report as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the report cannot be encoded.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Prints a human-readable summary to stdout.
    pub fn print_summary(&self) {
        println!("\n╔═══════════════════════════════════════════════════════╗");
        println!("║                  Debloat Summary                      ║");
        println!("╠═══════════════════════════════════════════════════════╣");
        println!("║ File:                                                 ║");
        println!("║   {}", self.path.display());
        println!("║ Provider:             {:>8} ({})", self.provider, self.model);
        println!(
            "║ Chunks:               {:>8}                        ║",
            self.chunks
        );
        println!("║                                                       ║");
        println!(
            "║ Original LOC:         {:>8}                        ║",
            self.original_loc
        );
        println!(
            "║ New LOC:              {:>8}                        ║",
            self.new_loc
        );
        println!(
            "║ Reduction:            {:>7.2}%                        ║",
            self.reduction_percent
        );
        println!(
            "║ Lines:                {:>8} -> {:<8}            ║",
            self.original_lines, self.new_lines
        );
        println!("║                                                       ║");
        match &self.backup_path {
            Some(backup) => {
                println!("║ Backup:                                               ║");
                println!("║   {}", backup.display());
            }
            None => println!("║ ⚠ No files were written (dry run mode)               ║"),
        }
        println!("║                                                       ║");
        println!("║ Timing Breakdown:                                     ║");
        println!(
            "║   - Planning:         {:>8.2}s                     ║",
            self.plan_duration.as_secs_f64()
        );
        println!(
            "║   - Rewriting:        {:>8.2}s                     ║",
            self.rewrite_duration.as_secs_f64()
        );
        println!(
            "║   - Writing:          {:>8.2}s                     ║",
            self.persist_duration.as_secs_f64()
        );
        println!(
            "║   - Total:            {:>8.2}s                     ║",
            self.duration.as_secs_f64()
        );
        println!("╚═══════════════════════════════════════════════════════╝\n");
    }
}

/// A rewritten file that has not been written to disk yet.
#[derive(Debug)]
pub struct PendingWrite {
    source: SourceFile,
    output: String,
    chunks: usize,
    plan_duration: Duration,
    rewrite_duration: Duration,
    started: Instant,
}

impl PendingWrite {
    /// Returns the file as it was read.
    #[must_use]
    pub const fn source(&self) -> &SourceFile {
        &self.source
    }

    /// Returns the reassembled output.
    #[must_use]
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Returns the number of chunks that were rewritten.
    #[must_use]
    pub const fn chunk_count(&self) -> usize {
        self.chunks
    }

    /// Returns true if the rewrite produced the input unchanged.
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        self.output == self.source.content()
    }
}

/// Runs read, plan, rewrite, reassemble and persist for one file.
pub struct Debloater {
    config: Config,
    planner: ChunkPlanner,
    invoker: RewriteInvoker,
    writer: Writer,
}

impl Debloater {
    /// Creates a debloater talking to the provider named in `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the provider
    /// client cannot be built.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let rewriter = LlmRewriter::from_config(&config)?;
        debug!("Using {} with model {}", rewriter.name(), rewriter.model());
        Ok(Self::assemble(config, Box::new(rewriter)))
    }

    /// Creates a debloater using a custom [`Rewriter`].
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_rewriter(config: Config, rewriter: impl Rewriter + 'static) -> Result<Self> {
        config.validate()?;
        Ok(Self::assemble(config, Box::new(rewriter)))
    }

    fn assemble(config: Config, rewriter: Box<dyn Rewriter>) -> Self {
        Self {
            planner: ChunkPlanner::new(&config),
            invoker: RewriteInvoker::new(rewriter),
            writer: Writer::new(&config),
            config,
        }
    }

    /// Returns the configuration in use.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Returns where the original will be backed up.
    #[must_use]
    pub fn backup_path(&self) -> &Path {
        self.writer.backup_path()
    }

    /// Reads, splits, rewrites and reassembles the file without touching
    /// the disk.
    ///
    /// # Errors
    ///
    /// Returns the first error of any stage. Nothing is written on error.
    #[instrument(skip(self), fields(path = %self.config.source_path.display()))]
    pub fn prepare(&self) -> Result<PendingWrite> {
        let started = Instant::now();

        info!("Stage 1/3: Planning chunks...");
        let source = SourceFile::read(&self.config.source_path)?;
        let chunks: Vec<Chunk<'_>> = self.planner.plan(&source)?.collect();
        let plan_duration = started.elapsed();

        info!(
            "✓ Split {} lines into {} chunk(s) in {:.2}s",
            source.line_count(),
            chunks.len(),
            plan_duration.as_secs_f64()
        );

        info!(
            "Stage 2/3: Rewriting with {} ({})...",
            self.invoker.provider(),
            self.config.effective_model()
        );
        let rewrite_start = Instant::now();
        let total_chunks = chunks.len();
        let name = file_name(source.path());
        let context = ChunkContext {
            total_chunks,
            language: source.language(),
            file_name: &name,
        };

        let mut rewritten = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            info!("  Chunk {}/{}", chunk.index + 1, total_chunks);
            rewritten.push(self.invoke_with_retries(chunk, &context)?);
        }
        let rewrite_duration = rewrite_start.elapsed();

        let output = Reassembler::new(total_chunks).assemble(rewritten)?;

        info!(
            "✓ Rewrote {} chunk(s) in {:.2}s",
            total_chunks,
            rewrite_duration.as_secs_f64()
        );

        Ok(PendingWrite {
            source,
            output,
            chunks: total_chunks,
            plan_duration,
            rewrite_duration,
            started,
        })
    }

    /// Backs up the original and writes the pending output over it.
    ///
    /// With `dry_run` set nothing is written and the report has no backup.
    ///
    /// # Errors
    ///
    /// Returns an error if the backup or the write fails.
    #[instrument(skip_all, fields(path = %pending.source.path().display()))]
    pub fn commit(&self, pending: PendingWrite) -> Result<DebloatReport> {
        let persist_start = Instant::now();

        let backup_path = if self.config.dry_run {
            warn!("Dry run mode enabled - skipping file writes");
            None
        } else {
            info!("Stage 3/3: Writing result...");
            Some(self.writer.persist(&pending.source, &pending.output)?)
        };
        let persist_duration = persist_start.elapsed();

        let report = self.report(&pending, persist_duration, backup_path);

        info!(
            "✓ Debloat completed in {:.2}s ({:.2}% LOC reduction)",
            report.duration.as_secs_f64(),
            report.reduction_percent
        );

        Ok(report)
    }

    /// Runs [`prepare`](Self::prepare) then [`commit`](Self::commit).
    ///
    /// # Errors
    ///
    /// Returns the first error of any stage.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use llm_debloat::{Config, Debloater, ProviderKind};
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// let config = Config::builder()
    ///     .source_path("src/legacy.py")
    ///     .provider(ProviderKind::Local)
    ///     .build()?;
    ///
    /// let report = Debloater::new(config)?.run()?;
    /// report.print_summary();
    /// # Ok(())
    /// # }
    /// ```
    pub fn run(&self) -> Result<DebloatReport> {
        let pending = self.prepare()?;
        self.commit(pending)
    }

    fn invoke_with_retries(
        &self,
        chunk: &Chunk<'_>,
        context: &ChunkContext<'_>,
    ) -> Result<RewrittenChunk> {
        let mut attempt = 0;
        loop {
            match self.invoker.invoke(chunk, context) {
                Err(e @ Error::Provider { .. }) if attempt < self.config.retries => {
                    attempt += 1;
                    warn!("{e}; retrying ({attempt}/{})", self.config.retries);
                }
                result => return result,
            }
        }
    }

    fn report(
        &self,
        pending: &PendingWrite,
        persist_duration: Duration,
        backup_path: Option<PathBuf>,
    ) -> DebloatReport {
        let original_loc = pending.source.loc();
        let new_loc = loc::count_loc(&pending.output);

        DebloatReport {
            path: pending.source.path().to_path_buf(),
            provider: self.invoker.provider().to_string(),
            model: self.config.effective_model().to_string(),
            chunks: pending.chunks,
            original_lines: pending.source.line_count(),
            new_lines: loc::line_count(&pending.output),
            original_loc,
            new_loc,
            reduction_percent: loc::reduction_percent(original_loc, new_loc),
            plan_duration: pending.plan_duration,
            rewrite_duration: pending.rewrite_duration,
            persist_duration,
            duration: pending.started.elapsed(),
            backup_path,
            dry_run: self.config.dry_run,
            generated_at: chrono::Local::now()
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}
