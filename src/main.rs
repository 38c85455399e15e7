use anyhow::{Context, bail};
use clap::Parser;
use dialoguer::Confirm;
use llm_debloat::{Config, Debloater, PendingWrite, ProviderKind, TokenizerKind, loc};
use std::{path::PathBuf, time::Duration};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    name = "debloat",
    version,
    author,
    about = "Remove bloat from a source file with an LLM",
    long_about = "Remove bloat from a source file with an LLM.\n\n\
    The file is split into chunks at blank lines and top-level declarations, \
    each chunk is rewritten by the selected model, and the cleaned chunks are \
    joined back together. The original is kept next to the file as <file>.bak.\n\n\
    USAGE EXAMPLES:\n  \
      # Use the local model (Ollama on localhost:11434)\n  \
      debloat src/legacy.py\n\n  \
      # Use GPT-4o (needs OPENAI_API_KEY)\n  \
      debloat src/legacy.py --llm 0\n\n  \
      # Use DeepSeek-Coder and look at the result without writing it\n  \
      debloat src/legacy.py --llm 1 --dry-run --print"
)]
struct Cli {
    /// Source file to debloat
    #[arg(value_name = "PATH")]
    path: PathBuf,

    /// Remote model: 0 = GPT-4o, 1 = DeepSeek-Coder (local model when omitted)
    #[arg(long, value_name = "0|1", value_parser = clap::value_parser!(u8).range(0..=1))]
    llm: Option<u8>,

    /// Model id overriding the provider default
    #[arg(long, value_name = "NAME")]
    model: Option<String>,

    /// Base URL of the provider API
    #[arg(long, env = "DEBLOAT_ENDPOINT", value_name = "URL")]
    endpoint: Option<String>,

    /// API key (defaults to OPENAI_API_KEY or DEEPSEEK_API_KEY)
    #[arg(long, value_name = "KEY")]
    api_key: Option<String>,

    /// Max lines per chunk
    #[arg(long, default_value_t = 200)]
    max_lines: usize,

    /// Max estimated tokens per chunk
    #[arg(long, default_value_t = 4096)]
    max_tokens: usize,

    /// Lines to look back for a clean cut point [default: 20, capped below --max-lines]
    #[arg(long)]
    lookback: Option<usize>,

    /// Tokenizer to use
    #[arg(long, value_enum, default_value = "simple")]
    tokenizer: CliTokenizer,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 120, value_name = "SECS")]
    timeout: u64,

    /// Retries per chunk after a provider failure
    #[arg(long, default_value_t = 0)]
    retries: u32,

    /// Sampling temperature (0.1 local, 0.2 remote by default)
    #[arg(long)]
    temperature: Option<f32>,

    /// Path to a custom Tera template for the user prompt
    ///
    /// Available variables: code, fence, language, chunk_index, total_chunks, file_name.
    #[arg(long, value_name = "FILE")]
    prompt_template: Option<PathBuf>,

    /// Suffix of the backup file
    #[arg(long, default_value = "bak", value_name = "SUFFIX")]
    backup_suffix: String,

    /// Run everything but do not write any file
    #[arg(long)]
    dry_run: bool,

    /// Print the rewritten code to stdout
    #[arg(long)]
    print: bool,

    /// Overwrite without asking
    #[arg(short, long)]
    yes: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliTokenizer {
    Simple,
    Enhanced,
}

impl From<CliTokenizer> for TokenizerKind {
    fn from(t: CliTokenizer) -> Self {
        match t {
            CliTokenizer::Simple => Self::Simple,
            CliTokenizer::Enhanced => Self::Enhanced,
        }
    }
}

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    setup_tracing(cli.verbose)?;

    let provider = match cli.llm {
        Some(choice) => ProviderKind::from_choice(choice)
            .with_context(|| format!("Unknown model choice {choice}"))?,
        None => ProviderKind::Local,
    };

    let mut builder = Config::builder()
        .source_path(&cli.path)
        .provider(provider)
        .max_lines(cli.max_lines)
        .max_tokens(cli.max_tokens)
        .tokenizer(cli.tokenizer.into())
        .timeout(Duration::from_secs(cli.timeout))
        .retries(cli.retries)
        .backup_suffix(cli.backup_suffix)
        .dry_run(cli.dry_run);

    if let Some(lookback) = cli.lookback {
        builder = builder.lookback_lines(lookback);
    }
    if let Some(model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(endpoint) = cli.endpoint {
        builder = builder.endpoint(endpoint);
    }
    if let Some(key) = cli
        .api_key
        .or_else(|| provider.api_key_env().and_then(|var| std::env::var(var).ok()))
    {
        builder = builder.api_key(key);
    }
    if let Some(temperature) = cli.temperature {
        builder = builder.temperature(temperature);
    }
    if let Some(template) = cli.prompt_template {
        builder = builder.prompt_template(template);
    }

    let config = builder.build().context("Failed to build configuration")?;

    let debloater = Debloater::new(config).context("Failed to create debloater")?;

    let pending = debloater
        .prepare()
        .map_err(|e| anyhow::anyhow!("{} stage failed: {e}", e.stage()))?;

    if cli.print {
        print!("{}", pending.output());
    }

    if !cli.dry_run && !cli.yes && !confirm(&debloater, &pending)? {
        bail!("Aborted, {} was not modified", cli.path.display());
    }

    let report = debloater
        .commit(pending)
        .map_err(|e| anyhow::anyhow!("{} stage failed: {e}", e.stage()))?;

    if cli.json {
        println!("{}", report.to_json().context("Failed to serialize report")?);
    } else {
        report.print_summary();
    }

    Ok(())
}

fn confirm(debloater: &Debloater, pending: &PendingWrite) -> anyhow::Result<bool> {
    let before = pending.source().loc();
    let after = loc::count_loc(pending.output());

    if pending.is_unchanged() {
        eprintln!("The model returned the file unchanged.");
    }
    eprintln!(
        "{}: {} -> {} LOC ({:.2}% reduction) over {} chunk(s); original goes to {}",
        pending.source().path().display(),
        before,
        after,
        loc::reduction_percent(before, after),
        pending.chunk_count(),
        debloater.backup_path().display()
    );

    Confirm::new()
        .with_prompt("Proceed?")
        .default(false)
        .interact()
        .context("Failed to read confirmation")
}

fn setup_tracing(verbosity: u8) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbosity {
        0 => EnvFilter::new("llm_debloat=info"),
        1 => EnvFilter::new("llm_debloat=debug"),
        _ => EnvFilter::new("llm_debloat=trace"),
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(())
}
