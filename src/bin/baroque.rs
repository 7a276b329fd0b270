//! CLI binary for baroque.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig`, wires Ctrl-C to cancellation and prints results.

use anyhow::{Context, Result};
use baroque::{
    import_output_tree, run_pipeline, summarise_all, write_and_compile, write_vault, BackendKind,
    ErrorPolicy, LuaLatex, PageKey, PageOutcome, PayloadStrictness, PipelineConfig,
    PipelineProgressCallback, ProgressCallback, RunStats, SummaryOutcome, TextService,
};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: a spinner with a running page count, one log line per
/// computed or failed page. Skipped pages only move the counter.
struct CliProgressCallback {
    bar: ProgressBar,
    skipped: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  {pos:>5} pages  ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(TICKS);
        bar.set_style(style);
        bar.set_prefix("Scanning");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            skipped: AtomicUsize::new(0),
        })
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_run_start(&self, folder_count: usize) {
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {folder_count} folder(s)…"))
        ));
    }

    fn on_folder_start(&self, folder: &str, index: usize, total: usize) {
        self.bar.set_prefix(format!("{index}/{total} {folder}"));
    }

    fn on_page_start(&self, key: &PageKey) {
        self.bar
            .set_message(format!("{} page {}", key.file_name, key.sequence));
    }

    fn on_page_skipped(&self, _key: &PageKey, _outcome: PageOutcome) {
        self.skipped.fetch_add(1, Ordering::SeqCst);
        self.bar.inc(1);
    }

    fn on_page_complete(&self, key: &PageKey, french_len: usize, english_len: usize) {
        self.bar.println(format!(
            "  {} {:<40}  {}",
            green("✓"),
            key.to_string(),
            dim(&format!("{french_len:>5} fr / {english_len:>5} en chars")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, key: &PageKey, error: &str) {
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar
            .println(format!("  {} {:<40}  {}", red("✗"), key.to_string(), red(&msg)));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, stats: &RunStats) {
        self.bar.finish_and_clear();
        let mark = if stats.failed == 0 { green("✔") } else { cyan("⚠") };
        eprintln!(
            "{} {} computed, {} skipped, {} failed  {}",
            mark,
            bold(&stats.computed.to_string()),
            self.skipped.load(Ordering::SeqCst),
            if stats.failed == 0 {
                "0".to_string()
            } else {
                red(&stats.failed.to_string())
            },
            dim(&format!("{}ms", stats.total_duration_ms)),
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Transcribe and translate every journal under input_data/
  baroque process

  # Resume after an interruption (finished pages are skipped)
  baroque process

  # Keep going past failed pages, then list them as JSON
  baroque process --continue-on-error --json > report.json

  # Also produce LaTeX markup for each page
  baroque process --format

  # Use OpenAI models instead of Claude
  baroque process --backend openai

  # Linked Markdown notes for Obsidian
  baroque vault --vault ~/Notes/Journals

  # Journal summaries, then the print edition
  baroque summarise
  baroque print

LAYOUT:
  input_data/<journal>/*.pdf | *.jpg      one folder per journal, PDFs or scans
  raw-output/<journal>/french_page_NNN.txt
  raw-output/<journal>/english_page_NNN.txt
  raw-output/<journal>/images/page_NNN.jpg
  raw-output/cache.sqlite3                 page cache (safe to keep across runs)

ENVIRONMENT VARIABLES:
  ANTHROPIC_API_KEY       Anthropic API key (backend claude)
  OPENAI_API_KEY          OpenAI API key (backend openai)
  PDFIUM_LIB_PATH         Path to libpdfium; otherwise the system library is used
  RUST_LOG                Override log filtering (e.g. baroque=debug)
"#;

/// Digitise 18th-century French journals with vision models.
#[derive(Parser, Debug)]
#[command(
    name = "baroque",
    version,
    about = "Transcribe, translate and typeset scanned 18th-century French journals",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "BAROQUE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "BAROQUE_QUIET")]
    quiet: bool,

    /// Disable the progress bar.
    #[arg(long, global = true, env = "BAROQUE_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract, transcribe and translate every page not yet done.
    Process(ProcessArgs),
    /// Write linked Markdown notes from the output tree.
    Vault(VaultArgs),
    /// Write and compile the three-column LaTeX edition of each journal.
    Print(PrintArgs),
    /// Write a LaTeX summary of each journal.
    Summarise(SummariseArgs),
}

#[derive(Args, Debug)]
struct BackendArgs {
    /// Model provider.
    #[arg(long, env = "BAROQUE_BACKEND", value_enum, default_value = "claude")]
    backend: BackendArg,

    /// Primary model ID (default: claude-sonnet-4-5 / gpt-4.1-mini).
    #[arg(long, env = "BAROQUE_MODEL")]
    model: Option<String>,

    /// Fallback model used once when the primary refuses or is cut off.
    #[arg(long, env = "BAROQUE_LITE_MODEL")]
    lite_model: Option<String>,

    /// Total attempts per model call on transient errors.
    #[arg(long, env = "BAROQUE_MAX_ATTEMPTS", default_value_t = 10)]
    max_attempts: u32,

    /// Seconds to wait between attempts.
    #[arg(long, env = "BAROQUE_RETRY_DELAY_SECS", default_value_t = 10)]
    retry_delay_secs: u64,

    /// Require both <output> tags; otherwise the page text is empty.
    #[arg(long, env = "BAROQUE_STRICT_PAYLOAD")]
    strict_payload: bool,

    /// Max output tokens per model call.
    #[arg(long, env = "BAROQUE_MAX_TOKENS", default_value_t = 16_000)]
    max_tokens: usize,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, env = "BAROQUE_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,
}

#[derive(Args, Debug)]
struct ProcessArgs {
    /// Folder holding one sub-folder per journal.
    #[arg(long, env = "BAROQUE_INPUT", default_value = "input_data")]
    input: PathBuf,

    /// Folder receiving page text and images.
    #[arg(long, env = "BAROQUE_OUTPUT", default_value = "raw-output")]
    output: PathBuf,

    /// Page cache file (default: <output>/cache.sqlite3).
    #[arg(long, env = "BAROQUE_CACHE")]
    cache: Option<PathBuf>,

    /// Longest side of a page image in pixels.
    #[arg(long, env = "BAROQUE_SCALE", default_value_t = 800,
          value_parser = clap::value_parser!(u32).range(32..=10_000))]
    scale: u32,

    /// Recompute pages even when cached or already on disk.
    #[arg(long, env = "BAROQUE_OVERWRITE")]
    overwrite: bool,

    /// Also produce LaTeX markup for each page.
    #[arg(long, env = "BAROQUE_FORMAT")]
    format: bool,

    /// Record failed pages and carry on instead of stopping.
    #[arg(long, env = "BAROQUE_CONTINUE_ON_ERROR")]
    continue_on_error: bool,

    /// Print the run report as JSON on stdout.
    #[arg(long, env = "BAROQUE_JSON")]
    json: bool,

    #[command(flatten)]
    backend: BackendArgs,
}

#[derive(Args, Debug)]
struct VaultArgs {
    /// Output tree written by `process`.
    #[arg(long, env = "BAROQUE_OUTPUT", default_value = "raw-output")]
    output: PathBuf,

    /// Vault folder to write notes into.
    #[arg(long, env = "BAROQUE_VAULT", default_value = "vault")]
    vault: PathBuf,
}

#[derive(Args, Debug)]
struct PrintArgs {
    /// Output tree written by `process`.
    #[arg(long, env = "BAROQUE_OUTPUT", default_value = "raw-output")]
    output: PathBuf,

    /// LaTeX engine to run.
    #[arg(long, env = "BAROQUE_LATEX", default_value = "lualatex")]
    latex: String,
}

#[derive(Args, Debug)]
struct SummariseArgs {
    /// Output tree written by `process`.
    #[arg(long, env = "BAROQUE_OUTPUT", default_value = "raw-output")]
    output: PathBuf,

    /// Replace existing summaries.
    #[arg(long, env = "BAROQUE_OVERWRITE")]
    overwrite: bool,

    #[command(flatten)]
    backend: BackendArgs,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum BackendArg {
    Claude,
    Openai,
}

impl From<BackendArg> for BackendKind {
    fn from(v: BackendArg) -> Self {
        match v {
            BackendArg::Claude => BackendKind::Claude,
            BackendArg::Openai => BackendKind::OpenAi,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Only `process` draws a progress bar; while it is active INFO logs would
    // tear through it.
    let json = matches!(&cli.command, Command::Process(a) if a.json);
    let show_progress = matches!(cli.command, Command::Process(_))
        && !cli.quiet
        && !cli.no_progress
        && !json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Process(ref args) => process(args, show_progress, cli.quiet).await,
        Command::Vault(ref args) => vault(args, cli.quiet).await,
        Command::Print(ref args) => print(args).await,
        Command::Summarise(ref args) => summarise(args, cli.quiet).await,
    }
}

async fn process(args: &ProcessArgs, show_progress: bool, quiet: bool) -> Result<()> {
    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn PipelineProgressCallback>)
    } else {
        None
    };
    let config = build_config(args, progress)?;

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        let mut count = 0;
        while tokio::signal::ctrl_c().await.is_ok() {
            count += 1;
            if on_interrupt(count, &cancel_clone) {
                eprintln!("\nInterrupted again; exiting now");
                std::process::exit(130);
            }
            eprintln!("\nStopping after the current page… (Ctrl-C again to exit now)");
        }
    });

    let report = run_pipeline(&config, cancel)
        .await
        .context("Processing failed")?;

    if args.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        println!("{json}");
    } else if !quiet {
        if !show_progress {
            eprintln!(
                "{} computed, {} from cache, {} already on disk, {} failed in {}ms",
                report.stats.computed,
                report.stats.cache_hits,
                report.stats.filesystem_hits,
                report.stats.failed,
                report.stats.total_duration_ms
            );
        }
        for failure in &report.failures {
            eprintln!("  {} {}  {}", red("✗"), failure.key, failure.error);
        }
        if report.cancelled {
            eprintln!("{} cancelled; run again to resume", cyan("⚠"));
        }
    }
    Ok(())
}

/// Handle the `count`th Ctrl-C: the first cancels the run gracefully, any
/// later one asks the caller to exit immediately.
fn on_interrupt(count: usize, cancel: &CancellationToken) -> bool {
    cancel.cancel();
    count > 1
}

/// Map CLI args to `PipelineConfig`.
fn build_config(args: &ProcessArgs, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .input_root(&args.input)
        .output_root(&args.output)
        .max_long_side(args.scale)
        .overwrite(args.overwrite)
        .format_markup(args.format)
        .error_policy(if args.continue_on_error {
            ErrorPolicy::Skip
        } else {
            ErrorPolicy::Abort
        });
    builder = apply_backend(builder, &args.backend);

    if let Some(ref cache) = args.cache {
        builder = builder.cache_path(cache);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    builder.build().context("Invalid configuration")
}

fn apply_backend(
    mut builder: baroque::PipelineConfigBuilder,
    args: &BackendArgs,
) -> baroque::PipelineConfigBuilder {
    builder = builder
        .backend(args.backend.into())
        .max_attempts(args.max_attempts)
        .retry_delay_ms(args.retry_delay_secs.saturating_mul(1000))
        .max_tokens(args.max_tokens)
        .temperature(args.temperature)
        .payload_strictness(if args.strict_payload {
            PayloadStrictness::Strict
        } else {
            PayloadStrictness::Lenient
        });
    if let Some(ref model) = args.model {
        builder = builder.model(model);
    }
    if let Some(ref lite) = args.lite_model {
        builder = builder.lite_model(lite);
    }
    builder
}

async fn vault(args: &VaultArgs, quiet: bool) -> Result<()> {
    let folders = import_output_tree(&args.output)
        .with_context(|| format!("Failed to read output tree {}", args.output.display()))?;
    let stats = write_vault(&folders, &args.vault)
        .await
        .context("Failed to write vault")?;
    if !quiet {
        eprintln!(
            "{} {} notes in {} folder(s)  →  {}",
            green("✔"),
            stats.pages,
            stats.folders,
            bold(&args.vault.display().to_string())
        );
    }
    Ok(())
}

async fn print(args: &PrintArgs) -> Result<()> {
    let folders = import_output_tree(&args.output)
        .with_context(|| format!("Failed to read output tree {}", args.output.display()))?;
    let compiler = LuaLatex::with_program(&args.latex);
    for folder in folders.iter().filter(|f| !f.pages.is_empty()) {
        let tex = write_and_compile(folder, &compiler)
            .await
            .with_context(|| format!("Failed to build print edition of '{}'", folder.name))?;
        println!("{}", tex.display());
    }
    Ok(())
}

async fn summarise(args: &SummariseArgs, quiet: bool) -> Result<()> {
    let builder = PipelineConfig::builder().output_root(&args.output);
    let config = apply_backend(builder, &args.backend)
        .build()
        .context("Invalid configuration")?;
    let service = TextService::from_config(&config).context("Failed to create model backend")?;

    let folders = import_output_tree(&args.output)
        .with_context(|| format!("Failed to read output tree {}", args.output.display()))?;
    let outcomes = summarise_all(&folders, &service, args.overwrite)
        .await
        .context("Summarising failed")?;

    if !quiet {
        for (name, outcome) in outcomes {
            match outcome {
                SummaryOutcome::Written(path) => {
                    eprintln!("  {} {}  {}", green("✓"), name, dim(&path.display().to_string()))
                }
                SummaryOutcome::Skipped(_) => eprintln!("  {} {}  {}", dim("·"), name, dim("exists")),
                SummaryOutcome::Empty => eprintln!("  {} {}  {}", dim("·"), name, dim("no text")),
            }
        }
    }
    Ok(())
}
