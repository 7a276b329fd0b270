//! # baroque
//!
//! Digitise collections of 18th-century French journals: extract page scans
//! from PDFs or loose JPEGs, transcribe them with a vision model, translate
//! them into English, and assemble bilingual print and note-taking editions.
//!
//! ## Why this crate?
//!
//! A collection of a few thousand handwritten pages takes days of model calls.
//! Runs get interrupted by rate limits, expired keys and laptops closing, so
//! every page is keyed by `(folder, file, sequence)` and persisted the moment
//! it is done, both to a SQLite cache and to plain files. Re-running the same
//! command resumes where the last run stopped and never pays for a page twice.
//!
//! ## Pipeline Overview
//!
//! ```text
//! input_data/<journal>/{*.pdf | *.jpg}
//!  │
//!  ├─ 1. Collect    natural-order folders and sources
//!  ├─ 2. Extract    embedded page images (pdfium) or loose scans
//!  ├─ 3. Encode     ≤ 800 px long side, greyscale, JPEG q95
//!  ├─ 4. Check      cache hit? files on disk? → skip
//!  ├─ 5. Text       transcribe → translate → (LaTeX format), with retry + lite fallback
//!  ├─ 6. Persist    cache row, then french/english/image files
//!  └─ 7. Assemble   Markdown vault, LaTeX print edition, journal summaries
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use baroque::{run_pipeline, BackendKind, PipelineConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads ANTHROPIC_API_KEY from the environment.
//!     let config = PipelineConfig::builder()
//!         .input_root("input_data")
//!         .output_root("raw-output")
//!         .backend(BackendKind::Claude)
//!         .build()?;
//!     let report = run_pipeline(&config, CancellationToken::new()).await?;
//!     eprintln!(
//!         "{} computed, {} skipped, {} failed",
//!         report.stats.computed,
//!         report.stats.skipped(),
//!         report.stats.failed
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `baroque` binary (clap + indicatif + anyhow + tracing-subscriber) |
//!
//! ## Choosing a Backend
//!
//! | Backend | Primary | Lite fallback | Answer format |
//! |---------|---------|---------------|---------------|
//! | `claude` | `claude-sonnet-4-5` | `claude-haiku-4-5` | `<output>` tags |
//! | `openai` | `gpt-4.1-mini` | `gpt-4.1-nano` | `{"output": …}` JSON |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod assemble;
pub mod cache;
pub mod config;
pub mod error;
pub mod output;
pub mod page;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod run;
pub mod summarise;
pub mod tree;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use assemble::import::{import_output_tree, ImportedFolder, PageTriple};
pub use assemble::latex::{write_and_compile, DocumentCompiler, LuaLatex};
pub use assemble::vault::write_vault;
pub use cache::CacheStore;
pub use config::{BackendKind, ErrorPolicy, PipelineConfig, PipelineConfigBuilder};
pub use error::{BackendError, DigitiseError, Operation, PageError, TextServiceError};
pub use output::{FailedPage, PageOutcome, RunReport, RunStats};
pub use page::{Dimensions, PageKey, PageResult, SourcePage};
pub use pipeline::llm::{LlmBackend, TextBackend, TextService};
pub use pipeline::payload::{PayloadFormat, PayloadStrictness};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback};
pub use run::{run_pipeline, run_with};
pub use summarise::{summarise_all, summarise_folder, SummaryOutcome};
pub use tree::OutputTree;
