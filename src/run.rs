//! Resumable pipeline: drive every page of the collection to the persisted state.
//!
//! ## Per-page state machine
//!
//! ```text
//! Undiscovered → Checked ─┬─ CacheHit       restore missing files, done
//!                         ├─ FilesystemHit  three core files on disk, done
//!                         └─ NeedsCompute → transcribe → translate → (format)
//!                                         → cache put → write files → done
//! ```
//!
//! Nothing is carried between runs except the cache and the output tree:
//! discovery and page keys are re-derived every time, so an interrupted run is
//! resumed simply by running again. `overwrite` sends every page down the
//! NeedsCompute branch.
//!
//! Cancellation is checked between pages; a page that has started is always
//! finished (or failed) before the run stops.

use crate::cache::CacheStore;
use crate::config::{ErrorPolicy, PipelineConfig};
use crate::error::{DigitiseError, PageError};
use crate::output::{FailedPage, PageOutcome, RunReport};
use crate::page::{PageKey, PageResult, SourcePage};
use crate::pipeline::collect::{collect_sources, FolderSources};
use crate::pipeline::extract::{Extracted, PageExtractor};
use crate::pipeline::llm::TextService;
use crate::progress::ProgressCallback;
use crate::tree::OutputTree;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Process the whole collection described by `config`.
///
/// Builds the text backend from `config` (or uses `config.text_backend`) and
/// extracts PDF images with pdfium. See [`run_with`] to supply both.
///
/// # Errors
/// Structural problems (missing root, a folder mixing PDFs and images) are
/// reported before any page is processed. Under [`ErrorPolicy::Abort`] the
/// first failed page ends the run with [`DigitiseError::PageFailed`]; pages
/// completed before it keep their cache entries and files.
pub async fn run_pipeline(
    config: &PipelineConfig,
    cancel: CancellationToken,
) -> Result<RunReport, DigitiseError> {
    let service = TextService::from_config(config)?;
    let extractor = PageExtractor::with_pdfium(config.max_long_side);
    info!("Using {} backend", service.backend_name());
    run_with(config, &service, &extractor, &cancel).await
}

/// [`run_pipeline`] with an explicit text service and extractor.
pub async fn run_with(
    config: &PipelineConfig,
    service: &TextService,
    extractor: &PageExtractor,
    cancel: &CancellationToken,
) -> Result<RunReport, DigitiseError> {
    let start = Instant::now();

    let folders = collect_sources(&config.input_root)?;
    for folder in &folders {
        folder.mode()?;
    }
    info!(
        "Found {} folder(s) under {}",
        folders.len(),
        config.input_root.display()
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_run_start(folders.len());
    }

    let store = CacheStore::open(&config.cache_path())?;
    let runner = Runner {
        config,
        service,
        store: &store,
        tree: OutputTree::new(&config.output_root),
        progress: config.progress_callback.as_ref(),
    };

    let mut report = RunReport::default();
    let outcome = runner
        .process_folders(&folders, extractor, cancel, &mut report)
        .await;

    report.stats.total_duration_ms = start.elapsed().as_millis() as u64;
    if let Some(cb) = runner.progress {
        cb.on_run_complete(&report.stats);
    }

    match outcome {
        Ok(()) => {
            store.close()?;
            info!(
                "Run finished in {} ms: {} computed, {} from cache, {} already on disk, {} failed{}",
                report.stats.total_duration_ms,
                report.stats.computed,
                report.stats.cache_hits,
                report.stats.filesystem_hits,
                report.stats.failed,
                if report.cancelled { " (cancelled)" } else { "" }
            );
            Ok(report)
        }
        Err(e) => {
            if let Err(close_err) = store.close() {
                warn!("Closing cache after failed run: {}", close_err);
            }
            Err(e)
        }
    }
}

/// Why a page did not reach the persisted state.
enum PageFailure {
    Page(PageKey, PageError),
    Fatal(DigitiseError),
}

impl From<DigitiseError> for PageFailure {
    fn from(e: DigitiseError) -> Self {
        PageFailure::Fatal(e)
    }
}

struct Runner<'a> {
    config: &'a PipelineConfig,
    service: &'a TextService,
    store: &'a CacheStore,
    tree: OutputTree,
    progress: Option<&'a ProgressCallback>,
}

impl Runner<'_> {
    async fn process_folders(
        &self,
        folders: &[FolderSources],
        extractor: &PageExtractor,
        cancel: &CancellationToken,
        report: &mut RunReport,
    ) -> Result<(), DigitiseError> {
        let total = folders.len();
        for (index, folder) in folders.iter().enumerate() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            info!("Folder {}/{}: {}", index + 1, total, folder.name);
            if let Some(cb) = self.progress {
                cb.on_folder_start(&folder.name, index + 1, total);
            }
            report.stats.folders += 1;

            for item in extractor.pages(folder)? {
                if cancel.is_cancelled() {
                    info!("Cancelled; stopping before the next page");
                    report.cancelled = true;
                    return Ok(());
                }
                report.stats.discovered += 1;

                let result = match item? {
                    Extracted::Page(page) => self.process_page(page).await,
                    Extracted::Failed { key, error } => Err(PageFailure::Page(key, error)),
                };
                match result {
                    Ok(outcome) => report.stats.record(outcome),
                    Err(PageFailure::Page(key, error)) => self.page_failed(key, error, report)?,
                    Err(PageFailure::Fatal(e)) => return Err(e),
                }
            }
        }
        Ok(())
    }

    async fn process_page(&self, page: SourcePage) -> Result<PageOutcome, PageFailure> {
        let key = page.key();

        if !self.config.overwrite {
            if let Some(cached) = self.cached(&key)? {
                self.tree
                    .restore_missing(&cached)
                    .await
                    .map_err(|e| persist_failure(&key, e))?;
                debug!("{}: cache hit", key);
                return Ok(self.skipped(&key, PageOutcome::CacheHit));
            }
            if self.tree.is_complete(&key) {
                debug!("{}: output files already present", key);
                return Ok(self.skipped(&key, PageOutcome::FilesystemHit));
            }
        }

        if let Some(cb) = self.progress {
            cb.on_page_start(&key);
        }
        let result = self.compute(page).await?;

        self.store
            .put(&result)
            .map_err(|e| persist_failure(&key, e))?;
        self.tree
            .write_page(&result)
            .await
            .map_err(|e| persist_failure(&key, e))?;

        debug!(
            "{}: {} French chars, {} English chars",
            key,
            result.french_text.len(),
            result.english_text.len()
        );
        if let Some(cb) = self.progress {
            cb.on_page_complete(&key, result.french_text.len(), result.english_text.len());
        }
        Ok(PageOutcome::Computed)
    }

    /// Cache lookup; an undecodable record is treated as a miss and recomputed.
    fn cached(&self, key: &PageKey) -> Result<Option<PageResult>, DigitiseError> {
        match self.store.get(key) {
            Err(DigitiseError::CorruptCacheRecord { key, detail }) => {
                warn!("{}: ignoring corrupt cache record ({})", key, detail);
                Ok(None)
            }
            other => other,
        }
    }

    async fn compute(&self, page: SourcePage) -> Result<PageResult, PageFailure> {
        let key = page.key();
        let fail = |e: crate::error::TextServiceError| PageFailure::Page(key.clone(), e.into());

        let french_text = self.service.transcribe(page.image()).await.map_err(fail)?;
        let english_text = self.service.translate(&french_text).await.map_err(fail)?;

        let (french_markup, english_markup) = if self.config.format_markup {
            (
                Some(self.service.format(&french_text).await.map_err(fail)?),
                Some(self.service.format(&english_text).await.map_err(fail)?),
            )
        } else {
            (None, None)
        };

        Ok(PageResult {
            source: page,
            french_text,
            english_text,
            french_markup,
            english_markup,
        })
    }

    fn skipped(&self, key: &PageKey, outcome: PageOutcome) -> PageOutcome {
        if let Some(cb) = self.progress {
            cb.on_page_skipped(key, outcome);
        }
        outcome
    }

    fn page_failed(
        &self,
        key: PageKey,
        error: PageError,
        report: &mut RunReport,
    ) -> Result<(), DigitiseError> {
        report.stats.failed += 1;
        if let Some(cb) = self.progress {
            cb.on_page_error(&key, &error.to_string());
        }
        match self.config.error_policy {
            ErrorPolicy::Abort => {
                error!("{}: {}", key, error);
                Err(DigitiseError::PageFailed {
                    key: key.to_string(),
                    error,
                })
            }
            ErrorPolicy::Skip => {
                warn!("{}: {} (continuing)", key, error);
                report.failures.push(FailedPage { key, error });
                Ok(())
            }
        }
    }
}

fn persist_failure(key: &PageKey, e: DigitiseError) -> PageFailure {
    PageFailure::Page(
        key.clone(),
        PageError::PersistFailed {
            detail: e.to_string(),
        },
    )
}
