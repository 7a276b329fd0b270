//! Journal summaries: one LaTeX `summary.tex` per folder.
//!
//! The English pages of a folder are joined in page order and sent to the
//! model in a single analysis request. The result is written next to the page
//! files, where the print assembler picks it up.

use crate::assemble::clean::clean_text;
use crate::assemble::import::ImportedFolder;
use crate::assemble::latex::SUMMARY_FILE;
use crate::error::DigitiseError;
use crate::pipeline::llm::TextService;
use crate::tree::write_atomic;
use std::path::PathBuf;
use tracing::{debug, info};

/// What happened to one folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryOutcome {
    Written(PathBuf),
    /// `summary.tex` already existed and `overwrite` was off.
    Skipped(PathBuf),
    /// No English text to analyse.
    Empty,
}

/// Join the folder's English pages into one journal text.
pub async fn journal_text(folder: &ImportedFolder) -> Result<String, DigitiseError> {
    let mut parts = Vec::with_capacity(folder.pages.len());
    for page in &folder.pages {
        let text = tokio::fs::read_to_string(&page.english)
            .await
            .map_err(|e| DigitiseError::io(&page.english, e))?;
        let text = clean_text(&text);
        if !text.is_empty() {
            parts.push(text);
        }
    }
    Ok(parts.join("\n\n"))
}

/// Analyse one folder and write its `summary.tex`.
pub async fn summarise_folder(
    folder: &ImportedFolder,
    service: &TextService,
    overwrite: bool,
) -> Result<SummaryOutcome, DigitiseError> {
    let path = folder.path.join(SUMMARY_FILE);
    if path.exists() && !overwrite {
        debug!("'{}': summary already present", folder.name);
        return Ok(SummaryOutcome::Skipped(path));
    }

    let journal = journal_text(folder).await?;
    if journal.trim().is_empty() {
        info!("'{}': no English text, nothing to summarise", folder.name);
        return Ok(SummaryOutcome::Empty);
    }

    info!(
        "'{}': analysing {} pages ({} chars)",
        folder.name,
        folder.pages.len(),
        journal.len()
    );
    let summary = service
        .analyse(&journal)
        .await
        .map_err(|source| DigitiseError::SummaryFailed {
            folder: folder.name.clone(),
            source,
        })?;
    write_atomic(&path, summary.as_bytes()).await?;
    Ok(SummaryOutcome::Written(path))
}

/// Summarise every folder in order, stopping at the first failure.
pub async fn summarise_all(
    folders: &[ImportedFolder],
    service: &TextService,
    overwrite: bool,
) -> Result<Vec<(String, SummaryOutcome)>, DigitiseError> {
    let mut outcomes = Vec::with_capacity(folders.len());
    for folder in folders {
        let outcome = summarise_folder(folder, service, overwrite).await?;
        outcomes.push((folder.name.clone(), outcome));
    }
    Ok(outcomes)
}
