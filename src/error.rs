//! Error types for the baroque library.
//!
//! Failures fall into three layers:
//!
//! * [`DigitiseError`] — **Fatal** for the run: the collection cannot be
//!   walked (missing root, a folder mixing PDFs and loose images), the cache
//!   cannot be opened, or a page failed under [`crate::config::ErrorPolicy::Abort`].
//!
//! * [`PageError`] — a single page failed. Recorded in
//!   [`crate::output::RunReport`] when the run continues past it, or wrapped in
//!   [`DigitiseError::PageFailed`] when it halts the run.
//!
//! * [`BackendError`] / [`TextServiceError`] — what a provider call returned
//!   and what the retrying text service made of it.
//!
//! Every page completed before a fatal error keeps its output files and cache
//! entry, so a failed run is always safe to re-run.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the baroque library.
#[derive(Debug, Error)]
pub enum DigitiseError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The collection root does not exist.
    #[error("Input directory not found: '{path}'\nCheck the path exists and is readable.")]
    RootNotFound { path: PathBuf },

    /// A directory listing or file read failed.
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A folder holds both PDFs and standalone images.
    #[error(
        "Folder '{folder}' mixes {pdfs} PDF file(s) with {images} image file(s).\n\
Each notebook folder must contain either PDFs or page images, not both."
    )]
    MixedSources {
        folder: String,
        pdfs: usize,
        images: usize,
    },

    /// The PDF could not be opened by pdfium.
    #[error("PDF '{path}' is corrupt: {detail}\nTry repairing with: qpdf input.pdf output.pdf")]
    CorruptPdf { path: PathBuf, detail: String },

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium, or install libpdfium where the\n\
system loader can find it.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Data errors ───────────────────────────────────────────────────────
    /// A page record failed constructor validation.
    #[error("Invalid page record: {0}")]
    InvalidPage(String),

    // ── Cache errors ──────────────────────────────────────────────────────
    /// SQLite returned an error while opening, reading or writing the cache.
    #[error("Cache store error: {0}")]
    Cache(#[from] rusqlite::Error),

    /// A cache entry exists but cannot be decoded.
    #[error("Corrupt cache record for '{key}': {detail}\nDelete the entry to recompute the page.")]
    CorruptCacheRecord { key: String, detail: String },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// A page failed and the error policy halts the run.
    #[error("Page {key} failed: {error}")]
    PageFailed { key: String, error: PageError },

    /// Journal analysis of a folder failed.
    #[error("Summarising '{folder}' failed: {source}")]
    SummaryFailed {
        folder: String,
        #[source]
        source: TextServiceError,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DigitiseError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DigitiseError::Io {
            path: path.into(),
            source,
        }
    }
}

/// The text-service step a page failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Transcribe,
    Translate,
    Format,
    Analyse,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Transcribe => "transcribe",
            Operation::Translate => "translate",
            Operation::Format => "format",
            Operation::Analyse => "analyse",
        };
        f.write_str(name)
    }
}

/// A failure confined to one page.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum PageError {
    /// The source image could not be decoded or re-encoded.
    #[error("image processing failed: {detail}")]
    ImageFailed { detail: String },

    /// A text-service call failed after retries (or permanently).
    #[error("{operation} failed after {attempts} attempt(s): {detail}")]
    LlmFailed {
        operation: Operation,
        attempts: u32,
        detail: String,
    },

    /// The finished record could not be written to the cache or output tree.
    #[error("persisting results failed: {detail}")]
    PersistFailed { detail: String },
}

/// What a single provider call can fail with.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// Network failure, rate limit, 5xx — worth retrying.
    #[error("transient provider error: {0}")]
    Transient(String),

    /// Authentication or malformed request — retrying will not help.
    #[error("permanent provider error: {0}")]
    Permanent(String),

    /// Both the primary and the lite model stopped without completing.
    #[error("model stopped without completing ({reason})")]
    AbnormalStop { reason: String },
}

impl BackendError {
    /// Whether the retry loop should try again after this error.
    pub fn is_transient(&self) -> bool {
        !matches!(self, BackendError::Permanent(_))
    }
}

/// Outcome of a text-service operation that did not produce text.
#[derive(Debug, Clone, Error)]
pub enum TextServiceError {
    #[error("{operation}: gave up after {attempts} attempt(s): {last}")]
    RetriesExhausted {
        operation: Operation,
        attempts: u32,
        last: BackendError,
    },

    #[error("{operation}: {source}")]
    Permanent {
        operation: Operation,
        #[source]
        source: BackendError,
    },

    #[error("{operation}: image encoding failed: {detail}")]
    Encode { operation: Operation, detail: String },
}

impl From<TextServiceError> for PageError {
    fn from(e: TextServiceError) -> Self {
        match e {
            TextServiceError::RetriesExhausted {
                operation,
                attempts,
                last,
            } => PageError::LlmFailed {
                operation,
                attempts,
                detail: last.to_string(),
            },
            TextServiceError::Permanent { operation, source } => PageError::LlmFailed {
                operation,
                attempts: 1,
                detail: source.to_string(),
            },
            TextServiceError::Encode { detail, .. } => PageError::ImageFailed { detail },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_sources_display() {
        let e = DigitiseError::MixedSources {
            folder: "Journal 3".into(),
            pdfs: 2,
            images: 14,
        };
        let msg = e.to_string();
        assert!(msg.contains("Journal 3"), "got: {msg}");
        assert!(msg.contains("2 PDF"), "got: {msg}");
    }

    #[test]
    fn permanent_errors_are_not_transient() {
        assert!(!BackendError::Permanent("401".into()).is_transient());
        assert!(BackendError::Transient("503".into()).is_transient());
        assert!(BackendError::AbnormalStop {
            reason: "length".into()
        }
        .is_transient());
    }

    #[test]
    fn retries_exhausted_maps_to_page_error() {
        let e = TextServiceError::RetriesExhausted {
            operation: Operation::Translate,
            attempts: 10,
            last: BackendError::Transient("rate limited".into()),
        };
        let page: PageError = e.into();
        let msg = page.to_string();
        assert!(msg.starts_with("translate failed after 10"), "got: {msg}");
        assert!(msg.contains("rate limited"));
    }

    #[test]
    fn page_failed_display_names_key() {
        let e = DigitiseError::PageFailed {
            key: "Journal 1|part 1.pdf|7".into(),
            error: PageError::PersistFailed {
                detail: "disk full".into(),
            },
        };
        assert!(e.to_string().contains("Journal 1|part 1.pdf|7"));
    }
}
