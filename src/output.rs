//! Run-level result types.

use crate::error::PageError;
use crate::page::PageKey;
use serde::{Deserialize, Serialize};

/// How a page reached the persisted state in this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageOutcome {
    /// The cache already held the full record.
    CacheHit,
    /// The cache missed but all three output files were on disk.
    FilesystemHit,
    /// The text service was called and the result persisted.
    Computed,
}

/// Counters for one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Folders visited (a cancelled run may stop early).
    pub folders: usize,
    /// Pages pulled from the extractor.
    pub discovered: usize,
    pub computed: usize,
    pub cache_hits: usize,
    pub filesystem_hits: usize,
    pub failed: usize,
    pub total_duration_ms: u64,
}

impl RunStats {
    pub(crate) fn record(&mut self, outcome: PageOutcome) {
        match outcome {
            PageOutcome::CacheHit => self.cache_hits += 1,
            PageOutcome::FilesystemHit => self.filesystem_hits += 1,
            PageOutcome::Computed => self.computed += 1,
        }
    }

    /// Pages that needed no text-service call.
    pub fn skipped(&self) -> usize {
        self.cache_hits + self.filesystem_hits
    }
}

/// A page that failed under [`crate::config::ErrorPolicy::Skip`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedPage {
    pub key: PageKey,
    pub error: PageError,
}

/// Summary returned by [`crate::run::run_pipeline`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub stats: RunStats,
    pub failures: Vec<FailedPage>,
    /// True when the run stopped at a page boundary because it was cancelled.
    pub cancelled: bool,
}
