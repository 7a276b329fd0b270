//! Progress-callback trait for per-page pipeline events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to hear about
//! every page as the run discovers, skips, computes or fails it. The CLI
//! forwards these events to an `indicatif` progress bar; tests count them.
//!
//! # Example
//!
//! ```rust
//! use baroque::{PageKey, PipelineConfig, PipelineProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     computed: AtomicUsize,
//! }
//!
//! impl PipelineProgressCallback for CountingCallback {
//!     fn on_page_complete(&self, key: &PageKey, _french_len: usize, _english_len: usize) {
//!         self.computed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("done: {key}");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { computed: AtomicUsize::new(0) });
//! let config = PipelineConfig::builder()
//!     .progress_callback(counter as Arc<dyn PipelineProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::{PageOutcome, RunStats};
use crate::page::PageKey;
use std::sync::Arc;

/// Called by the pipeline as it walks the collection.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Pages are processed one at a time, but the trait is
/// `Send + Sync` so implementations can be shared with other tasks.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called once the collection has been listed.
    fn on_run_start(&self, folder_count: usize) {
        let _ = folder_count;
    }

    /// Called before the first page of a folder is extracted.
    ///
    /// # Arguments
    /// * `folder` — folder name
    /// * `index`  — 1-indexed position of the folder in natural order
    /// * `total`  — number of folders in the run
    fn on_folder_start(&self, folder: &str, index: usize, total: usize) {
        let _ = (folder, index, total);
    }

    /// Called just before a page is sent to the text service.
    fn on_page_start(&self, key: &PageKey) {
        let _ = key;
    }

    /// Called when a page is already complete in the cache or on disk.
    fn on_page_skipped(&self, key: &PageKey, outcome: PageOutcome) {
        let _ = (key, outcome);
    }

    /// Called when a page has been computed and persisted.
    fn on_page_complete(&self, key: &PageKey, french_len: usize, english_len: usize) {
        let _ = (key, french_len, english_len);
    }

    /// Called when a page fails.
    fn on_page_error(&self, key: &PageKey, error: &str) {
        let _ = (key, error);
    }

    /// Called once when the run ends, including after cancellation.
    fn on_run_complete(&self, stats: &RunStats) {
        let _ = stats;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        skipped_cache: AtomicUsize,
        skipped_disk: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
    }

    impl PipelineProgressCallback for TrackingCallback {
        fn on_page_skipped(&self, _key: &PageKey, outcome: PageOutcome) {
            match outcome {
                PageOutcome::CacheHit => self.skipped_cache.fetch_add(1, Ordering::SeqCst),
                PageOutcome::FilesystemHit => self.skipped_disk.fetch_add(1, Ordering::SeqCst),
                PageOutcome::Computed => 0,
            };
        }

        fn on_page_complete(&self, _key: &PageKey, _f: usize, _e: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_error(&self, _key: &PageKey, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        let key = PageKey::new("J", "a.jpg", 1);
        cb.on_run_start(2);
        cb.on_folder_start("J", 1, 2);
        cb.on_page_start(&key);
        cb.on_page_skipped(&key, PageOutcome::CacheHit);
        cb.on_page_complete(&key, 10, 12);
        cb.on_page_error(&key, "boom");
        cb.on_run_complete(&RunStats::default());
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        let key = PageKey::new("J", "a.jpg", 1);

        tracker.on_page_skipped(&key, PageOutcome::CacheHit);
        tracker.on_page_skipped(&key, PageOutcome::FilesystemHit);
        tracker.on_page_skipped(&key, PageOutcome::FilesystemHit);
        tracker.on_page_complete(&key, 1, 1);
        tracker.on_page_error(&key, "timeout");

        assert_eq!(tracker.skipped_cache.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.skipped_disk.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_run_start(1);
        cb.on_page_start(&PageKey::new("J", "a.pdf", 3));
    }
}
