//! Progress-callback trait for per-page extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to hear about
//! each page as it is rendered and read. This is how a host surfaces
//! page-level warnings ("page 4: no entries") and the final summary; the
//! library itself never prints.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf2toc::{ExtractionConfig, ExtractionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct EntryCounter {
//!     entries: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for EntryCounter {
//!     fn on_page_complete(&self, _page_num: usize, _total: usize, entry_count: usize) {
//!         self.entries.fetch_add(entry_count, Ordering::SeqCst);
//!     }
//! }
//!
//! let counter = Arc::new(EntryCounter { entries: AtomicUsize::new(0) });
//! let config = ExtractionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the extraction pipeline as it processes each page.
///
/// All methods default to no-ops. Implementations must be `Send + Sync`:
/// with `concurrency > 1` page events can arrive from several tasks at once.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once, after the page range is resolved.
    fn on_run_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called before a page is rendered.
    ///
    /// * `page_num`: 1-indexed physical page number
    /// * `total_pages`: pages in the selected range
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when the model answered for a page. `entry_count` may be zero.
    fn on_page_complete(&self, page_num: usize, total_pages: usize, entry_count: usize) {
        let _ = (page_num, total_pages, entry_count);
    }

    /// Called when a page could not be rendered or its model call failed.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: String) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once after every page in the range has been attempted.
    fn on_run_complete(&self, total_pages: usize, entry_count: usize) {
        let _ = (total_pages, entry_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        entries: AtomicUsize,
    }

    impl ExtractionProgressCallback for TrackingCallback {
        fn on_page_start(&self, _page_num: usize, _total_pages: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_complete(&self, _page_num: usize, _total_pages: usize, entry_count: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
            self.entries.fetch_add(entry_count, Ordering::SeqCst);
        }

        fn on_page_error(&self, _page_num: usize, _total_pages: usize, _error: String) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_run_start(3);
        cb.on_page_start(1, 3);
        cb.on_page_complete(1, 3, 12);
        cb.on_page_error(2, 3, "render failed".into());
        cb.on_run_complete(3, 12);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();

        tracker.on_page_start(4, 2);
        tracker.on_page_complete(4, 2, 7);
        tracker.on_page_start(5, 2);
        tracker.on_page_error(5, 2, "timeout".into());

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.entries.load(Ordering::SeqCst), 7);
    }
}
