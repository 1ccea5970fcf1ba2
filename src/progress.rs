//! Progress-callback trait for batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] into
//! [`crate::batch::BatchRunner::with_progress`] to follow a run file by file.
//! The library knows nothing about how events are shown: the CLI drives an
//! `indicatif` bar, tests count calls.
//!
//! # Example
//!
//! ```rust
//! use docclass::{BatchProgressCallback, FileDisposition};
//! use std::path::Path;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct Counter(AtomicUsize);
//!
//! impl BatchProgressCallback for Counter {
//!     fn on_file_complete(&self, _path: &Path, _disposition: &FileDisposition) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//! ```

use crate::batch::{BatchSummary, FileDisposition};
use std::path::Path;
use std::sync::Arc;

/// Called by [`crate::batch::BatchRunner`] as it works through files.
///
/// All methods default to no-ops so callers only override what they need.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once, with the number of files in the selected deals.
    fn on_batch_start(&self, total_files: usize) {
        let _ = total_files;
    }

    fn on_file_start(&self, path: &Path) {
        let _ = path;
    }

    fn on_file_complete(&self, path: &Path, disposition: &FileDisposition) {
        let _ = (path, disposition);
    }

    fn on_batch_complete(&self, summary: &BatchSummary) {
        let _ = summary;
    }
}

/// Default when no callback is configured.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
