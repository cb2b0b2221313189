use std::path::Path;

use crate::batch::BatchSummary;

/// Trait for reporting batch command progress.
///
/// The CLI implements it with an indicatif spinner. All methods have
/// default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_batch_start(&self, _label: &str, _total_files: usize) {}
    fn on_file(&self, _done: usize, _path: &Path) {}
    fn on_batch_complete(&self, _summary: &BatchSummary) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
