//! Operator-triggered sweeps that empty the cache tier outside the daemon
//! loop. Callers hold the instance lock.

use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};
use walkdir::WalkDir;

use crate::error::Result;
use crate::ledger::LedgerEntries;
use crate::media::file_name;
use crate::progress::ProgressReporter;
use crate::transfer::{DemoteOutcome, Mover};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub success: bool,
    pub message: String,
    pub moved: usize,
    /// Cache copies dropped because bulk storage already had them.
    pub deleted: usize,
    pub skipped: usize,
    pub bytes: u64,
    pub errors: Vec<String>,
}

impl BatchSummary {
    fn failed(message: String) -> Self {
        Self {
            success: false,
            message,
            ..Self::default()
        }
    }

    fn record(&mut self, cache_path: &Path, result: Result<DemoteOutcome>) {
        match result {
            Ok(DemoteOutcome::Moved { bytes, .. }) => {
                self.moved += 1;
                self.bytes += bytes;
            }
            Ok(DemoteOutcome::Deleted { bytes }) => {
                self.deleted += 1;
                self.bytes += bytes;
            }
            Ok(DemoteOutcome::Absent) => self.skipped += 1,
            Err(e) => {
                error!("Could not move {}: {}", cache_path.display(), e);
                self.errors.push(file_name(cache_path));
            }
        }
    }

    fn handled(&self) -> usize {
        self.moved + self.deleted
    }
}

/// Demote every file in the ledger. Only entries whose move failed remain
/// in the ledger afterwards.
pub fn move_tracked(mover: &Mover, reporter: &dyn ProgressReporter) -> BatchSummary {
    let entries = match mover.ledger().load() {
        Ok(entries) => entries,
        Err(e) => return BatchSummary::failed(format!("Could not read ledger: {}", e)),
    };

    reporter.on_batch_start("Moving tracked files", entries.len());
    let mut summary = BatchSummary::default();
    for (done, cache_path) in entries.keys().enumerate() {
        reporter.on_file(done + 1, cache_path);
        summary.record(cache_path, mover.demote(cache_path));
    }

    summary.success = true;
    summary.message = format!(
        "Done: {} files ({} MB). Moved: {}, Deleted: {}",
        summary.handled(),
        megabytes(summary.bytes),
        summary.moved,
        summary.deleted
    );
    if !summary.errors.is_empty() {
        summary.message.push_str(&format!(", Errors: {}", summary.errors.len()));
    }
    info!("{}", summary.message);
    reporter.on_batch_complete(&summary);
    summary
}

/// Demote every cache file the ledger does not know about.
pub fn move_other(mover: &Mover, reporter: &dyn ProgressReporter) -> BatchSummary {
    let cache_root = mover.translator().cache_root();
    if !cache_root.is_dir() {
        return BatchSummary::failed(format!("Cache not found: {}", cache_root.display()));
    }
    let tracked = match mover.ledger().load() {
        Ok(entries) => entries,
        Err(e) => return BatchSummary::failed(format!("Could not read ledger: {}", e)),
    };

    let files = cache_files(cache_root);
    reporter.on_batch_start("Moving untracked files", files.len());
    let mut summary = BatchSummary::default();
    for (done, cache_path) in files.iter().enumerate() {
        reporter.on_file(done + 1, cache_path);
        if tracked.contains_key(cache_path) {
            summary.skipped += 1;
            continue;
        }
        summary.record(cache_path, mover.demote_untracked(cache_path));
    }
    prune_empty_tree(mover);

    summary.success = true;
    summary.message = format!(
        "Moved {} files ({} GB). Total: {}, Skipped: {}",
        summary.handled(),
        gigabytes(summary.bytes),
        files.len(),
        summary.skipped
    );
    if !summary.errors.is_empty() {
        summary.message.push_str(&format!(", Errors: {}", summary.errors.len()));
    }
    info!("{}", summary.message);
    reporter.on_batch_complete(&summary);
    summary
}

/// Demote everything on the cache tier and reset the ledger.
pub fn move_all(mover: &Mover, reporter: &dyn ProgressReporter) -> BatchSummary {
    let cache_root = mover.translator().cache_root();
    if !cache_root.is_dir() {
        return BatchSummary::failed(format!("Cache not found: {}", cache_root.display()));
    }
    let tracked = match mover.ledger().load() {
        Ok(entries) => entries,
        Err(e) => return BatchSummary::failed(format!("Could not read ledger: {}", e)),
    };

    let files = cache_files(cache_root);
    reporter.on_batch_start("Moving all cache files", files.len());
    let mut summary = BatchSummary::default();
    let mut failed = BTreeSet::new();
    for (done, cache_path) in files.iter().enumerate() {
        reporter.on_file(done + 1, cache_path);
        let result = mover.demote_untracked(cache_path);
        if result.is_err() {
            failed.insert(cache_path.clone());
        }
        summary.record(cache_path, result);
    }
    prune_empty_tree(mover);

    let remaining: LedgerEntries = tracked
        .into_iter()
        .filter(|(path, _)| failed.contains(path))
        .collect();
    if let Err(e) = mover.ledger().save(&remaining) {
        error!("Could not reset ledger: {}", e);
        summary.errors.push(file_name(mover.ledger().path()));
    }

    summary.success = true;
    summary.message = format!(
        "Moved {} files ({} GB) to bulk storage",
        summary.handled(),
        gigabytes(summary.bytes)
    );
    if !summary.errors.is_empty() {
        summary.message.push_str(&format!(", Errors: {}", summary.errors.len()));
    }
    info!("{}", summary.message);
    reporter.on_batch_complete(&summary);
    summary
}

fn cache_files(cache_root: &Path) -> Vec<PathBuf> {
    WalkDir::new(cache_root)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                error!("Error walking {}: {}", cache_root.display(), e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect()
}

/// Remove every empty directory below the cache root except mapping targets.
fn prune_empty_tree(mover: &Mover) {
    let cache_root = mover.translator().cache_root();
    let protected = mover.translator().protected_cache_dirs();
    for entry in WalkDir::new(cache_root)
        .min_depth(1)
        .contents_first(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
    {
        let dir = entry.path();
        if protected.iter().any(|p| p == dir) {
            continue;
        }
        if std::fs::remove_dir(dir).is_ok() {
            debug!("Removed empty directory {}", dir.display());
        }
    }
}

fn megabytes(bytes: u64) -> f64 {
    (bytes as f64 / 1024.0 / 1024.0 * 100.0).round() / 100.0
}

fn gigabytes(bytes: u64) -> f64 {
    (bytes as f64 / 1024.0 / 1024.0 / 1024.0 * 100.0).round() / 100.0
}
