pub mod backend;

use std::fs;
use std::io::{self, BufRead, BufReader, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn};

pub use backend::{FileTransfer, NativeTransfer, RsyncTransfer};

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::ledger::Ledger;
use crate::media::file_name;
use crate::paths::PathTranslator;
use crate::platform::{self, FsUsageProbe, UsageProbe};

/// A file this daemon placed on the cache tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub cache_path: PathBuf,
    pub cached_at: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Cache tier usage is at or above the configured ceiling.
    CacheFull { usage: f64 },
    UsageUnavailable,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PromoteOutcome {
    Cached(CacheEntry),
    /// A same-sized copy was already on the cache tier; only the ledger was touched.
    AlreadyCached(CacheEntry),
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DemoteOutcome {
    Moved { bulk_path: PathBuf, bytes: u64 },
    /// Bulk storage already held a byte-identical copy.
    Deleted { bytes: u64 },
    Absent,
}

/// Promotes files to the cache tier and demotes them back, keeping the
/// ledger in step with what is on disk.
pub struct Mover {
    translator: PathTranslator,
    ledger: Ledger,
    transfer: Box<dyn FileTransfer>,
    usage: Box<dyn UsageProbe>,
    max_usage: f64,
    protected: Vec<PathBuf>,
}

impl Mover {
    pub fn new(translator: PathTranslator, ledger: Ledger) -> Self {
        let protected = translator.protected_cache_dirs();
        Self {
            translator,
            ledger,
            transfer: Box::new(NativeTransfer),
            usage: Box::new(FsUsageProbe),
            max_usage: 80.0,
            protected,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            PathTranslator::from_config(config),
            Ledger::new(&config.ledger_file),
        )
        .with_transfer(backend::from_backend(config.transfer_backend))
        .with_max_usage(config.cache_max_usage)
    }

    pub fn with_transfer(mut self, transfer: Box<dyn FileTransfer>) -> Self {
        self.transfer = transfer;
        self
    }

    pub fn with_usage_probe(mut self, usage: Box<dyn UsageProbe>) -> Self {
        self.usage = usage;
        self
    }

    pub fn with_max_usage(mut self, percent: u8) -> Self {
        self.max_usage = f64::from(percent);
        self
    }

    pub fn translator(&self) -> &PathTranslator {
        &self.translator
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Copy a bulk storage file onto the cache tier and record it.
    pub fn promote(&self, bulk_path: &Path) -> Result<PromoteOutcome> {
        let cache_path = self.translator.to_cache(bulk_path)?;
        let source = fs::metadata(bulk_path)?;

        if let Ok(existing) = fs::metadata(&cache_path) {
            if existing.len() == source.len() {
                let cached_at = self.ledger.add(&cache_path)?;
                trace!("{} already cached", cache_path.display());
                return Ok(PromoteOutcome::AlreadyCached(CacheEntry {
                    cache_path,
                    cached_at,
                }));
            }
        }

        match self.usage.usage_percent(self.translator.cache_root()) {
            Ok(usage) if usage >= self.max_usage => {
                debug!(
                    "Cache at {:.1}% (limit {:.0}%), not copying {}",
                    usage,
                    self.max_usage,
                    file_name(bulk_path)
                );
                return Ok(PromoteOutcome::Skipped(SkipReason::CacheFull { usage }));
            }
            Ok(_) => {}
            Err(e) => {
                warn!(
                    "Could not read usage of {}: {}",
                    self.translator.cache_root().display(),
                    e
                );
                return Ok(PromoteOutcome::Skipped(SkipReason::UsageUnavailable));
            }
        }

        info!("[Copy] -> {}", file_name(bulk_path));
        self.create_cache_dirs(&cache_path)?;

        if let Err(e) = self.transfer.transfer(bulk_path, &cache_path, false) {
            discard_partial(&cache_path);
            return Err(e);
        }

        let copied = fs::metadata(&cache_path)?.len();
        if copied != source.len() {
            discard_partial(&cache_path);
            return Err(Error::SizeMismatch {
                path: cache_path,
                expected: source.len(),
                actual: copied,
            });
        }

        if let Err(e) = platform::replicate_ownership(&source, &cache_path) {
            warn!("Permission clone failed for {}: {}", cache_path.display(), e);
        }

        let cached_at = self.ledger.add(&cache_path)?;
        Ok(PromoteOutcome::Cached(CacheEntry {
            cache_path,
            cached_at,
        }))
    }

    /// Return a cache file to bulk storage and drop its ledger entry.
    pub fn demote(&self, cache_path: &Path) -> Result<DemoteOutcome> {
        self.demote_inner(cache_path, true)
    }

    /// Like [`Mover::demote`] but leaves the ledger alone.
    pub fn demote_untracked(&self, cache_path: &Path) -> Result<DemoteOutcome> {
        self.demote_inner(cache_path, false)
    }

    fn demote_inner(&self, cache_path: &Path, track: bool) -> Result<DemoteOutcome> {
        let bulk_path = self.translator.to_bulk(cache_path)?;

        let cache_meta = match fs::metadata(cache_path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if track && self.ledger.remove(cache_path)? {
                    debug!("Dropped stale ledger entry {}", cache_path.display());
                }
                return Ok(DemoteOutcome::Absent);
            }
            Err(e) => return Err(e.into()),
        };
        let size = cache_meta.len();

        let outcome = match fs::metadata(&bulk_path) {
            Ok(bulk_meta) if bulk_meta.len() == size && same_content(cache_path, &bulk_path)? => {
                fs::remove_file(cache_path)?;
                DemoteOutcome::Deleted { bytes: size }
            }
            Ok(bulk_meta) => {
                return Err(Error::DivergentCopy {
                    cache: cache_path.to_path_buf(),
                    bulk: bulk_path,
                    cache_size: size,
                    bulk_size: bulk_meta.len(),
                });
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.transfer.transfer(cache_path, &bulk_path, true)?;
                let landed = fs::metadata(&bulk_path)?.len();
                if landed != size {
                    return Err(Error::SizeMismatch {
                        path: bulk_path,
                        expected: size,
                        actual: landed,
                    });
                }
                if let Err(e) = platform::replicate_ownership(&cache_meta, &bulk_path) {
                    warn!("Permission clone failed for {}: {}", bulk_path.display(), e);
                }
                DemoteOutcome::Moved {
                    bulk_path,
                    bytes: size,
                }
            }
            Err(e) => return Err(e.into()),
        };

        self.prune_empty_dirs(cache_path);
        if track {
            self.ledger.remove(cache_path)?;
        }
        Ok(outcome)
    }

    /// Create missing cache directories one level at a time, copying
    /// ownership from the bulk storage directory when there is one.
    fn create_cache_dirs(&self, cache_path: &Path) -> Result<()> {
        let cache_root = self.translator.cache_root();
        let Some(parent) = cache_path.parent() else {
            return Ok(());
        };
        let rel = parent
            .strip_prefix(cache_root)
            .map_err(|_| Error::NotUnderCacheRoot(cache_path.to_path_buf()))?;

        let mut current = cache_root.to_path_buf();
        for component in rel.components() {
            current.push(component);
            if current.is_dir() {
                continue;
            }
            match fs::create_dir(&current) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }

            let Ok(reference) = self
                .translator
                .to_bulk(&current)
                .and_then(|dir| fs::metadata(dir).map_err(Error::from))
            else {
                continue;
            };
            if let Err(e) = platform::replicate_ownership(&reference, &current) {
                warn!("Permission clone failed for {}: {}", current.display(), e);
            }
        }
        Ok(())
    }

    /// Remove now-empty parents of `cache_path`, stopping at the cache root
    /// or at a mapping target.
    pub fn prune_empty_dirs(&self, cache_path: &Path) {
        let cache_root = self.translator.cache_root();
        let mut parent = cache_path.parent();
        while let Some(dir) = parent {
            if !dir.starts_with(cache_root) || dir == cache_root {
                break;
            }
            if self.protected.iter().any(|p| p == dir) {
                break;
            }
            if fs::remove_dir(dir).is_err() {
                break;
            }
            trace!("Removed empty directory {}", dir.display());
            parent = dir.parent();
        }
    }
}

/// Byte-for-byte comparison of two files already known to have equal sizes.
fn same_content(a: &Path, b: &Path) -> io::Result<bool> {
    let mut left = BufReader::new(fs::File::open(a)?);
    let mut right = BufReader::new(fs::File::open(b)?);
    loop {
        let chunk = left.fill_buf()?;
        if chunk.is_empty() {
            return Ok(right.fill_buf()?.is_empty());
        }
        let other = right.fill_buf()?;
        let n = chunk.len().min(other.len());
        if n == 0 || chunk[..n] != other[..n] {
            return Ok(false);
        }
        left.consume(n);
        right.consume(n);
    }
}

fn discard_partial(cache_path: &Path) {
    match fs::remove_file(cache_path) {
        Ok(()) => debug!("Removed partial copy {}", cache_path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove partial copy {}: {}", cache_path.display(), e),
    }
}
