use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

use crate::config::{AppConfig, CleanupMode};
use crate::engine::CycleReport;
use crate::media::{self, episode_of, file_name, MediaFilter};
use crate::poller::{SessionRecord, SessionSource};
use crate::transfer::{DemoteOutcome, Mover};

const DAYS_SWEEP_INTERVAL_SECS: i64 = 3600;

/// Cache files waiting out the delete delay after being watched.
#[derive(Debug, Default, Clone)]
pub struct DeletionQueue {
    entries: BTreeMap<PathBuf, DateTime<Utc>>,
}

impl DeletionQueue {
    /// Re-queueing a path restarts its delay.
    pub fn enqueue(&mut self, cache_path: &Path, now: DateTime<Utc>) {
        self.entries.insert(cache_path.to_path_buf(), now);
    }

    pub fn cancel(&mut self, cache_path: &Path) -> bool {
        self.entries.remove(cache_path).is_some()
    }

    pub fn contains(&self, cache_path: &Path) -> bool {
        self.entries.contains_key(cache_path)
    }

    pub fn queued_at(&self, cache_path: &Path) -> Option<DateTime<Utc>> {
        self.entries.get(cache_path).copied()
    }

    /// Entries older than `delay`.
    pub fn due(&self, now: DateTime<Utc>, delay: Duration) -> Vec<PathBuf> {
        self.entries
            .iter()
            .filter(|(_, queued_at)| now - **queued_at > delay)
            .map(|(path, _)| path.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A path that was playing last cycle and is not playing now.
#[derive(Debug, Clone)]
pub struct StoppedStream {
    pub bulk_path: PathBuf,
    pub session: SessionRecord,
}

/// Everything an eviction pass may read or act through.
pub struct CleanupContext<'a> {
    pub config: &'a AppConfig,
    pub mover: &'a Mover,
    pub filter: &'a MediaFilter,
}

impl CleanupContext<'_> {
    /// Excluded directories are off limits for eviction too.
    fn may_evict(&self, cache_path: &Path) -> bool {
        let cache_root = self.mover.translator().cache_root();
        let rel = cache_path.strip_prefix(cache_root).unwrap_or(cache_path);
        !self.filter.is_excluded(rel)
    }

    fn evict(&self, cache_path: &Path, label: &str, report: &mut CycleReport) {
        if !self.may_evict(cache_path) {
            debug!("Not evicting excluded {}", cache_path.display());
            return;
        }
        match self.mover.demote(cache_path) {
            Ok(DemoteOutcome::Absent) => {
                debug!("{} already gone from cache", cache_path.display());
            }
            Ok(_) => {
                info!("[{}] {}", label, file_name(cache_path));
                report.demoted += 1;
            }
            Err(e) => {
                error!("Move to bulk storage failed for {}: {}", cache_path.display(), e);
                report.errors += 1;
            }
        }
    }
}

/// Runs whichever eviction style the configuration selects.
#[derive(Debug, Default)]
pub struct CleanupEvaluator {
    queue: DeletionQueue,
    last_days_sweep: Option<DateTime<Utc>>,
}

impl CleanupEvaluator {
    pub fn queue(&self) -> &DeletionQueue {
        &self.queue
    }

    /// Called when a path is playing again.
    pub fn cancel(&mut self, cache_path: &Path) -> bool {
        self.queue.cancel(cache_path)
    }

    pub fn run(
        &mut self,
        ctx: &CleanupContext<'_>,
        stopped: &[StoppedStream],
        source: &dyn SessionSource,
        now: DateTime<Utc>,
        report: &mut CycleReport,
    ) {
        match ctx.config.cleanup_mode {
            CleanupMode::None => {}
            CleanupMode::Smart => {
                self.queue_watched(ctx, stopped, source, now, report);
                self.drain_queue(ctx, now, report);
            }
            CleanupMode::Days => self.days_sweep(ctx, now, report),
        }
    }

    /// Queue the cache copies of streams that stopped after being watched.
    /// Finishing the newest episode of a season queues the whole cached season.
    pub fn queue_watched(
        &mut self,
        ctx: &CleanupContext<'_>,
        stopped: &[StoppedStream],
        source: &dyn SessionSource,
        now: DateTime<Utc>,
        report: &mut CycleReport,
    ) {
        let translator = ctx.mover.translator();
        for stream in stopped {
            let Ok(cache_path) = translator.to_cache(&stream.bulk_path) else {
                continue;
            };
            if !cache_path.exists() {
                continue;
            }
            if !source.is_watched(&stream.session) {
                debug!("{} stopped but is not watched", file_name(&stream.bulk_path));
                continue;
            }

            let Some(episode) = episode_of(&stream.bulk_path) else {
                info!("[Queued] {}", file_name(&cache_path));
                self.queue.enqueue(&cache_path, now);
                report.queued += 1;
                continue;
            };

            let (Some(season_dir), Some(cache_season)) =
                (stream.bulk_path.parent(), cache_path.parent())
            else {
                continue;
            };
            let latest = match media::list_files(season_dir) {
                Ok(files) => files.iter().map(|f| episode_of(f).unwrap_or(0)).max(),
                Err(e) => {
                    error!("Could not list {}: {}", season_dir.display(), e);
                    continue;
                }
            };
            if latest.is_some_and(|latest| episode < latest) {
                continue;
            }

            match media::list_files(cache_season) {
                Ok(files) => {
                    info!(
                        "[Queued] season of {} finished, queueing {} cached files",
                        file_name(&stream.bulk_path),
                        files.len()
                    );
                    for file in files {
                        self.queue.enqueue(&file, now);
                        report.queued += 1;
                    }
                }
                Err(e) => error!("Could not list {}: {}", cache_season.display(), e),
            }
        }
    }

    /// Evict queue entries whose delay has elapsed. Entries leave the queue
    /// whether or not the move succeeded.
    pub fn drain_queue(&mut self, ctx: &CleanupContext<'_>, now: DateTime<Utc>, report: &mut CycleReport) {
        let delay = ctx.config.movie_delete_delay();
        for cache_path in self.queue.due(now, delay) {
            ctx.evict(&cache_path, "Cleanup", report);
            self.queue.cancel(&cache_path);
        }
    }

    /// Hourly: evict ledger entries older than the configured age.
    pub fn days_sweep(&mut self, ctx: &CleanupContext<'_>, now: DateTime<Utc>, report: &mut CycleReport) {
        if let Some(last) = self.last_days_sweep {
            if (now - last).num_seconds() < DAYS_SWEEP_INTERVAL_SECS {
                return;
            }
        }
        self.last_days_sweep = Some(now);

        let entries = match ctx.mover.ledger().load() {
            Ok(entries) => entries,
            Err(e) => {
                error!("Could not read ledger {}: {}", ctx.mover.ledger().path().display(), e);
                return;
            }
        };

        let max_age = ctx.config.cache_max_age().num_seconds();
        let now_secs = now.timestamp();
        for (cache_path, cached_at) in entries {
            if now_secs.saturating_sub(cached_at) > max_age {
                ctx.evict(&cache_path, "Days Cleanup", report);
            }
        }
    }
}
