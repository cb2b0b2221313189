//! Per-path stream lifecycle: debounce new streams, promote what keeps
//! playing, and hand stopped streams to the cleanup policy.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, trace, warn};

use crate::config::{AppConfig, CleanupMode};
use crate::media::{self, episode_of, file_name, MediaFilter};
use crate::policy::{CleanupContext, CleanupEvaluator, DeletionQueue, StoppedStream};
use crate::poller::{SessionRecord, SessionSource};
use crate::transfer::{DemoteOutcome, Mover, PromoteOutcome};

/// What one polling cycle did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub active: usize,
    pub promoted: usize,
    pub skipped: usize,
    pub demoted: usize,
    pub queued: usize,
    pub errors: usize,
}

pub struct Engine {
    config: AppConfig,
    mover: Mover,
    filter: MediaFilter,
    stream_timers: HashMap<PathBuf, DateTime<Utc>>,
    last_active: HashMap<PathBuf, SessionRecord>,
    cleanup: CleanupEvaluator,
}

impl Engine {
    pub fn new(config: AppConfig) -> Self {
        let mover = Mover::from_config(&config);
        Self::with_mover(config, mover)
    }

    pub fn with_mover(config: AppConfig, mover: Mover) -> Self {
        let filter = MediaFilter::new(&config.media_filetypes, &config.exclude_dirs);
        Self {
            config,
            mover,
            filter,
            stream_timers: HashMap::new(),
            last_active: HashMap::new(),
            cleanup: CleanupEvaluator::default(),
        }
    }

    /// Swap in a new configuration between cycles. Stream timers and the
    /// deletion queue are kept.
    pub fn reload(&mut self, config: AppConfig) {
        let mover = Mover::from_config(&config);
        self.reload_with(config, mover);
    }

    pub fn reload_with(&mut self, config: AppConfig, mover: Mover) {
        self.filter = MediaFilter::new(&config.media_filetypes, &config.exclude_dirs);
        self.mover = mover;
        self.config = config;
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn mover(&self) -> &Mover {
        &self.mover
    }

    pub fn deletion_queue(&self) -> &DeletionQueue {
        self.cleanup.queue()
    }

    pub fn stream_started_at(&self, bulk_path: &Path) -> Option<DateTime<Utc>> {
        self.stream_timers.get(bulk_path).copied()
    }

    /// One full polling cycle.
    pub fn run_cycle(&mut self, source: &mut dyn SessionSource, now: DateTime<Utc>) -> CycleReport {
        let mut report = CycleReport::default();
        let active = self.collect_active(source.active_sessions());
        report.active = active.len();

        let mut paths: Vec<&PathBuf> = active.keys().collect();
        paths.sort();
        let copy_delay = self.config.copy_delay();

        for bulk_path in paths {
            self.cancel_pending_eviction(bulk_path);

            let Some(first_seen) = self.stream_timers.get(bulk_path).copied() else {
                info!("[Stream] Active: {}", file_name(bulk_path));
                self.stream_timers.insert(bulk_path.clone(), now);
                continue;
            };
            if now - first_seen < copy_delay {
                trace!("{} still inside copy delay", file_name(bulk_path));
                continue;
            }

            match episode_of(bulk_path) {
                Some(episode) => self.handle_series(bulk_path, episode, &mut report),
                None => self.handle_movie(bulk_path, &mut report),
            }
        }

        self.stream_timers.retain(|path, _| active.contains_key(path));

        let stopped: Vec<StoppedStream> = self
            .last_active
            .iter()
            .filter(|(path, _)| !active.contains_key(*path))
            .map(|(path, session)| StoppedStream {
                bulk_path: path.clone(),
                session: session.clone(),
            })
            .collect();
        for stream in &stopped {
            debug!("[Stream] Stopped: {}", file_name(&stream.bulk_path));
        }

        let ctx = CleanupContext {
            config: &self.config,
            mover: &self.mover,
            filter: &self.filter,
        };
        self.cleanup.run(&ctx, &stopped, &*source, now, &mut report);

        self.last_active = active;
        report
    }

    /// Translate session paths and keep the ones this daemon may act on.
    fn collect_active(&self, sessions: Vec<SessionRecord>) -> HashMap<PathBuf, SessionRecord> {
        let translator = self.mover.translator();
        let mut active = HashMap::new();
        for session in sessions {
            let bulk_path = translator.translate_session_path(&session.source_path);
            if !translator.is_under_bulk(&bulk_path) {
                trace!("Ignoring {}: outside bulk storage", bulk_path.display());
                continue;
            }
            if !self.filter.accepts(&bulk_path) {
                trace!("Ignoring {}: filtered", bulk_path.display());
                continue;
            }
            active.entry(bulk_path).or_insert(session);
        }
        active
    }

    fn cancel_pending_eviction(&mut self, bulk_path: &Path) {
        let Ok(cache_path) = self.mover.translator().to_cache(bulk_path) else {
            return;
        };
        if self.cleanup.cancel(&cache_path) {
            info!("[Stream] Resumed {}, cleanup cancelled", file_name(bulk_path));
        }
    }

    /// Cache the movie and any files named after it. Siblings such as
    /// subtitles are taken regardless of extension.
    fn handle_movie(&mut self, bulk_path: &Path, report: &mut CycleReport) {
        self.promote(bulk_path, report);

        match media::stem_siblings(bulk_path) {
            Ok(siblings) => {
                for sibling in siblings {
                    self.promote(&sibling, report);
                }
            }
            Err(e) => warn!("Could not list siblings of {}: {}", bulk_path.display(), e),
        }
    }

    /// Under smart cleanup, drop cached episodes more than
    /// `episode_keep_previous` behind; then cache this and later episodes.
    fn handle_series(&mut self, bulk_path: &Path, episode: u32, report: &mut CycleReport) {
        let Some(season_dir) = bulk_path.parent() else {
            return;
        };

        if self.config.cleanup_mode == CleanupMode::Smart {
            self.trim_watched_episodes(season_dir, episode, report);
        }

        let episodes = match media::list_episodes(season_dir) {
            Ok(episodes) => episodes,
            Err(e) => {
                error!("Could not list {}: {}", season_dir.display(), e);
                report.errors += 1;
                return;
            }
        };
        for (number, path) in episodes {
            if number >= episode && self.filter.is_media_file(&path) {
                self.promote(&path, report);
            }
        }
    }

    fn trim_watched_episodes(&mut self, season_dir: &Path, episode: u32, report: &mut CycleReport) {
        let Ok(cache_season) = self.mover.translator().to_cache(season_dir) else {
            return;
        };
        if !cache_season.is_dir() {
            return;
        }

        let threshold = i64::from(episode) - i64::from(self.config.episode_keep_previous);
        let cached = match media::list_episodes(&cache_season) {
            Ok(cached) => cached,
            Err(e) => {
                error!("Could not list {}: {}", cache_season.display(), e);
                report.errors += 1;
                return;
            }
        };

        for (number, cache_path) in cached {
            if i64::from(number) >= threshold {
                continue;
            }
            match self.mover.demote(&cache_path) {
                Ok(DemoteOutcome::Absent) => {}
                Ok(_) => {
                    info!("[Smart Cleanup] {}", file_name(&cache_path));
                    self.cleanup.cancel(&cache_path);
                    report.demoted += 1;
                }
                Err(e) => {
                    error!("Move to bulk storage failed for {}: {}", cache_path.display(), e);
                    report.errors += 1;
                }
            }
        }
    }

    fn promote(&mut self, bulk_path: &Path, report: &mut CycleReport) {
        if self.filter.is_excluded(bulk_path) {
            return;
        }
        match self.mover.promote(bulk_path) {
            Ok(PromoteOutcome::Cached(entry)) => {
                self.cleanup.cancel(&entry.cache_path);
                report.promoted += 1;
            }
            Ok(PromoteOutcome::AlreadyCached(entry)) => {
                self.cleanup.cancel(&entry.cache_path);
            }
            Ok(PromoteOutcome::Skipped(reason)) => {
                debug!("Skipped {}: {:?}", file_name(bulk_path), reason);
                report.skipped += 1;
            }
            Err(e) => {
                error!("Copy failed for {}: {}", bulk_path.display(), e);
                report.errors += 1;
            }
        }
    }
}
