#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

use stream_cache::platform::FixedUsage;
use stream_cache::poller::{Service, SessionRecord, SessionSource};
use stream_cache::{AppConfig, Ledger, Mover};

/// Temp layout:
///   root/
///     bulk/      bulk storage root
///     cache/     cache tier root
///     state/     ledger and lock files
pub struct Fixture {
    pub tmp: TempDir,
    pub bulk: PathBuf,
    pub cache: PathBuf,
    pub state: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let tmp = tempdir().unwrap();
        let bulk = tmp.path().join("bulk");
        let cache = tmp.path().join("cache");
        let state = tmp.path().join("state");
        fs::create_dir_all(&bulk).unwrap();
        fs::create_dir_all(&cache).unwrap();
        fs::create_dir_all(&state).unwrap();
        Self {
            tmp,
            bulk,
            cache,
            state,
        }
    }

    pub fn config(&self) -> AppConfig {
        AppConfig {
            bulk_root: self.bulk.clone(),
            bulk_direct_root: self.bulk.clone(),
            cache_root: self.cache.clone(),
            ledger_file: self.state.join("cached_files.list"),
            lock_file: self.state.join("stream_cache.lock"),
            ..AppConfig::default()
        }
    }

    /// Mover that always sees the cache tier at `usage` percent.
    pub fn mover_with_usage(&self, config: &AppConfig, usage: f64) -> Mover {
        Mover::from_config(config).with_usage_probe(Box::new(FixedUsage(usage)))
    }

    pub fn mover(&self, config: &AppConfig) -> Mover {
        self.mover_with_usage(config, 10.0)
    }

    pub fn ledger(&self) -> Ledger {
        Ledger::new(&self.state.join("cached_files.list"))
    }

    pub fn bulk_path(&self, rel: &str) -> PathBuf {
        self.bulk.join(rel)
    }

    pub fn cache_path(&self, rel: &str) -> PathBuf {
        self.cache.join(rel)
    }

    pub fn write_bulk(&self, rel: &str, content: &[u8]) -> PathBuf {
        write_file(&self.bulk_path(rel), content)
    }

    pub fn write_cache(&self, rel: &str, content: &[u8]) -> PathBuf {
        write_file(&self.cache_path(rel), content)
    }
}

pub fn write_file(path: &Path, content: &[u8]) -> PathBuf {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
    path.to_path_buf()
}

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

pub fn session(path: &Path) -> SessionRecord {
    SessionRecord {
        source_path: path.to_string_lossy().into_owned(),
        service: Service::Emby,
        item_id: path.file_name().unwrap().to_string_lossy().into_owned(),
        user_id: Some("user-1".to_string()),
    }
}

/// Scripted media servers: whatever is in `playing` is active, and any
/// item id in `watched` reports as watched.
#[derive(Default)]
pub struct FakeSource {
    pub playing: Vec<SessionRecord>,
    pub watched: HashSet<String>,
}

impl FakeSource {
    pub fn play(&mut self, path: &Path) {
        self.playing.push(session(path));
    }

    pub fn stop_all(&mut self) {
        self.playing.clear();
    }

    pub fn mark_watched(&mut self, path: &Path) {
        self.watched.insert(session(path).item_id);
    }
}

impl SessionSource for FakeSource {
    fn active_sessions(&mut self) -> Vec<SessionRecord> {
        self.playing.clone()
    }

    fn is_watched(&self, session: &SessionRecord) -> bool {
        self.watched.contains(&session.item_id)
    }
}
