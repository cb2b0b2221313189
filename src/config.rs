use chrono::Duration;
use config::{Config, Environment, File as ConfigFile};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Upper bound for every configured delay or age, about a century.
pub const MAX_DURATION_SECS: u64 = 100 * 365 * SECS_PER_DAY;
const SECS_PER_DAY: u64 = 86_400;

/// Which eviction strategy runs each cycle. Exactly one is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanupMode {
    #[default]
    None,
    Smart,
    Days,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferBackend {
    #[default]
    Native,
    Rsync,
}

/// Connection settings for one media server.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub enabled: bool,
    pub url: String,
    pub token: String,
}

impl ServiceConfig {
    fn disabled(url: &str) -> Self {
        Self {
            enabled: false,
            url: url.to_string(),
            token: String::new(),
        }
    }
}

/// A container mount prefix and the host directory it points at.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PathMapping {
    pub container: String,
    pub host: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub check_interval_secs: u64,
    /// Cache tier usage ceiling, in percent.
    pub cache_max_usage: u8,
    pub copy_delay_secs: u64,
    pub cleanup_mode: CleanupMode,
    pub movie_delete_delay_secs: u64,
    pub episode_keep_previous: u32,
    pub cache_max_days: u64,
    pub exclude_dirs: Vec<String>,
    pub media_filetypes: Vec<String>,
    pub bulk_root: PathBuf,
    /// Array-only view of bulk storage. `bulk_root` may be a union view that
    /// also lists cache-resident files, so demotions land here and duplicate
    /// checks look here. Set it equal to `bulk_root` on plain setups.
    pub bulk_direct_root: PathBuf,
    pub cache_root: PathBuf,
    pub path_mappings: Vec<PathMapping>,
    pub ledger_file: PathBuf,
    pub lock_file: PathBuf,
    pub transfer_backend: TransferBackend,
    pub plex: ServiceConfig,
    pub emby: ServiceConfig,
    pub jellyfin: ServiceConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 10,
            cache_max_usage: 80,
            copy_delay_secs: 30,
            cleanup_mode: CleanupMode::None,
            movie_delete_delay_secs: 1800,
            episode_keep_previous: 2,
            cache_max_days: 7,
            exclude_dirs: Vec::new(),
            media_filetypes: vec![".mkv".into(), ".mp4".into(), ".avi".into()],
            bulk_root: PathBuf::from("/mnt/user"),
            bulk_direct_root: PathBuf::from("/mnt/user0"),
            cache_root: PathBuf::from("/mnt/cache"),
            path_mappings: Vec::new(),
            ledger_file: PathBuf::from("/boot/config/plugins/stream_cache/cached_files.list"),
            lock_file: PathBuf::from("/tmp/stream_cache.lock"),
            transfer_backend: TransferBackend::Native,
            plex: ServiceConfig::disabled("http://localhost:32400"),
            emby: ServiceConfig::disabled("http://localhost:8096"),
            jellyfin: ServiceConfig::disabled("http://localhost:8096"),
        }
    }
}

impl AppConfig {
    /// Layer the optional config file under `STREAM_CACHE__*` environment overrides.
    pub fn load(path: &Path) -> Result<AppConfig> {
        let builder = Config::builder()
            .add_source(ConfigFile::with_name(&path.to_string_lossy()).required(false))
            .add_source(
                Environment::with_prefix("STREAM_CACHE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config = builder.try_deserialize::<AppConfig>()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache_max_usage > 100 {
            return Err(Error::InvalidConfig(format!(
                "cache_max_usage must be a percentage, got {}",
                self.cache_max_usage
            )));
        }

        let durations = [
            ("check_interval_secs", self.check_interval_secs),
            ("copy_delay_secs", self.copy_delay_secs),
            ("movie_delete_delay_secs", self.movie_delete_delay_secs),
            (
                "cache_max_days",
                self.cache_max_days.saturating_mul(SECS_PER_DAY),
            ),
        ];
        for (name, secs) in durations {
            if secs > MAX_DURATION_SECS {
                return Err(Error::InvalidConfig(format!(
                    "{} is out of range (at most {} seconds)",
                    name, MAX_DURATION_SECS
                )));
            }
        }

        let roots = [
            ("bulk_root", &self.bulk_root),
            ("cache_root", &self.cache_root),
            ("bulk_direct_root", &self.bulk_direct_root),
        ];
        for (name, root) in roots {
            if !root.is_absolute() {
                return Err(Error::InvalidConfig(format!(
                    "{} must be absolute, got {}",
                    name,
                    root.display()
                )));
            }
        }

        for bulk in [&self.bulk_root, &self.bulk_direct_root] {
            if self.cache_root.starts_with(bulk) || bulk.starts_with(&self.cache_root) {
                return Err(Error::InvalidConfig(format!(
                    "cache_root {} and {} must not contain each other",
                    self.cache_root.display(),
                    bulk.display()
                )));
            }
        }

        if let Some(mapping) = self
            .path_mappings
            .iter()
            .find(|m| m.container.trim().is_empty() || m.host.trim().is_empty())
        {
            return Err(Error::InvalidConfig(format!(
                "path mapping has an empty side: {:?}",
                mapping
            )));
        }

        Ok(())
    }

    /// Where demoted files are written and where duplicates are looked for.
    pub fn demote_root(&self) -> &Path {
        &self.bulk_direct_root
    }

    pub fn copy_delay(&self) -> Duration {
        clamped_seconds(self.copy_delay_secs)
    }

    pub fn movie_delete_delay(&self) -> Duration {
        clamped_seconds(self.movie_delete_delay_secs)
    }

    pub fn cache_max_age(&self) -> Duration {
        clamped_seconds(self.cache_max_days.saturating_mul(SECS_PER_DAY))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::InvalidConfig(e.to_string()))
    }
}

/// Values past `MAX_DURATION_SECS` saturate instead of overflowing.
fn clamped_seconds(secs: u64) -> Duration {
    Duration::seconds(secs.min(MAX_DURATION_SECS) as i64)
}
