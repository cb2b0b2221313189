use chrono::Utc;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Cache path -> unix time it was first cached. Ordered so that saved
/// files are sorted by path.
pub type LedgerEntries = BTreeMap<PathBuf, i64>;

/// Durable record of files this daemon placed on the cache tier.
///
/// Stored as one `<cache-path>|<unix-timestamp>` record per line. Every
/// mutation is a read-modify-write of the whole file, so callers must hold
/// the instance lock.
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing ledger file is an empty ledger.
    pub fn load(&self) -> io::Result<LedgerEntries> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(parse_entries(&content, Utc::now().timestamp())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(LedgerEntries::new()),
            Err(e) => Err(e),
        }
    }

    /// Writes a sibling temp file and renames it over the ledger, so a
    /// crash mid-write leaves the previous ledger intact.
    pub fn save(&self, entries: &LedgerEntries) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = self.tmp_path();
        {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(render_entries(entries).as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        debug!("Saved {} ledger entries to {}", entries.len(), self.path.display());
        Ok(())
    }

    /// Returns the recorded cache time; an existing entry keeps its timestamp.
    pub fn add(&self, cache_path: &Path) -> io::Result<i64> {
        let mut entries = self.load()?;
        if let Some(cached_at) = entries.get(cache_path) {
            return Ok(*cached_at);
        }
        let cached_at = Utc::now().timestamp();
        entries.insert(cache_path.to_path_buf(), cached_at);
        self.save(&entries)?;
        Ok(cached_at)
    }

    /// Returns whether an entry was present.
    pub fn remove(&self, cache_path: &Path) -> io::Result<bool> {
        let mut entries = self.load()?;
        if entries.remove(cache_path).is_none() {
            return Ok(false);
        }
        self.save(&entries)?;
        Ok(true)
    }

    pub fn contains(&self, cache_path: &Path) -> io::Result<bool> {
        Ok(self.load()?.contains_key(cache_path))
    }

    pub fn clear(&self) -> io::Result<()> {
        self.save(&LedgerEntries::new())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

/// Best-effort parse: unreadable records are skipped with a warning, and a
/// bare path from older ledgers is stamped with `now`.
pub fn parse_entries(content: &str, now: i64) -> LedgerEntries {
    let mut entries = LedgerEntries::new();
    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        match line.rsplit_once('|') {
            Some((path, stamp)) => match stamp.trim().parse::<f64>() {
                Ok(secs) if secs.is_finite() && !path.is_empty() => {
                    entries.insert(PathBuf::from(path), secs as i64);
                }
                _ => warn!("Skipping unreadable ledger line {}: {:?}", lineno + 1, line),
            },
            None => {
                entries.insert(PathBuf::from(line.trim()), now);
            }
        }
    }
    entries
}

pub fn render_entries(entries: &LedgerEntries) -> String {
    let mut out = String::new();
    for (path, cached_at) in entries {
        out.push_str(&format!("{}|{}\n", path.display(), cached_at));
    }
    out
}
