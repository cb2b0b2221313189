use regex::Regex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

lazy_static::lazy_static! {
    static ref EPISODE_RE: Regex = Regex::new(r"[sS]\d+[eE](\d+)").expect("valid episode pattern");
}

/// Extension and directory-name filters applied to every candidate path.
#[derive(Debug, Clone, Default)]
pub struct MediaFilter {
    extensions: Vec<String>,
    excluded_dirs: Vec<String>,
}

impl MediaFilter {
    pub fn new(extensions: &[String], excluded_dirs: &[String]) -> Self {
        Self {
            extensions: extensions
                .iter()
                .map(|e| e.trim().to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
            excluded_dirs: excluded_dirs
                .iter()
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty())
                .collect(),
        }
    }

    /// An empty extension list accepts every file.
    pub fn is_media_file(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        let name = file_name(path).to_lowercase();
        self.extensions.iter().any(|ext| name.ends_with(ext.as_str()))
    }

    pub fn is_excluded(&self, path: &Path) -> bool {
        path.components().any(|c| {
            let part = c.as_os_str().to_string_lossy();
            self.excluded_dirs.iter().any(|d| *d == part)
        })
    }

    pub fn accepts(&self, path: &Path) -> bool {
        !self.is_excluded(path) && self.is_media_file(path)
    }
}

/// Episode number encoded as `S<digits>E<digits>` in a file name.
pub fn parse_episode(name: &str) -> Option<u32> {
    EPISODE_RE
        .captures(name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

pub fn episode_of(path: &Path) -> Option<u32> {
    parse_episode(&file_name(path))
}

pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Plain files directly inside `dir`, sorted by name.
pub fn list_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    files.sort();
    Ok(files)
}

/// Episode files of a season directory, ordered by episode number.
pub fn list_episodes(dir: &Path) -> io::Result<Vec<(u32, PathBuf)>> {
    let mut episodes: Vec<(u32, PathBuf)> = list_files(dir)?
        .into_iter()
        .filter_map(|path| episode_of(&path).map(|ep| (ep, path)))
        .collect();
    episodes.sort();
    Ok(episodes)
}

/// Files sharing the movie's stem, e.g. `Movie.en.srt` next to `Movie.mkv`.
pub fn stem_siblings(path: &Path) -> io::Result<Vec<PathBuf>> {
    let (Some(dir), Some(stem)) = (path.parent(), path.file_stem()) else {
        return Ok(Vec::new());
    };
    let stem = stem.to_string_lossy();
    Ok(list_files(dir)?
        .into_iter()
        .filter(|p| p != path && file_name(p).starts_with(stem.as_ref()))
        .collect())
}
