use std::path::{Path, PathBuf};

use crate::config::{AppConfig, PathMapping};
use crate::error::{Error, Result};

/// Maps paths between the bulk storage tier, the cache tier and the
/// mount namespaces media servers report paths in.
#[derive(Debug, Clone)]
pub struct PathTranslator {
    bulk_root: PathBuf,
    demote_root: PathBuf,
    cache_root: PathBuf,
    mappings: Vec<(PathBuf, PathBuf)>,
}

impl PathTranslator {
    pub fn new(bulk_root: &Path, cache_root: &Path) -> Self {
        Self {
            bulk_root: bulk_root.to_path_buf(),
            demote_root: bulk_root.to_path_buf(),
            cache_root: cache_root.to_path_buf(),
            mappings: Vec::new(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.bulk_root, &config.cache_root)
            .with_demote_root(config.demote_root())
            .with_mappings(&config.path_mappings)
    }

    pub fn with_demote_root(mut self, root: &Path) -> Self {
        self.demote_root = root.to_path_buf();
        self
    }

    /// Mappings are tried in order; the first matching container prefix wins.
    pub fn with_mappings(mut self, mappings: &[PathMapping]) -> Self {
        self.mappings = mappings
            .iter()
            .map(|m| {
                let container = PathBuf::from(normalize_separators(&m.container));
                let host = self.resolve_host_prefix(&normalize_separators(&m.host));
                (container, host)
            })
            .collect();
        self
    }

    pub fn bulk_root(&self) -> &Path {
        &self.bulk_root
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    /// Cache path -> its bulk storage counterpart.
    pub fn to_bulk(&self, cache_path: &Path) -> Result<PathBuf> {
        let rel = cache_path
            .strip_prefix(&self.cache_root)
            .map_err(|_| Error::NotUnderCacheRoot(cache_path.to_path_buf()))?;
        Ok(self.demote_root.join(rel))
    }

    /// Bulk path -> where it lives on the cache tier.
    pub fn to_cache(&self, bulk_path: &Path) -> Result<PathBuf> {
        let rel = bulk_path
            .strip_prefix(&self.bulk_root)
            .or_else(|_| bulk_path.strip_prefix(&self.demote_root))
            .map_err(|_| Error::NotUnderBulkRoot(bulk_path.to_path_buf()))?;
        Ok(self.cache_root.join(rel))
    }

    pub fn is_under_bulk(&self, path: &Path) -> bool {
        path.starts_with(&self.bulk_root)
    }

    /// Rewrite a path reported by a media server into a host path. Paths
    /// that match no mapping come back unchanged.
    pub fn translate_session_path(&self, raw: &str) -> PathBuf {
        let path = PathBuf::from(normalize_separators(raw));
        for (container, host) in &self.mappings {
            if let Ok(rel) = path.strip_prefix(container) {
                return host.join(rel);
            }
        }
        path
    }

    /// Cache-side directories that are mount targets and must survive pruning.
    pub fn protected_cache_dirs(&self) -> Vec<PathBuf> {
        self.mappings
            .iter()
            .filter_map(|(_, host)| self.to_cache(host).ok())
            .collect()
    }

    fn resolve_host_prefix(&self, host: &str) -> PathBuf {
        let host = PathBuf::from(host);
        if host.starts_with(&self.bulk_root) {
            host
        } else {
            let rel = host.strip_prefix("/").unwrap_or(&host);
            self.bulk_root.join(rel)
        }
    }
}

pub fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
}
