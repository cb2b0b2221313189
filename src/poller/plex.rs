use reqwest::blocking::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, trace};

use super::session::{SessionRecord, Service};
use super::{get_json, http_client, MediaServer};
use crate::error::Result;

/// Rating key -> file path. A rating key's file never changes, so entries
/// live for the whole process.
pub type PlexPathCache = Arc<Mutex<HashMap<String, String>>>;

#[derive(Debug, Deserialize)]
struct PlexResponse {
    #[serde(rename = "MediaContainer")]
    media_container: Option<PlexContainer>,
}

#[derive(Debug, Default, Deserialize)]
struct PlexContainer {
    #[serde(rename = "Metadata", default)]
    metadata: Vec<PlexItem>,
}

#[derive(Debug, Deserialize)]
struct PlexItem {
    #[serde(rename = "ratingKey")]
    rating_key: Option<String>,
    #[serde(rename = "viewCount", default)]
    view_count: u64,
    #[serde(rename = "Media", default)]
    media: Vec<PlexMedia>,
}

#[derive(Debug, Deserialize)]
struct PlexMedia {
    #[serde(rename = "Part", default)]
    parts: Vec<PlexPart>,
}

#[derive(Debug, Deserialize)]
struct PlexPart {
    file: Option<String>,
}

impl PlexItem {
    fn first_file(&self) -> Option<String> {
        self.media
            .iter()
            .flat_map(|m| m.parts.iter())
            .find_map(|p| p.file.clone().filter(|f| !f.is_empty()))
    }
}

pub struct PlexClient {
    http: Client,
    base_url: String,
    token: String,
    paths: PlexPathCache,
}

impl PlexClient {
    pub fn new(base_url: &str, token: &str, paths: PlexPathCache) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            paths,
        })
    }

    fn get(&self, endpoint: &str) -> Result<PlexContainer> {
        let url = format!("{}{}", self.base_url, endpoint);
        let response: PlexResponse = get_json(&self.http, &url, "X-Plex-Token", &self.token)?;
        Ok(response.media_container.unwrap_or_default())
    }

    fn metadata(&self, rating_key: &str) -> Result<Option<PlexItem>> {
        let container = self.get(&format!("/library/metadata/{}", rating_key))?;
        Ok(container.metadata.into_iter().next())
    }

    fn cached_path(&self, rating_key: &str) -> Option<String> {
        self.paths.lock().ok()?.get(rating_key).cloned()
    }

    fn remember_path(&self, rating_key: &str, path: &str) {
        if let Ok(mut paths) = self.paths.lock() {
            paths.insert(rating_key.to_string(), path.to_string());
        }
    }

    /// Cached path first, then the session's own media parts, then a
    /// metadata lookup.
    fn resolve_path(&self, item: &PlexItem) -> Option<String> {
        let rating_key = item.rating_key.as_deref();
        if let Some(path) = rating_key.and_then(|rk| self.cached_path(rk)) {
            trace!("Plex path for {:?} from cache", rating_key);
            return Some(path);
        }

        let path = item.first_file().or_else(|| {
            let rk = rating_key?;
            debug!("Looking up Plex metadata for rating key {}", rk);
            match self.metadata(rk) {
                Ok(meta) => meta.and_then(|m| m.first_file()),
                Err(e) => {
                    debug!("Plex metadata lookup for {} failed: {}", rk, e);
                    None
                }
            }
        })?;

        if let Some(rk) = rating_key {
            self.remember_path(rk, &path);
        }
        Some(path)
    }
}

impl MediaServer for PlexClient {
    fn service(&self) -> Service {
        Service::Plex
    }

    fn active_sessions(&self) -> Result<Vec<SessionRecord>> {
        let container = self.get("/status/sessions")?;
        Ok(container
            .metadata
            .iter()
            .filter_map(|item| {
                let path = self.resolve_path(item)?;
                Some(SessionRecord {
                    source_path: path,
                    service: Service::Plex,
                    item_id: item.rating_key.clone().unwrap_or_default(),
                    user_id: None,
                })
            })
            .collect())
    }

    fn is_watched(&self, session: &SessionRecord) -> Result<bool> {
        Ok(self
            .metadata(&session.item_id)?
            .map(|item| item.view_count > 0)
            .unwrap_or(false))
    }
}
