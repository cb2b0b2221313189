use reqwest::blocking::Client;
use serde::Deserialize;

use super::session::{SessionRecord, Service};
use super::{get_json, http_client, MediaServer};
use crate::error::Result;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EmbySession {
    user_id: Option<String>,
    now_playing_item: Option<EmbyItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EmbyItem {
    id: Option<String>,
    path: Option<String>,
    user_data: Option<EmbyUserData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EmbyUserData {
    #[serde(default)]
    played: bool,
}

/// Emby and Jellyfin share the same sessions API.
pub struct EmbyClient {
    service: Service,
    http: Client,
    base_url: String,
    api_key: String,
}

impl EmbyClient {
    pub fn new(service: Service, base_url: &str, api_key: &str) -> Result<Self> {
        Ok(Self {
            service,
            http: http_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }
}

impl MediaServer for EmbyClient {
    fn service(&self) -> Service {
        self.service
    }

    fn active_sessions(&self) -> Result<Vec<SessionRecord>> {
        let url = format!("{}/Sessions", self.base_url);
        let sessions: Vec<EmbySession> = get_json(&self.http, &url, "X-Emby-Token", &self.api_key)?;
        Ok(sessions
            .into_iter()
            .filter_map(|s| {
                let item = s.now_playing_item?;
                let path = item.path.filter(|p| !p.is_empty())?;
                Some(SessionRecord {
                    source_path: path,
                    service: self.service,
                    item_id: item.id.unwrap_or_default(),
                    user_id: s.user_id,
                })
            })
            .collect())
    }

    fn is_watched(&self, session: &SessionRecord) -> Result<bool> {
        let Some(user) = session.user_id.as_deref() else {
            return Ok(false);
        };
        let url = format!("{}/Users/{}/Items/{}", self.base_url, user, session.item_id);
        let item: EmbyItem = get_json(&self.http, &url, "X-Emby-Token", &self.api_key)?;
        Ok(item.user_data.map(|d| d.played).unwrap_or(false))
    }
}
