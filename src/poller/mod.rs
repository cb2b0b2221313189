pub mod emby;
pub mod plex;
pub mod session;

use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};

pub use emby::EmbyClient;
pub use plex::{PlexClient, PlexPathCache};
pub use session::{Service, SessionRecord};

use crate::config::AppConfig;
use crate::error::Result;

const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// One media server's session API.
pub trait MediaServer {
    fn service(&self) -> Service;
    fn active_sessions(&self) -> Result<Vec<SessionRecord>>;
    fn is_watched(&self, session: &SessionRecord) -> Result<bool>;
}

/// What the lifecycle engine needs from the outside world each cycle.
/// Failures are absorbed here: an unreachable server contributes no
/// sessions and nothing it served counts as watched.
pub trait SessionSource {
    fn active_sessions(&mut self) -> Vec<SessionRecord>;
    fn is_watched(&self, session: &SessionRecord) -> bool;
}

pub struct SessionPoller {
    servers: Vec<Box<dyn MediaServer>>,
    plex_paths: PlexPathCache,
}

impl SessionPoller {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let mut poller = Self::with_servers(Vec::new());
        poller.reconfigure(config)?;
        Ok(poller)
    }

    pub fn with_servers(servers: Vec<Box<dyn MediaServer>>) -> Self {
        Self {
            servers,
            plex_paths: PlexPathCache::default(),
        }
    }

    /// Rebuild the server list for a new configuration. Resolved Plex
    /// paths carry over.
    pub fn reconfigure(&mut self, config: &AppConfig) -> Result<()> {
        let mut servers: Vec<Box<dyn MediaServer>> = Vec::new();
        if config.plex.enabled {
            servers.push(Box::new(PlexClient::new(
                &config.plex.url,
                &config.plex.token,
                self.plex_paths.clone(),
            )?));
        }
        if config.emby.enabled {
            servers.push(Box::new(EmbyClient::new(
                Service::Emby,
                &config.emby.url,
                &config.emby.token,
            )?));
        }
        if config.jellyfin.enabled {
            servers.push(Box::new(EmbyClient::new(
                Service::Jellyfin,
                &config.jellyfin.url,
                &config.jellyfin.token,
            )?));
        }
        if servers.is_empty() {
            warn!("No media servers enabled; nothing will be cached");
        }
        self.servers = servers;
        Ok(())
    }

    pub fn server_count(&self) -> usize {
        self.servers.len()
    }
}

impl SessionSource for SessionPoller {
    fn active_sessions(&mut self) -> Vec<SessionRecord> {
        let mut seen = HashSet::new();
        let mut sessions = Vec::new();
        for server in &self.servers {
            match server.active_sessions() {
                Ok(found) => {
                    debug!("{} reports {} active sessions", server.service(), found.len());
                    for session in found {
                        if seen.insert(session.source_path.clone()) {
                            sessions.push(session);
                        }
                    }
                }
                Err(e) => warn!("Could not list {} sessions: {}", server.service(), e),
            }
        }
        sessions
    }

    fn is_watched(&self, session: &SessionRecord) -> bool {
        let Some(server) = self.servers.iter().find(|s| s.service() == session.service) else {
            return false;
        };
        match server.is_watched(session) {
            Ok(watched) => watched,
            Err(e) => {
                warn!(
                    "Could not read watched state of {} from {}: {}",
                    session.item_id, session.service, e
                );
                false
            }
        }
    }
}

pub(crate) fn http_client() -> Result<Client> {
    Ok(Client::builder()
        .timeout(HTTP_TIMEOUT)
        .danger_accept_invalid_certs(true)
        .build()?)
}

pub(crate) fn get_json<T: DeserializeOwned>(
    client: &Client,
    url: &str,
    token_header: &str,
    token: &str,
) -> Result<T> {
    let response = client
        .get(url)
        .header(token_header, token)
        .header(ACCEPT, "application/json")
        .send()?
        .error_for_status()?;
    Ok(response.json()?)
}
