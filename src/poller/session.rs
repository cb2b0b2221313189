use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    Plex,
    Emby,
    Jellyfin,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Service::Plex => "plex",
            Service::Emby => "emby",
            Service::Jellyfin => "jellyfin",
        };
        f.write_str(name)
    }
}

/// One item currently playing on a media server, as that server reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionRecord {
    /// Path in the media server's own mount namespace.
    pub source_path: String,
    pub service: Service,
    pub item_id: String,
    pub user_id: Option<String>,
}
