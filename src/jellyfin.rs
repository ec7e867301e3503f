// Jellyfin session polling
// Finds the track the configured user is currently listening to

use crate::config::JellyfinConfig;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::io;
use std::time::Duration;

/// What a user is playing right now, as reported by the media server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackSnapshot {
    pub id: String,
    pub name: String,
    pub artists: Vec<String>,
    pub album: Option<String>,
    pub album_id: Option<String>,
    /// Playback position in 100ns ticks
    pub position_ticks: i64,
}

impl TrackSnapshot {
    pub fn position_millis(&self) -> i64 {
        self.position_ticks / 10_000
    }
}

/// Source of "now playing" information for one tick
pub trait SessionProvider {
    /// `None` when nothing is playing or the server could not be asked
    fn now_playing(&self) -> Option<TrackSnapshot>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Session {
    user_id: Option<String>,
    now_playing_item: Option<NowPlayingItem>,
    play_state: Option<PlayState>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NowPlayingItem {
    id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    artists: Vec<String>,
    album: Option<String>,
    album_id: Option<String>,
    #[serde(rename = "Type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PlayState {
    position_ticks: Option<i64>,
}

/// Jellyfin sends `null` for unset fields as often as it omits them
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

pub struct JellyfinClient {
    base_url: String,
    api_key: String,
    user_id: String,
    timeout: Duration,
}

impl JellyfinClient {
    pub fn new(config: &JellyfinConfig, timeout: Duration) -> Self {
        Self {
            base_url: config.base_url().to_string(),
            api_key: config.api_key.clone(),
            user_id: config.user_id.clone(),
            timeout,
        }
    }

    /// Raw session objects; each one is decoded on its own in `select_track`
    fn fetch_sessions(&self) -> attohttpc::Result<Vec<Value>> {
        attohttpc::get(format!("{}/Sessions", self.base_url))
            .header("X-Emby-Token", self.api_key.as_str())
            .timeout(self.timeout)
            .send()?
            .error_for_status()?
            .json()
    }
}

impl SessionProvider for JellyfinClient {
    fn now_playing(&self) -> Option<TrackSnapshot> {
        match self.fetch_sessions() {
            Ok(sessions) => select_track(sessions, &self.user_id),
            Err(e) => {
                if !is_connection_refused(&e) {
                    log::error!("Error fetching Jellyfin sessions: {}", e);
                }
                None
            }
        }
    }
}

/// Server offline is the normal state when nobody is listening
fn is_connection_refused(error: &attohttpc::Error) -> bool {
    match error.kind() {
        attohttpc::ErrorKind::Io(e) => e.kind() == io::ErrorKind::ConnectionRefused,
        _ => false,
    }
}

/// First audio session belonging to `user_id`
///
/// Sessions that do not decode are skipped, so one odd client cannot hide
/// the track playing on another.
fn select_track(sessions: Vec<Value>, user_id: &str) -> Option<TrackSnapshot> {
    sessions.into_iter().find_map(|raw| {
        let session = match serde_json::from_value::<Session>(raw) {
            Ok(session) => session,
            Err(e) => {
                log::debug!("Skipping undecodable Jellyfin session: {}", e);
                return None;
            }
        };
        if session.user_id.as_deref() != Some(user_id) {
            return None;
        }
        let item = session.now_playing_item?;
        if item.kind.as_deref() != Some("Audio") {
            return None;
        }

        Some(TrackSnapshot {
            id: item.id,
            name: item.name,
            artists: item.artists,
            album: item.album,
            album_id: item.album_id,
            position_ticks: session
                .play_state
                .and_then(|state| state.position_ticks)
                .unwrap_or(0),
        })
    })
}
