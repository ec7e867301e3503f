// Media monitoring module
// Polls Jellyfin for now playing information and mirrors it to the presence sink

use crate::artwork::{ArtResolver, ImagePublisher};
use crate::jellyfin::{SessionProvider, TrackSnapshot};
use crate::presence::{self, ListeningActivity, PresenceSink};
use crate::text_cleanup::TextCleaner;
use chrono::Utc;
use std::thread;
use std::time::Duration;

/// Outcome of comparing a poll result with the previous one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceUpdate {
    Playing { changed: bool },
    Stopped,
    Idle,
}

/// Remembers the last track so that stops are reported once per edge
#[derive(Debug, Default)]
pub struct PresenceTracker {
    last_track_id: Option<String>,
}

impl PresenceTracker {
    pub fn observe(&mut self, track: Option<&TrackSnapshot>) -> PresenceUpdate {
        match track {
            Some(track) => {
                let changed = self.last_track_id.as_deref() != Some(track.id.as_str());
                if changed {
                    self.last_track_id = Some(track.id.clone());
                }
                PresenceUpdate::Playing { changed }
            }
            None => match self.last_track_id.take() {
                Some(_) => PresenceUpdate::Stopped,
                None => PresenceUpdate::Idle,
            },
        }
    }
}

/// Drives one session provider, artwork resolver and presence sink
pub struct Monitor<S, P, K> {
    sessions: S,
    artwork: ArtResolver<P>,
    sink: K,
    text_cleaner: TextCleaner,
    server_url: String,
    tracker: PresenceTracker,
    /// Set after the first sink failure; the sink is not retried until restart
    sink_lost: bool,
}

impl<S, P, K> Monitor<S, P, K>
where
    S: SessionProvider,
    P: ImagePublisher,
    K: PresenceSink,
{
    pub fn new(
        sessions: S,
        artwork: ArtResolver<P>,
        sink: K,
        text_cleaner: TextCleaner,
        server_url: &str,
    ) -> Self {
        Self {
            sessions,
            artwork,
            sink,
            text_cleaner,
            server_url: server_url.trim_end_matches('/').to_string(),
            tracker: PresenceTracker::default(),
            sink_lost: false,
        }
    }

    #[cfg(test)]
    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// One poll: session fetch, artwork resolution, presence update
    pub fn tick(&mut self) -> PresenceUpdate {
        let track = self.sessions.now_playing();
        let update = self.tracker.observe(track.as_ref());

        match (update, track) {
            (PresenceUpdate::Playing { changed }, Some(track)) => {
                if changed {
                    log::info!(
                        "Now listening to: {} - {}",
                        track.artists.join(", "),
                        track.name
                    );
                }

                let art = self
                    .artwork
                    .resolve(track.album_id.as_deref(), Some(track.id.as_str()));
                let activity = self.build_activity(&track, art, Utc::now().timestamp_millis());

                if !self.sink_lost {
                    let result = self.sink.set_activity(&activity);
                    self.check_sink(result);
                }
            }
            (PresenceUpdate::Stopped, _) => {
                log::info!("Playback stopped. Clearing presence.");
                if !self.sink_lost {
                    let result = self.sink.clear_activity();
                    self.check_sink(result);
                }
            }
            _ => {}
        }

        update
    }

    fn check_sink(&mut self, result: anyhow::Result<()>) {
        if let Err(e) = result {
            log::warn!(
                "Presence connection lost ({:#}). Will try to reconnect if the app is restarted.",
                e
            );
            self.sink_lost = true;
        }
    }

    /// Poll forever; each tick finishes before the next one is scheduled
    pub fn run(&mut self, interval: Duration) -> ! {
        log::info!("Monitoring Jellyfin for listening activity...");
        loop {
            self.tick();
            thread::sleep(interval);
        }
    }

    fn build_activity(
        &self,
        track: &TrackSnapshot,
        art: String,
        now_millis: i64,
    ) -> ListeningActivity {
        let artists = self.text_cleaner.clean_all(&track.artists);

        ListeningActivity {
            details: self.text_cleaner.clean(&track.name),
            state: format!("by {}", artists.join(", ")),
            large_image: art,
            large_text: self
                .text_cleaner
                .clean_option(track.album.as_deref())
                .map(|album| format!("on {}", album)),
            small_image: presence::SMALL_IMAGE_KEY.to_string(),
            small_text: presence::SMALL_IMAGE_TEXT.to_string(),
            start_timestamp: now_millis - track.position_millis(),
            button_label: presence::BUTTON_LABEL.to_string(),
            button_url: format!(
                "{}/web/index.html#!/details?id={}",
                self.server_url, track.id
            ),
        }
    }
}
