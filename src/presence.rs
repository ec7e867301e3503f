// Presence sink
// Publishes a "Listening to" status through the Discord IPC client

use anyhow::{anyhow, Context, Result};
use discord_rich_presence::activity::{Activity, ActivityType, Assets, Button, Timestamps};
use discord_rich_presence::{DiscordIpc, DiscordIpcClient};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

pub const SMALL_IMAGE_KEY: &str = "jellyfin_logo";
pub const SMALL_IMAGE_TEXT: &str = "Jellyfin";
pub const BUTTON_LABEL: &str = "Listen on Jellyfin";

/// Everything shown for one listening status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListeningActivity {
    pub details: String,
    pub state: String,
    pub large_image: String,
    pub large_text: Option<String>,
    pub small_image: String,
    pub small_text: String,
    /// Unix time in milliseconds at which the track (virtually) started
    pub start_timestamp: i64,
    pub button_label: String,
    pub button_url: String,
}

/// Where listening status ends up
pub trait PresenceSink {
    fn set_activity(&mut self, activity: &ListeningActivity) -> Result<()>;

    fn clear_activity(&mut self) -> Result<()>;
}

pub struct DiscordPresence {
    client: DiscordIpcClient,
}

impl DiscordPresence {
    /// Connect to the local Discord client, giving up after `timeout`
    pub fn connect(client_id: &str, timeout: Duration) -> Result<Self> {
        let client_id = client_id.to_string();
        let (tx, rx) = mpsc::channel();

        // The IPC handshake blocks with no deadline of its own
        thread::spawn(move || {
            let result = DiscordIpcClient::new(&client_id)
                .and_then(|mut client| client.connect().map(|_| client))
                .map_err(|e| e.to_string());
            let _ = tx.send(result);
        });

        let client = match rx.recv_timeout(timeout) {
            Ok(result) => result.map_err(|e| anyhow!(e)).context("Discord IPC handshake failed")?,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                anyhow::bail!("Connection timed out after {} seconds.", timeout.as_secs())
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                anyhow::bail!("Discord connection thread exited unexpectedly")
            }
        };

        Ok(Self { client })
    }
}

impl PresenceSink for DiscordPresence {
    fn set_activity(&mut self, activity: &ListeningActivity) -> Result<()> {
        let mut assets = Assets::new()
            .large_image(&activity.large_image)
            .small_image(&activity.small_image)
            .small_text(&activity.small_text);
        if let Some(text) = &activity.large_text {
            assets = assets.large_text(text);
        }

        let payload = Activity::new()
            .details(&activity.details)
            .state(&activity.state)
            .assets(assets)
            .timestamps(Timestamps::new().start(activity.start_timestamp))
            .buttons(vec![Button::new(&activity.button_label, &activity.button_url)])
            .activity_type(ActivityType::Listening);

        self.client
            .set_activity(payload)
            .map_err(|e| anyhow!(e.to_string()))
            .context("Discord RPC disconnected while setting activity")
    }

    fn clear_activity(&mut self) -> Result<()> {
        self.client
            .clear_activity()
            .map_err(|e| anyhow!(e.to_string()))
            .context("Discord RPC disconnected while clearing activity")
    }
}

impl Drop for DiscordPresence {
    fn drop(&mut self) {
        let _ = self.client.close();
    }
}
