// Jellyfin Presence
// Mirrors what a Jellyfin user is listening to as a Discord "Listening" status

mod artwork;
mod config;
mod jellyfin;
mod media_monitor;
mod presence;
mod text_cleanup;

use anyhow::Result;
use artwork::{ArtCache, ArtResolver, CatboxPublisher};
use clap::Parser;
use config::Config;
use jellyfin::JellyfinClient;
use media_monitor::Monitor;
use presence::DiscordPresence;
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use text_cleanup::TextCleaner;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Configuration file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Artwork cache file, overriding `cache_path` from the config
    #[arg(long)]
    cache: Option<PathBuf>,

    /// Poll once, update the presence, then exit
    #[arg(long)]
    once: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{:#}", e);
            process::exit(1);
        }
    };

    log::info!("Connecting to Discord RPC...");
    let sink = match DiscordPresence::connect(&config.discord.client_id, CONNECT_TIMEOUT) {
        Ok(sink) => sink,
        Err(e) => {
            eprintln!("\nFailed to connect to Discord: {:#}", e);
            eprintln!("Please check the following:");
            eprintln!("  1. Is the Discord desktop application running?");
            eprintln!("  2. Is discord.client_id in the config file correct?");
            eprintln!(
                "  3. Go to Discord Settings > Activity Privacy > \
                 'Share your activity status by default' and ensure it's enabled."
            );
            process::exit(1);
        }
    };
    log::info!("Discord RPC connected");

    let timeout = Duration::from_secs(config.request_timeout);
    let cache = ArtCache::load(&config.cache_path);
    let resolver = ArtResolver::new(
        cache,
        CatboxPublisher::new(&config.artwork.upload_url, timeout),
        config.jellyfin.base_url(),
        &config.artwork.placeholder,
    );

    let mut monitor = Monitor::new(
        JellyfinClient::new(&config.jellyfin, timeout),
        resolver,
        sink,
        TextCleaner::new(&config.cleanup),
        config.jellyfin.base_url(),
    );

    if args.once {
        let update = monitor.tick();
        log::info!("Single poll finished: {:?}", update);
        return;
    }

    monitor.run(Duration::from_secs(config.refresh_interval));
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    if let Some(cache) = &args.cache {
        config.cache_path = cache.clone();
    }

    Ok(config)
}
