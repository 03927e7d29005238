// mshuffle - drive a shuffle session from the terminal
// Loads a playlist dump, then walks it with next/skip/enjoy/dislike and prints the odds

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use mshuffle::{Config, Credential, Distribution, MusicApi, OfflineMusicApi, Playlist, ShuffleEngine};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mshuffle")]
#[command(about = "Smart shuffle that learns what you enjoy and keeps recent tracks from repeating")]
struct Args {
    /// Playlist as JSON (id, name, owner, tracks)
    #[arg(long)]
    playlist: PathBuf,

    /// Access token for the music catalog
    #[arg(long, default_value = "local")]
    token: String,

    /// Steps to run when no actions are given
    #[arg(long, default_value_t = 10)]
    steps: usize,

    /// Overrides rng_seed from the config file
    #[arg(long)]
    seed: Option<u64>,

    /// Print the full distribution after every action
    #[arg(long)]
    show_odds: bool,

    /// Enable developer logging (stderr + debug output)
    #[arg(long)]
    dev: bool,

    /// Actions to run in order, e.g. `next next enjoy next dislike`
    #[arg(value_enum)]
    actions: Vec<Action>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Action {
    Next,
    Skip,
    Enjoy,
    Dislike,
}

fn init_logging(config: &Config, dev: bool) -> Result<()> {
    let base_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));

    if dev {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_env_filter(base_filter)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
        eprintln!("Dev mode: logging to stderr");
        return Ok(());
    }

    fs::create_dir_all(&config.logging.directory)?;

    // Daily rotating file appender
    let file_appender = tracing_appender::rolling::daily(&config.logging.directory, "mshuffle.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let subscriber = tracing_subscriber::fmt()
        .with_writer(file_writer)
        .with_target(true)
        .with_level(true)
        .with_ansi(false)
        .with_env_filter(base_filter)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    // Keep the writer alive for the whole process
    std::mem::forget(guard);

    Ok(())
}

#[cfg(feature = "spotify")]
fn music_api(config: &Config) -> Result<Arc<dyn MusicApi>> {
    let client = mshuffle::spotify::SpotifyClient::new(&config.spotify)?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "spotify"))]
fn music_api(_config: &Config) -> Result<Arc<dyn MusicApi>> {
    warn!("Built without the spotify feature, similar artists are unavailable");
    Ok(Arc::new(OfflineMusicApi))
}

fn print_odds(distribution: &Distribution) {
    let mut entries: Vec<_> = distribution.data.iter().collect();
    entries.sort_by(|a, b| b.value.total_cmp(&a.value));
    for entry in entries {
        println!("    {:>7.3}%  {}", entry.value * 100.0, entry.label);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load()?;
    if args.seed.is_some() {
        config.rng_seed = args.seed;
    }
    init_logging(&config, args.dev)?;

    info!("mshuffle starting up");

    let content = fs::read_to_string(&args.playlist)
        .with_context(|| format!("Could not read playlist {}", args.playlist.display()))?;
    let playlist: Playlist = serde_json::from_str(&content)
        .with_context(|| format!("Invalid playlist JSON in {}", args.playlist.display()))?;

    // Fallback keeps the offline build usable
    let api = music_api(&config).unwrap_or_else(|e| {
        warn!("Music catalog unavailable, continuing offline: {}", e);
        Arc::new(OfflineMusicApi)
    });
    let engine = ShuffleEngine::from_config(&config, api);
    let credential = Credential::new(args.token);

    println!("Shuffling '{}' ({} tracks)", playlist.name, playlist.len());
    engine.create_session(&credential, playlist);

    let actions = if args.actions.is_empty() {
        vec![Action::Next; args.steps]
    } else {
        args.actions
    };

    for action in actions {
        match action {
            Action::Next | Action::Skip => {
                let track = if action == Action::Skip {
                    engine.skip(&credential).await?
                } else {
                    engine.next(&credential).await?
                };
                match track {
                    Some(track) if track.is_playable() => println!("> {}", track.display_label()),
                    Some(track) => println!("> {} (no playable media)", track.display_label()),
                    None => println!("> nothing left to play"),
                }
                if args.show_odds {
                    if let Some(distribution) = engine.distribution(&credential).await {
                        print_odds(&distribution);
                    }
                }
            }
            Action::Enjoy | Action::Dislike => {
                let result = if action == Action::Enjoy {
                    engine.enjoy(&credential).await
                } else {
                    engine.dislike(&credential).await
                };
                match result {
                    Ok(distribution) => {
                        println!("  {:?} recorded", action);
                        if args.show_odds {
                            print_odds(&distribution);
                        }
                    }
                    Err(e) => println!("  {:?} ignored: {}", action, e),
                }
            }
        }
    }

    engine.delete_session(&credential);
    info!("mshuffle done");

    Ok(())
}
