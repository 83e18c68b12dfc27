//! moodfeed - follow a subject's live mood feed from the terminal

use clap::{Parser, Subcommand};
use moodfeed::adapter::{MoodUpdates, MoodView, StaticSession};
use moodfeed::config::FeedConfig;
use moodfeed::error::{FeedError, FeedResult};
use moodfeed::hub::SubscriptionHub;
use moodfeed::observability::init_default_logging;
use moodfeed::transport::WsConnector;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tokio::signal;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info, warn};

const DEFAULT_CONFIG_PATHS: &[&str] = &["moodfeed.toml", "config/moodfeed.toml"];

/// Self-healing real-time mood feed client
#[derive(Parser)]
#[command(name = "moodfeed")]
#[command(about = "Follow a live mood feed over a self-healing WebSocket")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and log every mood and status change until Ctrl-C
    Run {
        /// Subject id to follow (overrides the configuration)
        #[arg(short, long, env = "MOODFEED_SUBJECT_ID")]
        user: Option<String>,

        /// Host to connect to (overrides [endpoint].page_host)
        #[arg(long)]
        host: Option<String>,
    },
    /// Validate configuration
    Config {
        /// Print the effective configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    let config = match load_configuration(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run { user, host } => run_feed(config, user, host).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(if e.is_user_error() { 2 } else { 1 });
    }
}

fn load_configuration(path: Option<&Path>) -> FeedResult<FeedConfig> {
    if let Some(path) = path {
        info!("Loading configuration from: {}", path.display());
        return Ok(FeedConfig::load_from_file(path)?);
    }

    for candidate in DEFAULT_CONFIG_PATHS {
        let path = Path::new(candidate);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(FeedConfig::load_from_file(path)?);
        }
    }

    info!("No configuration file found, using defaults");
    let mut config = FeedConfig::for_host("localhost:8000", false);
    config.apply_env_overrides(|name| std::env::var(name).ok());
    config.validate()?;
    Ok(config)
}

async fn run_feed(
    mut config: FeedConfig,
    user: Option<String>,
    host: Option<String>,
) -> FeedResult<()> {
    if let Some(user) = user {
        config.session.subject_id = Some(user);
    }
    if let Some(host) = host {
        config.endpoint.api_origin = None;
        config.endpoint.page_host = host;
    }
    config.validate()?;

    let subject_id = config.session.subject_id.clone().ok_or_else(|| {
        FeedError::invalid_input("no subject id: pass --user or set [session].subject_id")
    })?;

    info!(
        "Starting moodfeed v{} for {}",
        env!("CARGO_PKG_VERSION"),
        subject_id
    );

    let hub = Arc::new(SubscriptionHub::new(
        Arc::new(WsConnector::new()),
        config.channel_config(),
    ));
    let updates = MoodUpdates::new(
        Arc::clone(&hub),
        Arc::new(StaticSession::signed_in(subject_id)),
        config.endpoint_config(),
        config.retry_delay(),
    );
    if let Some(identity) = updates.start()? {
        info!(channel = %identity, "Connecting");
    }

    let mut view = updates.watch();
    let mut health = interval(Duration::from_secs(60));
    health.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            result = signal::ctrl_c() => {
                result?;
                info!("Received Ctrl-C, shutting down");
                break;
            }
            changed = view.changed() => {
                if changed.is_err() {
                    warn!("Mood view closed");
                    break;
                }
                let snapshot = view.borrow_and_update().clone();
                log_view(&snapshot);
            }
            _ = health.tick() => {
                if let Some(channel) = hub.current() {
                    let metrics = channel.health();
                    info!(
                        state = %channel.state(),
                        healthy = metrics.is_healthy,
                        uptime = ?metrics.uptime,
                        since_last_pong = ?metrics.time_since_last_pong,
                        reconnect_attempts = metrics.reconnect_attempts,
                        "Channel health"
                    );
                }
            }
        }
    }

    drop(updates);
    hub.close();
    info!("Shutdown complete");
    Ok(())
}

fn log_view(view: &MoodView) {
    match (&view.mood, &view.error) {
        (_, Some(error)) => warn!(state = %view.state, live = view.is_live, "{}", error),
        (Some(mood), None) => info!(
            state = %view.state,
            live = view.is_live,
            mood = %mood.mood,
            emoji = mood.emoji.as_deref().unwrap_or(""),
            confidence = mood.confidence.unwrap_or_default(),
            track = mood.track.as_ref().map(|t| t.name.as_str()).unwrap_or(""),
            "Mood"
        ),
        (None, None) => info!(state = %view.state, live = view.is_live, "Waiting for mood"),
    }
}

fn handle_config_command(config: &FeedConfig, show: bool) -> FeedResult<()> {
    config.validate()?;
    if show {
        println!("{}", toml::to_string_pretty(config)?);
    }
    info!("Configuration validation complete");
    Ok(())
}
