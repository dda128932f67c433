mod agent;
mod app;
mod cache;
mod chat;
mod commands;
mod config;
mod event;
mod remote;
mod sync;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use agent::{Agent, OfflineAgent, WebhookAgent};
use cache::{LocalCache, SqliteStorage};
use chat::{ChatService, UserProfile};
use remote::{OfflineStore, RemoteStore, RestStore};
use sync::SyncEngine;

#[derive(Parser, Debug)]
#[command(name = "mentor-chat")]
#[command(about = "Chat with your mentor from the terminal, with history kept in sync")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/mentor-chat/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Signed-in user id (overrides config)
  #[arg(short, long)]
  user_id: Option<String>,

  /// Display name (overrides config)
  #[arg(short, long)]
  name: Option<String>,

  /// Email (overrides config)
  #[arg(short, long)]
  email: Option<String>,

  /// Keep everything on this device: no remote store, no agent webhook
  #[arg(long)]
  offline: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = init_logging()?;

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  // Command line overrides the configured identity
  let user = UserProfile {
    id: args
      .user_id
      .or(config.user.id.clone())
      .ok_or_else(|| eyre!("No user id. Set user.id in the config or pass --user-id."))?,
    name: args.name.or(config.user.name.clone()).unwrap_or_default(),
    email: args.email.or(config.user.email.clone()).unwrap_or_default(),
    role: config.user.role,
  };

  let cache = open_cache(&config.cache);
  let remote = open_remote(&config, args.offline)?;
  let agent = open_agent(&config, args.offline)?;

  info!(user_id = %user.id, offline = args.offline, "Starting session");
  let engine = SyncEngine::start(user.id.clone(), cache, remote, config.sync.options()).await?;

  let chat = ChatService::new(engine, agent, user);
  chat.greet_if_empty();

  let mut app = app::App::new(chat);
  app.run().await?;

  Ok(())
}

/// Log to a file under the data directory so output never mixes with the chat.
fn init_logging() -> Result<WorkerGuard> {
  let log_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?
    .join("mentor-chat");
  std::fs::create_dir_all(&log_dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", log_dir.display(), e))?;

  let appender = tracing_appender::rolling::never(&log_dir, "mentor-chat.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_env("MENTOR_CHAT_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
    )
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}

/// Open the local cache, degrading to session-only storage if that fails.
fn open_cache(config: &config::CacheConfig) -> LocalCache {
  if !config.enabled {
    info!("Local cache disabled, history lives in memory only");
    return LocalCache::disabled();
  }

  let storage = config
    .path
    .clone()
    .map(Ok)
    .unwrap_or_else(SqliteStorage::default_path)
    .and_then(|path| SqliteStorage::open(&path));

  match storage {
    Ok(storage) => LocalCache::new(storage),
    Err(e) => {
      warn!(error = %e, "Local cache unavailable, history lives in memory only");
      LocalCache::disabled()
    }
  }
}

fn open_remote(config: &config::Config, offline: bool) -> Result<Arc<dyn RemoteStore>> {
  match (&config.store, offline) {
    (Some(store), false) => {
      let key = config::Config::get_store_key()?;
      Ok(Arc::new(RestStore::new(store, &key)?))
    }
    _ => {
      info!("No remote store, history stays on this device");
      Ok(Arc::new(OfflineStore))
    }
  }
}

fn open_agent(config: &config::Config, offline: bool) -> Result<Arc<dyn Agent>> {
  match (&config.agent, offline) {
    (Some(agent), false) => Ok(Arc::new(WebhookAgent::new(agent)?)),
    _ => {
      info!("No agent webhook, replies will be fallbacks");
      Ok(Arc::new(OfflineAgent))
    }
  }
}
