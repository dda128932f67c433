use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::chat::UserRole;
use crate::sync::{SyncOptions, SyncStrategy};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  /// Identity of the signed-in user, as issued by the auth provider
  #[serde(default)]
  pub user: UserConfig,
  /// Remote relational store. Without it history stays on this device.
  pub store: Option<StoreConfig>,
  /// Outbound AI webhook. Without it every reply is a fallback.
  pub agent: Option<AgentConfig>,
  #[serde(default)]
  pub sync: SyncConfig,
  #[serde(default)]
  pub cache: CacheConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserConfig {
  pub id: Option<String>,
  pub name: Option<String>,
  pub email: Option<String>,
  #[serde(default)]
  pub role: UserRole,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
  /// Base url of the store, e.g. https://project.supabase.co
  pub url: String,
  #[serde(default = "default_table")]
  pub table: String,
  /// Stored procedure appending one message to a user's history
  #[serde(default = "default_append_function")]
  pub append_function: String,
}

fn default_table() -> String {
  "user_messages".to_string()
}

fn default_append_function() -> String {
  "add_message_to_user".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
  pub webhook_url: String,
  #[serde(default = "default_agent_timeout")]
  pub timeout_secs: u64,
  /// Value of the `source` field sent with every webhook call
  #[serde(default = "default_agent_source")]
  pub source: String,
}

fn default_agent_timeout() -> u64 {
  30
}

fn default_agent_source() -> String {
  "mentoria-extraordinarios-frontend".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
  /// Quiet period after the last new message before pushing
  #[serde(default = "default_debounce_ms")]
  pub debounce_ms: u64,
  #[serde(default)]
  pub strategy: SyncStrategy,
  /// Also merge the remote history when the local cache is not empty
  #[serde(default)]
  pub pull_on_start: bool,
}

fn default_debounce_ms() -> u64 {
  1000
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      debounce_ms: default_debounce_ms(),
      strategy: SyncStrategy::default(),
      pull_on_start: false,
    }
  }
}

impl SyncConfig {
  pub fn options(&self) -> SyncOptions {
    SyncOptions {
      debounce: Duration::from_millis(self.debounce_ms),
      strategy: self.strategy,
      pull_on_start: self.pull_on_start,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Database file (default: $XDG_DATA_HOME/mentor-chat/cache.db)
  pub path: Option<PathBuf>,
}

fn default_true() -> bool {
  true
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      path: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./mentor-chat.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/mentor-chat/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/mentor-chat/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("mentor-chat.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("mentor-chat").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))
  }

  /// Get the remote store API key from environment variables.
  ///
  /// Checks MENTOR_CHAT_STORE_KEY first, then SUPABASE_ANON_KEY as fallback.
  pub fn get_store_key() -> Result<String> {
    std::env::var("MENTOR_CHAT_STORE_KEY")
      .or_else(|_| std::env::var("SUPABASE_ANON_KEY"))
      .map_err(|_| {
        eyre!(
          "Store API key not found. Set MENTOR_CHAT_STORE_KEY or SUPABASE_ANON_KEY environment variable."
        )
      })
  }
}
