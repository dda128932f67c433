//! Remote relational store holding the authoritative message history.

mod client;
mod types;

pub use client::RestStore;
pub use types::{iso_millis, RemoteMessage};

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};

/// Operations the sync engine needs from the remote store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
  /// Fetch the user's message array. `None` when the user has no row yet.
  async fn fetch_messages(&self, user_id: &str) -> Result<Option<Vec<RemoteMessage>>>;

  /// Overwrite the user's row with the full message array.
  async fn upsert_messages(&self, user_id: &str, messages: &[RemoteMessage]) -> Result<()>;

  /// Append one message through the store's atomic append procedure.
  async fn append_message(&self, user_id: &str, message: &RemoteMessage) -> Result<()>;
}

/// Store used when running offline: every call fails, so history stays local.
pub struct OfflineStore;

#[async_trait]
impl RemoteStore for OfflineStore {
  async fn fetch_messages(&self, _user_id: &str) -> Result<Option<Vec<RemoteMessage>>> {
    Err(eyre!("Remote store is disabled (offline mode)"))
  }

  async fn upsert_messages(&self, _user_id: &str, _messages: &[RemoteMessage]) -> Result<()> {
    Err(eyre!("Remote store is disabled (offline mode)"))
  }

  async fn append_message(&self, _user_id: &str, _message: &RemoteMessage) -> Result<()> {
    Err(eyre!("Remote store is disabled (offline mode)"))
  }
}
