//! Local cache facade that never fails the caller.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tracing::{debug, warn};

use super::storage::{MessageStorage, NoopStorage};
use crate::chat::Message;

/// Durable per-user mirror of the message list.
///
/// Storage and serialization errors are logged and swallowed: a failed
/// `load` looks like an empty cache and a failed `save` leaves the in-memory
/// state authoritative until the next successful write.
pub struct LocalCache {
  storage: Arc<dyn MessageStorage>,
}

impl LocalCache {
  /// Create a new local cache with the given storage backend.
  pub fn new(storage: impl MessageStorage + 'static) -> Self {
    Self {
      storage: Arc::new(storage),
    }
  }

  /// Cache that remembers nothing, for session-only messaging.
  pub fn disabled() -> Self {
    Self::new(NoopStorage)
  }

  /// Storage key for a user's message list.
  pub fn storage_key(user_id: &str) -> String {
    format!("chat_messages_{}", user_id)
  }

  /// Load the stored message list for `user_id`, or an empty list.
  pub fn load(&self, user_id: &str) -> Vec<Message> {
    match self.try_load(user_id) {
      Ok(messages) => {
        debug!(user_id, count = messages.len(), "Loaded messages from local cache");
        messages
      }
      Err(e) => {
        warn!(user_id, error = %e, "Local cache unreadable, starting empty");
        Vec::new()
      }
    }
  }

  /// Overwrite the stored message list for `user_id`.
  pub fn save(&self, user_id: &str, messages: &[Message]) {
    match self.try_save(user_id, messages) {
      Ok(()) => debug!(user_id, count = messages.len(), "Saved messages to local cache"),
      Err(e) => warn!(user_id, error = %e, "Failed to save messages to local cache"),
    }
  }

  fn try_load(&self, user_id: &str) -> Result<Vec<Message>> {
    let key = Self::storage_key(user_id);
    match self.storage.read(&key)? {
      Some(data) => serde_json::from_str(&data)
        .map_err(|e| eyre!("Failed to deserialize cached messages: {}", e)),
      None => Ok(Vec::new()),
    }
  }

  fn try_save(&self, user_id: &str, messages: &[Message]) -> Result<()> {
    let data = serde_json::to_string(messages)
      .map_err(|e| eyre!("Failed to serialize messages: {}", e))?;
    self.storage.write(&Self::storage_key(user_id), &data)
  }
}

impl Clone for LocalCache {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
    }
  }
}
