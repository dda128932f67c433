//! Serde types matching the remote store's `user_messages` rows.
//!
//! These are kept apart from [`crate::chat::Message`] because the store names
//! the role column `type`, keeps timestamps as strings and may omit ids.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::chat::{Message, Role};

/// One entry of a row's `messages` array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteMessage {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,
  pub content: String,
  #[serde(rename = "type")]
  pub message_type: String,
  pub timestamp: String,
  #[serde(default)]
  pub metadata: Value,
}

impl RemoteMessage {
  /// Encode a local message for a batch pushed at `synced_at`.
  pub fn from_local(message: &Message, synced_at: DateTime<Utc>) -> Self {
    Self {
      id: Some(message.id.clone()),
      content: message.content.clone(),
      message_type: message.role.as_str().to_string(),
      timestamp: iso_millis(message.timestamp),
      metadata: json!({
        "synced": true,
        "syncedAt": iso_millis(synced_at),
      }),
    }
  }

  /// Decode into a local message. Remote entries are synced by definition.
  ///
  /// Returns `None` when the timestamp can't be parsed, since such an entry
  /// has no place in a timestamp-ordered list. Entries without an id get one
  /// derived from their contents, so decoding the same row twice yields the
  /// same id.
  pub fn into_local(self) -> Option<Message> {
    let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)
      .ok()?
      .with_timezone(&Utc);
    let id = match self.id.filter(|id| !id.is_empty()) {
      Some(id) => id,
      None => derived_id(timestamp, &self.message_type, &self.content),
    };

    Some(Message {
      id,
      role: Role::from_remote_type(&self.message_type),
      content: self.content,
      timestamp,
      synced: true,
    })
  }
}

/// Row shape returned by a `select=messages` read
#[derive(Debug, Deserialize)]
pub struct MessagesRecord {
  #[serde(default)]
  pub messages: Option<Vec<RemoteMessage>>,
}

/// Full row written by the batch upsert, keyed on `user_id`
#[derive(Debug, Serialize)]
pub struct UserMessagesRow<'a> {
  pub user_id: &'a str,
  pub messages: &'a [RemoteMessage],
  pub last_message_at: String,
  pub updated_at: String,
}

impl<'a> UserMessagesRow<'a> {
  pub fn new(user_id: &'a str, messages: &'a [RemoteMessage], now: DateTime<Utc>) -> Self {
    let now = iso_millis(now);
    Self {
      user_id,
      messages,
      last_message_at: now.clone(),
      updated_at: now,
    }
  }
}

/// Arguments of the store's single-message append procedure
#[derive(Debug, Serialize)]
pub struct AppendMessageArgs<'a> {
  pub p_user_id: &'a str,
  pub p_message_content: &'a str,
  pub p_message_type: &'a str,
  pub p_metadata: &'a Value,
}

/// `{epoch millis}-{12 hex chars of SHA256(type, content)}`
fn derived_id(timestamp: DateTime<Utc>, message_type: &str, content: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(message_type.as_bytes());
  hasher.update([0u8]);
  hasher.update(content.as_bytes());
  let digest = hex::encode(hasher.finalize());
  format!("{}-{}", timestamp.timestamp_millis(), &digest[..12])
}

/// ISO-8601 with millisecond precision and a `Z` suffix.
pub fn iso_millis(at: DateTime<Utc>) -> String {
  at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
