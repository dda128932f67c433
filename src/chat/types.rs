use chrono::{DateTime, SubsecRound, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Who authored a chat turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  User,
  Assistant,
  System,
}

impl Role {
  pub fn as_str(&self) -> &'static str {
    match self {
      Role::User => "user",
      Role::Assistant => "assistant",
      Role::System => "system",
    }
  }

  /// Map the remote store's `type` column onto a role.
  /// Anything unrecognised is treated as an assistant turn.
  pub fn from_remote_type(value: &str) -> Self {
    match value {
      "user" => Role::User,
      "system" => Role::System,
      _ => Role::Assistant,
    }
  }
}

/// One chat turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
  pub id: String,
  pub role: Role,
  pub content: String,
  /// Sole ordering key, stored as an ISO-8601 string
  pub timestamp: DateTime<Utc>,
  /// Set once the remote store acknowledged a batch carrying this message
  #[serde(default, skip_serializing_if = "std::ops::Not::not")]
  pub synced: bool,
}

impl Message {
  /// Build a fresh, unsynced message stamped with `timestamp`.
  pub fn new(role: Role, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
    Self {
      id: new_message_id(timestamp),
      role,
      content: content.into(),
      timestamp,
      synced: false,
    }
  }
}

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_SUFFIX_LEN: usize = 9;

/// Generate a message id: epoch milliseconds followed by a random base-36 suffix,
/// so ids minted within the same millisecond still differ.
pub fn new_message_id(at: DateTime<Utc>) -> String {
  let mut rng = rand::thread_rng();
  let suffix: String = (0..ID_SUFFIX_LEN)
    .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
    .collect();
  format!("{}{}", at.timestamp_millis(), suffix)
}

/// Current time at the millisecond precision the stores keep.
pub fn now_millis() -> DateTime<Utc> {
  Utc::now().trunc_subsecs(3)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
  Admin,
  #[default]
  Normal,
}

impl UserRole {
  pub fn as_str(&self) -> &'static str {
    match self {
      UserRole::Admin => "admin",
      UserRole::Normal => "normal",
    }
  }
}

/// Identity issued by the authentication provider for the active session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
  pub id: String,
  pub name: String,
  pub email: String,
  pub role: UserRole,
}

impl UserProfile {
  /// Name to address the user by in generated replies.
  pub fn display_name(&self) -> &str {
    let name = self.name.trim();
    if name.is_empty() {
      "there"
    } else {
      name
    }
  }
}
