//! The send → reply flow on top of a sync session.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tracing::{info, warn};

use super::types::{Message, Role, UserProfile};
use crate::agent::{fallback_reply, Agent};
use crate::sync::SyncEngine;

/// Assistant turn produced for one user message
#[derive(Debug, Clone)]
pub struct Reply {
  pub message: Message,
  /// The agent was unreachable and a canned reply was used
  pub fallback: bool,
}

/// Chat session for one signed-in user.
pub struct ChatService {
  engine: SyncEngine,
  agent: Arc<dyn Agent>,
  user: UserProfile,
}

impl ChatService {
  pub fn new(engine: SyncEngine, agent: Arc<dyn Agent>, user: UserProfile) -> Self {
    Self {
      engine,
      agent,
      user,
    }
  }

  pub fn engine(&self) -> &SyncEngine {
    &self.engine
  }

  pub fn user(&self) -> &UserProfile {
    &self.user
  }

  /// Greet a user whose history is empty. Returns the greeting if one was added.
  pub fn greet_if_empty(&self) -> Option<Message> {
    if !self.engine.messages().is_empty() {
      return None;
    }
    let greeting = format!(
      "Hello {}! Welcome to Mentoria Extraordinários. How can I help you today?",
      self.user.display_name()
    );
    Some(self.engine.add_message(Role::Assistant, greeting))
  }

  /// Record the user's message, ask the agent, and record its reply.
  ///
  /// Blank input or a missing user id is rejected before anything is stored.
  /// Agent failures are not errors: a fallback reply is stored instead so the
  /// history stays consistent with what the user saw.
  pub async fn send(&self, text: &str) -> Result<Reply> {
    if self.user.id.trim().is_empty() {
      return Err(eyre!("user id is required"));
    }
    let text = text.trim();
    if text.is_empty() {
      return Err(eyre!("message is required"));
    }

    self.engine.add_message(Role::User, text);

    let (content, fallback) = match self.agent.reply(text, &self.user).await {
      Ok(reply) => (reply, false),
      Err(e) => {
        warn!(user_id = %self.user.id, error = %e, "Agent unavailable, using fallback reply");
        (fallback_reply(text, &self.user), true)
      }
    };

    let message = self.engine.add_message(Role::Assistant, content);
    info!(user_id = %self.user.id, fallback, "Reply recorded");
    Ok(Reply { message, fallback })
  }

  /// End the session (logout).
  pub async fn close(&self) {
    self.engine.close().await;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::LocalCache;
  use crate::chat::UserRole;
  use crate::remote::{OfflineStore, RemoteStore};
  use crate::sync::SyncOptions;
  use async_trait::async_trait;
  use std::sync::Mutex;

  struct EchoAgent {
    seen: Mutex<Vec<String>>,
  }

  #[async_trait]
  impl Agent for EchoAgent {
    async fn reply(&self, message: &str, user: &UserProfile) -> Result<String> {
      self.seen.lock().unwrap().push(message.to_string());
      Ok(format!("{} said: {}", user.name, message))
    }
  }

  struct DownAgent;

  #[async_trait]
  impl Agent for DownAgent {
    async fn reply(&self, _message: &str, _user: &UserProfile) -> Result<String> {
      Err(eyre!("timeout"))
    }
  }

  fn user(id: &str) -> UserProfile {
    UserProfile {
      id: id.to_string(),
      name: "Ana".to_string(),
      email: "ana@example.com".to_string(),
      role: UserRole::Normal,
    }
  }

  async fn service(agent: Arc<dyn Agent>, profile: UserProfile) -> ChatService {
    let engine = SyncEngine::start(
      "u1",
      LocalCache::disabled(),
      Arc::new(OfflineStore) as Arc<dyn RemoteStore>,
      SyncOptions::default(),
    )
    .await
    .unwrap();
    ChatService::new(engine, agent, profile)
  }

  #[tokio::test]
  async fn test_send_records_both_turns() {
    let agent = Arc::new(EchoAgent {
      seen: Mutex::new(Vec::new()),
    });
    let chat = service(agent.clone(), user("u1")).await;

    let reply = chat.send("  How do I start?  ").await.unwrap();
    assert!(!reply.fallback);
    assert_eq!(reply.message.content, "Ana said: How do I start?");
    assert_eq!(agent.seen.lock().unwrap().as_slice(), ["How do I start?"]);

    let messages = chat.engine().messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[1].role, Role::Assistant);
  }

  #[tokio::test]
  async fn test_agent_failure_stores_fallback() {
    let chat = service(Arc::new(DownAgent), user("u1")).await;

    let reply = chat.send("Are you there?").await.unwrap();
    assert!(reply.fallback);
    assert!(reply.message.content.contains("Ana"));
    assert_eq!(chat.engine().messages().len(), 2);
  }

  #[tokio::test]
  async fn test_blank_message_is_rejected() {
    let chat = service(Arc::new(DownAgent), user("u1")).await;
    assert!(chat.send("   ").await.is_err());
    assert!(chat.engine().messages().is_empty());
  }

  #[tokio::test]
  async fn test_missing_user_id_is_rejected() {
    let chat = service(Arc::new(DownAgent), user("")).await;
    assert!(chat.send("hello").await.is_err());
    assert!(chat.engine().messages().is_empty());
  }

  #[tokio::test]
  async fn test_greeting_only_for_empty_history() {
    let chat = service(Arc::new(DownAgent), user("u1")).await;

    let greeting = chat.greet_if_empty().unwrap();
    assert_eq!(greeting.role, Role::Assistant);
    assert!(greeting.content.contains("Ana"));
    assert!(!greeting.synced);
    assert!(chat.greet_if_empty().is_none());
  }
}
