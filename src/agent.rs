//! Outbound AI agent reached through a webhook.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use rand::Rng;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use url::Url;

use crate::chat::UserProfile;
use crate::config::AgentConfig;
use crate::remote::iso_millis;

/// Something that answers a user's message.
#[async_trait]
pub trait Agent: Send + Sync {
  async fn reply(&self, message: &str, user: &UserProfile) -> Result<String>;
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
  message: &'a str,
  user: WebhookUser<'a>,
  timestamp: String,
  source: &'a str,
}

#[derive(Serialize)]
struct WebhookUser<'a> {
  id: &'a str,
  name: &'a str,
  email: &'a str,
  role: &'a str,
}

/// Agent behind an HTTP webhook (n8n style)
#[derive(Clone)]
pub struct WebhookAgent {
  http: reqwest::Client,
  url: Url,
  source: String,
}

impl WebhookAgent {
  pub fn new(config: &AgentConfig) -> Result<Self> {
    let url = Url::parse(&config.webhook_url)
      .map_err(|e| eyre!("Invalid webhook url {}: {}", config.webhook_url, e))?;

    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()
      .map_err(|e| eyre!("Failed to create webhook client: {}", e))?;

    Ok(Self {
      http,
      url,
      source: config.source.clone(),
    })
  }
}

#[async_trait]
impl Agent for WebhookAgent {
  async fn reply(&self, message: &str, user: &UserProfile) -> Result<String> {
    let payload = WebhookPayload {
      message,
      user: WebhookUser {
        id: &user.id,
        name: user.display_name(),
        email: &user.email,
        role: user.role.as_str(),
      },
      timestamp: iso_millis(chrono::Utc::now()),
      source: &self.source,
    };

    let response = self
      .http
      .post(self.url.clone())
      .json(&payload)
      .send()
      .await
      .map_err(|e| eyre!("Webhook request failed: {}", e))?;

    let status = response.status();
    if !status.is_success() {
      return Err(eyre!("Webhook returned {}", status));
    }

    let body: Value = response
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse webhook response: {}", e))?;

    extract_reply(&body).ok_or_else(|| eyre!("Webhook response had no output"))
  }
}

/// Agent used offline: always fails, so callers fall back.
pub struct OfflineAgent;

#[async_trait]
impl Agent for OfflineAgent {
  async fn reply(&self, _message: &str, _user: &UserProfile) -> Result<String> {
    Err(eyre!("Agent is disabled (offline mode)"))
  }
}

/// Pull the reply text out of a webhook response.
///
/// Accepts `{"output": ..}` or `{"message": ..}`, either bare or as the first
/// element of an array.
fn extract_reply(body: &Value) -> Option<String> {
  let body = match body {
    Value::Array(items) => items.first()?,
    other => other,
  };

  ["output", "message"]
    .iter()
    .filter_map(|field| body.get(field).and_then(Value::as_str))
    .map(str::trim)
    .find(|text| !text.is_empty())
    .map(String::from)
}

/// Canned reply used when the agent can't be reached.
pub fn fallback_reply(message: &str, user: &UserProfile) -> String {
  let name = user.display_name();
  let short: String = message.chars().take(30).collect();
  let long: String = message.chars().take(40).collect();

  match rand::thread_rng().gen_range(0..3) {
    0 => format!(
      "Thanks for your message, {}! I'm temporarily unavailable, but I'll be back soon to continue our conversation about \"{}...\".",
      name, short
    ),
    1 => format!(
      "{}, I got your message about \"{}...\". I'm handling other requests right now, but I'll be back to help you shortly!",
      name, long
    ),
    _ => format!(
      "Hi {}! Your message was received. I'm going through a quick update, but I'll be ready for our mentoring session in a moment!",
      name
    ),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::chat::UserRole;
  use serde_json::json;
  use wiremock::matchers::{method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn user() -> UserProfile {
    UserProfile {
      id: "u1".to_string(),
      name: "Ana".to_string(),
      email: "ana@example.com".to_string(),
      role: UserRole::Admin,
    }
  }

  fn agent_for(server: &MockServer, timeout_secs: u64) -> WebhookAgent {
    WebhookAgent::new(&AgentConfig {
      webhook_url: format!("{}/webhook/mentor", server.uri()),
      timeout_secs,
      source: "tests".to_string(),
    })
    .unwrap()
  }

  #[tokio::test]
  async fn test_reply_uses_output_field() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/webhook/mentor"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"output": "Let's begin."})))
      .expect(1)
      .mount(&server)
      .await;

    let reply = agent_for(&server, 5).reply("Hello", &user()).await.unwrap();
    assert_eq!(reply, "Let's begin.");

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["message"], "Hello");
    assert_eq!(body["user"]["id"], "u1");
    assert_eq!(body["user"]["name"], "Ana");
    assert_eq!(body["user"]["email"], "ana@example.com");
    assert_eq!(body["user"]["role"], "admin");
    assert_eq!(body["source"], "tests");
    assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));
  }

  #[tokio::test]
  async fn test_reply_accepts_message_field_in_array() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"message": "Hi Ana"}])))
      .mount(&server)
      .await;

    let reply = agent_for(&server, 5).reply("Hello", &user()).await.unwrap();
    assert_eq!(reply, "Hi Ana");
  }

  #[tokio::test]
  async fn test_non_success_status_is_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .respond_with(ResponseTemplate::new(502))
      .mount(&server)
      .await;

    let err = agent_for(&server, 5).reply("Hello", &user()).await.unwrap_err();
    assert!(err.to_string().contains("502"));
  }

  #[tokio::test]
  async fn test_slow_webhook_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .respond_with(
        ResponseTemplate::new(200)
          .set_body_json(json!({"output": "too late"}))
          .set_delay(Duration::from_secs(3)),
      )
      .mount(&server)
      .await;

    assert!(agent_for(&server, 1).reply("Hello", &user()).await.is_err());
  }

  #[test]
  fn test_extract_reply_prefers_output() {
    let body = json!({"output": "a", "message": "b"});
    assert_eq!(extract_reply(&body).as_deref(), Some("a"));
    assert_eq!(extract_reply(&json!({"output": "  ", "message": "b"})).as_deref(), Some("b"));
    assert_eq!(extract_reply(&json!({"status": "ok"})), None);
    assert_eq!(extract_reply(&json!([])), None);
  }

  #[test]
  fn test_fallback_addresses_user() {
    let message = "Como faço para crescer minha carreira em tecnologia este ano?";
    for _ in 0..20 {
      let reply = fallback_reply(message, &user());
      assert!(reply.contains("Ana"));
    }
  }

  #[tokio::test]
  async fn test_offline_agent_fails() {
    assert!(OfflineAgent.reply("Hello", &user()).await.is_err());
  }
}
