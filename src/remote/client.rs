use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use url::Url;

use super::types::{AppendMessageArgs, MessagesRecord, RemoteMessage, UserMessagesRow};
use super::RemoteStore;
use crate::config::StoreConfig;

/// REST client for the relational store (PostgREST dialect)
#[derive(Clone)]
pub struct RestStore {
  http: reqwest::Client,
  base: Url,
  table: String,
  append_function: String,
}

impl RestStore {
  pub fn new(config: &StoreConfig, api_key: &str) -> Result<Self> {
    let mut base =
      Url::parse(&config.url).map_err(|e| eyre!("Invalid store url {}: {}", config.url, e))?;
    if !base.path().ends_with('/') {
      let path = format!("{}/", base.path());
      base.set_path(&path);
    }

    let mut headers = HeaderMap::new();
    headers.insert(
      "apikey",
      HeaderValue::from_str(api_key).map_err(|e| eyre!("Invalid store api key: {}", e))?,
    );
    headers.insert(
      AUTHORIZATION,
      HeaderValue::from_str(&format!("Bearer {}", api_key))
        .map_err(|e| eyre!("Invalid store api key: {}", e))?,
    );

    let http = reqwest::Client::builder()
      .default_headers(headers)
      .build()
      .map_err(|e| eyre!("Failed to create store client: {}", e))?;

    Ok(Self {
      http,
      base,
      table: config.table.clone(),
      append_function: config.append_function.clone(),
    })
  }

  fn endpoint(&self, path: &str) -> Result<Url> {
    self
      .base
      .join(path)
      .map_err(|e| eyre!("Invalid store endpoint {}: {}", path, e))
  }

  fn table_endpoint(&self) -> Result<Url> {
    self.endpoint(&format!("rest/v1/{}", self.table))
  }
}

/// Turn a non-2xx response into an error carrying the response body.
async fn ensure_success(response: reqwest::Response, action: &str) -> Result<reqwest::Response> {
  let status = response.status();
  if status.is_success() {
    return Ok(response);
  }
  let body = response.text().await.unwrap_or_default();
  Err(eyre!("Failed to {}: {} {}", action, status, body))
}

#[async_trait]
impl RemoteStore for RestStore {
  async fn fetch_messages(&self, user_id: &str) -> Result<Option<Vec<RemoteMessage>>> {
    let filter = format!("eq.{}", user_id);

    let response = self
      .http
      .get(self.table_endpoint()?)
      .query(&[("select", "messages"), ("user_id", filter.as_str())])
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch messages: {}", e))?;

    let rows: Vec<MessagesRecord> = ensure_success(response, "fetch messages")
      .await?
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse messages: {}", e))?;

    Ok(rows.into_iter().next().and_then(|row| row.messages))
  }

  async fn upsert_messages(&self, user_id: &str, messages: &[RemoteMessage]) -> Result<()> {
    let row = UserMessagesRow::new(user_id, messages, chrono::Utc::now());

    let response = self
      .http
      .post(self.table_endpoint()?)
      .query(&[("on_conflict", "user_id")])
      .header("Prefer", "resolution=merge-duplicates,return=minimal")
      .json(&[row])
      .send()
      .await
      .map_err(|e| eyre!("Failed to upsert messages: {}", e))?;

    ensure_success(response, "upsert messages").await?;
    Ok(())
  }

  async fn append_message(&self, user_id: &str, message: &RemoteMessage) -> Result<()> {
    let args = AppendMessageArgs {
      p_user_id: user_id,
      p_message_content: &message.content,
      p_message_type: &message.message_type,
      p_metadata: &message.metadata,
    };

    let response = self
      .http
      .post(self.endpoint(&format!("rest/v1/rpc/{}", self.append_function))?)
      .json(&args)
      .send()
      .await
      .map_err(|e| eyre!("Failed to append message: {}", e))?;

    ensure_success(response, "append message").await?;
    Ok(())
  }
}
