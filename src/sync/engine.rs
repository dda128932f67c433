//! Per-session message state and its reconciliation with the local cache
//! and the remote store.
//!
//! Writes are local-first: [`SyncEngine::add_message`] updates memory and the
//! local cache before returning, then (re)arms a debounce timer. When the timer
//! fires the full current message set is pushed to the remote store in one
//! batch. Remote failures are logged and otherwise only visible as the
//! `is_syncing` flag dropping back to false with messages still unsynced.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tracing::{debug, info, warn};

use super::debounce::Debouncer;
use super::merge::{merge_by_id, sort_by_timestamp};
use crate::cache::LocalCache;
use crate::chat::{now_millis, Message, Role};
use crate::remote::{RemoteMessage, RemoteStore};

/// How pending messages reach the remote store
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncStrategy {
  /// Overwrite the user's row with the full message set
  #[default]
  Batch,
  /// Send each unsynced message through the store's append procedure
  Append,
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
  pub debounce: Duration,
  pub strategy: SyncStrategy,
  /// Merge the remote history after hydrating from a non-empty local cache
  pub pull_on_start: bool,
}

impl Default for SyncOptions {
  fn default() -> Self {
    Self {
      debounce: Duration::from_millis(1000),
      strategy: SyncStrategy::Batch,
      pull_on_start: false,
    }
  }
}

/// Session lifecycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
  #[default]
  Uninitialized,
  Hydrating,
  Ready,
}

/// Where the session's initial messages came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydrationSource {
  LocalCache,
  Remote,
  /// Neither store had anything (or the remote store was unreachable)
  Empty,
}

/// Read-only view of the session handed to the presentation layer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
  pub phase: Phase,
  pub messages: Vec<Message>,
  pub is_syncing: bool,
  pub source: Option<HydrationSource>,
}

impl SessionSnapshot {
  pub fn is_loading(&self) -> bool {
    self.phase != Phase::Ready
  }

  pub fn unsynced_count(&self) -> usize {
    self.messages.iter().filter(|m| !m.synced).count()
  }
}

#[derive(Debug, Default)]
struct SessionState {
  phase: Phase,
  messages: Vec<Message>,
  /// Pushes currently awaiting the remote store
  in_flight: usize,
  source: Option<HydrationSource>,
}

impl SessionState {
  fn snapshot(&self) -> SessionSnapshot {
    SessionSnapshot {
      phase: self.phase,
      messages: self.messages.clone(),
      is_syncing: self.in_flight > 0,
      source: self.source,
    }
  }

  /// Timestamp for a new message: now, or just after the newest message if
  /// the clock hasn't moved past it.
  fn next_timestamp(&self) -> DateTime<Utc> {
    let now = now_millis();
    match self.messages.last() {
      Some(last) if last.timestamp >= now => last.timestamp + ChronoDuration::milliseconds(1),
      _ => now,
    }
  }
}

struct Inner {
  user_id: String,
  cache: LocalCache,
  remote: Arc<dyn RemoteStore>,
  strategy: SyncStrategy,
  pull_on_start: bool,
  state: Mutex<SessionState>,
  snapshot: watch::Sender<SessionSnapshot>,
  /// Held for the duration of a push so uploads reach the store one at a
  /// time, in the order they were started.
  push_lock: AsyncMutex<()>,
}

/// Owns one user's message set for the lifetime of a login session.
///
/// Build it with [`SyncEngine::start`] at login and call
/// [`SyncEngine::close`] at logout.
pub struct SyncEngine {
  inner: Arc<Inner>,
  debouncer: Debouncer,
}

impl SyncEngine {
  /// Create an engine in the `Uninitialized` phase.
  pub fn new(
    user_id: impl Into<String>,
    cache: LocalCache,
    remote: Arc<dyn RemoteStore>,
    options: SyncOptions,
  ) -> Result<Self> {
    let user_id = user_id.into();
    if user_id.trim().is_empty() {
      return Err(eyre!("A chat session requires a user id"));
    }

    let (snapshot, _) = watch::channel(SessionSnapshot::default());

    Ok(Self {
      inner: Arc::new(Inner {
        user_id,
        cache,
        remote,
        strategy: options.strategy,
        pull_on_start: options.pull_on_start,
        state: Mutex::new(SessionState::default()),
        snapshot,
        push_lock: AsyncMutex::new(()),
      }),
      debouncer: Debouncer::new(options.debounce),
    })
  }

  /// Create an engine and hydrate it.
  pub async fn start(
    user_id: impl Into<String>,
    cache: LocalCache,
    remote: Arc<dyn RemoteStore>,
    options: SyncOptions,
  ) -> Result<Self> {
    let engine = Self::new(user_id, cache, remote, options)?;
    engine.hydrate().await;
    Ok(engine)
  }

  /// Populate the session: local cache first, remote store only when the
  /// cache is empty (or when `pull_on_start` is set).
  pub async fn hydrate(&self) -> HydrationSource {
    let user_id = self.inner.user_id.as_str();
    {
      let mut state = self.inner.lock_state();
      state.phase = Phase::Hydrating;
      self.inner.publish(&state);
    }

    let mut local = self.inner.cache.load(user_id);
    if !local.is_empty() {
      sort_by_timestamp(&mut local);
      info!(user_id, count = local.len(), "Hydrated from local cache");
      self.inner.adopt(local, HydrationSource::LocalCache, false);

      if self.inner.pull_on_start {
        self.refresh_from_remote().await;
      }
      return HydrationSource::LocalCache;
    }

    match self.inner.remote.fetch_messages(user_id).await {
      Ok(Some(remote)) if !remote.is_empty() => {
        let messages = decode_remote(remote);
        info!(user_id, count = messages.len(), "Hydrated from remote store");
        self.inner.adopt(messages, HydrationSource::Remote, true);
        HydrationSource::Remote
      }
      Ok(_) => {
        info!(user_id, "No history found, starting empty");
        self.inner.adopt(Vec::new(), HydrationSource::Empty, false);
        HydrationSource::Empty
      }
      Err(e) => {
        warn!(user_id, error = %e, "Remote history unavailable, starting empty");
        self.inner.adopt(Vec::new(), HydrationSource::Empty, false);
        HydrationSource::Empty
      }
    }
  }

  /// Append a message and persist it locally. The remote push is scheduled,
  /// not awaited.
  pub fn add_message(&self, role: Role, content: impl Into<String>) -> Message {
    let message = {
      let mut state = self.inner.lock_state();
      let message = Message::new(role, content, state.next_timestamp());
      state.messages.push(message.clone());
      self.inner.commit(&state);
      message
    };

    debug!(user_id = %self.inner.user_id, id = %message.id, role = message.role.as_str(), "Message added");
    self.schedule_push();
    message
  }

  /// Append a user turn and its reply in one step. Blank sides are skipped.
  pub fn add_conversation(&self, user_text: &str, assistant_text: &str) -> Vec<Message> {
    let added = {
      let mut state = self.inner.lock_state();
      let mut added = Vec::new();

      for (role, text) in [(Role::User, user_text), (Role::Assistant, assistant_text)] {
        if text.trim().is_empty() {
          continue;
        }
        let message = Message::new(role, text, state.next_timestamp());
        state.messages.push(message.clone());
        added.push(message);
      }

      if !added.is_empty() {
        self.inner.commit(&state);
      }
      added
    };

    if !added.is_empty() {
      self.schedule_push();
    }
    added
  }

  /// Union `remote` into the session by id, local entries winning.
  /// Returns how many messages were new.
  pub fn merge_remote(&self, remote: Vec<Message>) -> usize {
    let mut state = self.inner.lock_state();
    let before = state.messages.len();
    state.messages = merge_by_id(&state.messages, remote);
    self.inner.commit(&state);
    state.messages.len() - before
  }

  /// Fetch the remote history and merge it in. Returns how many messages
  /// were new, or `None` if the fetch failed.
  pub async fn refresh_from_remote(&self) -> Option<usize> {
    let user_id = self.inner.user_id.as_str();
    match self.inner.remote.fetch_messages(user_id).await {
      Ok(remote) => {
        let added = self.merge_remote(decode_remote(remote.unwrap_or_default()));
        info!(user_id, added, "Merged remote history");
        Some(added)
      }
      Err(e) => {
        warn!(user_id, error = %e, "Failed to refresh from remote store");
        None
      }
    }
  }

  /// Push `messages` to the remote store now. Marks them synced on success.
  #[allow(dead_code)]
  pub async fn push_to_remote(&self, messages: Vec<Message>) -> bool {
    self.inner.push(Some(messages)).await
  }

  /// Cancel the pending timer and push the full set immediately. True when
  /// the store holds everything, including when there was nothing to send.
  pub async fn sync_now(&self) -> bool {
    self.debouncer.cancel();
    self.inner.push(None).await
  }

  /// End the session: drop the pending timer and push once more if anything
  /// is still unsynced.
  pub async fn close(&self) {
    self.debouncer.cancel();
    let unsynced = self.inner.lock_state().messages.iter().any(|m| !m.synced);
    if unsynced && !self.inner.push(None).await {
      warn!(user_id = %self.inner.user_id, "Session closed with unsynced messages");
    }
    info!(user_id = %self.inner.user_id, "Session closed");
  }

  pub fn messages(&self) -> Vec<Message> {
    self.inner.messages()
  }

  pub fn snapshot(&self) -> SessionSnapshot {
    self.inner.lock_state().snapshot()
  }

  /// Receive a fresh snapshot every time the session changes.
  pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
    self.inner.snapshot.subscribe()
  }

  pub fn is_syncing(&self) -> bool {
    self.inner.lock_state().in_flight > 0
  }

  /// Whether a debounced push is waiting for its quiet period to end.
  pub fn has_pending_push(&self) -> bool {
    self.debouncer.is_pending()
  }

  fn schedule_push(&self) {
    let inner = Arc::clone(&self.inner);
    self.debouncer.schedule(async move {
      inner.push(None).await;
    });
  }
}

impl Inner {
  fn lock_state(&self) -> MutexGuard<'_, SessionState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn messages(&self) -> Vec<Message> {
    self.lock_state().messages.clone()
  }

  fn publish(&self, state: &SessionState) {
    self.snapshot.send_replace(state.snapshot());
  }

  /// Mirror `state` to the local cache and to subscribers. Called with the
  /// state lock held so both see writes in the order they were made.
  fn commit(&self, state: &SessionState) {
    self.cache.save(&self.user_id, &state.messages);
    self.publish(state);
  }

  /// Finish hydration with `messages`. Anything added before hydration
  /// completed is kept.
  fn adopt(&self, messages: Vec<Message>, source: HydrationSource, persist: bool) {
    let mut state = self.lock_state();
    state.messages = merge_by_id(&state.messages, messages);
    state.phase = Phase::Ready;
    state.source = Some(source);
    if persist && !state.messages.is_empty() {
      self.commit(&state);
    } else {
      self.publish(&state);
    }
  }

  /// Push `messages`, or the full current set when `None`. The current set
  /// is read after the push lock is taken, so a push never uploads a batch
  /// older than one that already reached the store.
  async fn push(&self, messages: Option<Vec<Message>>) -> bool {
    let _syncing = SyncingGuard::enter(self);
    let _turn = self.push_lock.lock().await;

    let messages = messages.unwrap_or_else(|| self.messages());
    if messages.is_empty() {
      debug!(user_id = %self.user_id, "Nothing to sync");
      return true;
    }

    match self.strategy {
      SyncStrategy::Batch => self.push_batch(&messages).await,
      SyncStrategy::Append => self.push_appends(&messages).await,
    }
  }

  async fn push_batch(&self, messages: &[Message]) -> bool {
    let synced_at = Utc::now();
    let payload: Vec<RemoteMessage> = messages
      .iter()
      .map(|m| RemoteMessage::from_local(m, synced_at))
      .collect();

    info!(user_id = %self.user_id, count = payload.len(), "Pushing message batch");
    match self.remote.upsert_messages(&self.user_id, &payload).await {
      Ok(()) => {
        self.mark_synced(messages.iter().map(|m| m.id.as_str()));
        true
      }
      Err(e) => {
        warn!(user_id = %self.user_id, error = %e, "Batch push failed, will retry on next change");
        false
      }
    }
  }

  async fn push_appends(&self, messages: &[Message]) -> bool {
    let mut appended = Vec::new();
    let mut complete = true;

    for message in messages.iter().filter(|m| !m.synced) {
      let mut entry = RemoteMessage::from_local(message, Utc::now());
      entry.metadata["clientId"] = json!(message.id);

      match self.remote.append_message(&self.user_id, &entry).await {
        Ok(()) => appended.push(message.id.as_str()),
        Err(e) => {
          warn!(user_id = %self.user_id, id = %message.id, error = %e, "Append failed, stopping");
          complete = false;
          break;
        }
      }
    }

    info!(user_id = %self.user_id, count = appended.len(), "Appended messages");
    self.mark_synced(appended);
    complete
  }

  fn mark_synced<'a>(&self, ids: impl IntoIterator<Item = &'a str>) {
    let ids: HashSet<&str> = ids.into_iter().collect();
    if ids.is_empty() {
      return;
    }

    let mut state = self.lock_state();
    for message in state.messages.iter_mut() {
      if ids.contains(message.id.as_str()) {
        message.synced = true;
      }
    }
    self.commit(&state);
  }
}

/// Keeps `in_flight` accurate even if a push future is dropped mid-way.
struct SyncingGuard<'a> {
  inner: &'a Inner,
}

impl<'a> SyncingGuard<'a> {
  fn enter(inner: &'a Inner) -> Self {
    let mut state = inner.lock_state();
    state.in_flight += 1;
    inner.publish(&state);
    Self { inner }
  }
}

impl Drop for SyncingGuard<'_> {
  fn drop(&mut self) {
    let mut state = self.inner.lock_state();
    state.in_flight = state.in_flight.saturating_sub(1);
    self.inner.publish(&state);
  }
}

/// Convert remote entries, dropping ones without a usable timestamp.
fn decode_remote(remote: Vec<RemoteMessage>) -> Vec<Message> {
  let total = remote.len();
  let mut messages: Vec<Message> = remote
    .into_iter()
    .filter_map(RemoteMessage::into_local)
    .collect();
  if messages.len() < total {
    warn!(dropped = total - messages.len(), "Skipped remote messages with invalid timestamps");
  }
  sort_by_timestamp(&mut messages);
  messages
}
