//! Key-value storage backends for the local message cache.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Trait for durable, synchronous key-value slots.
///
/// Values are opaque strings; serialization lives in [`super::LocalCache`].
pub trait MessageStorage: Send + Sync {
  /// Read the value stored under `key`, if any.
  fn read(&self, key: &str) -> Result<Option<String>>;

  /// Overwrite the value stored under `key`.
  fn write(&self, key: &str, value: &str) -> Result<()>;
}

/// Storage implementation that doesn't persist anything.
/// Used when the cache is disabled or could not be opened.
pub struct NoopStorage;

impl MessageStorage for NoopStorage {
  fn read(&self, _key: &str) -> Result<Option<String>> {
    Ok(None) // Always miss
  }

  fn write(&self, _key: &str, _value: &str) -> Result<()> {
    Ok(()) // Discard
  }
}

/// SQLite-based storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) the cache database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Open a private in-memory database.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;

    Self::with_connection(conn)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("mentor-chat").join("cache.db"))
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;

    Ok(storage)
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- One slot per storage key, value is the serialized message list
CREATE TABLE IF NOT EXISTS message_cache (
    cache_key TEXT PRIMARY KEY,
    data TEXT NOT NULL,
    checksum TEXT NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl MessageStorage for SqliteStorage {
  fn read(&self, key: &str) -> Result<Option<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let row: Option<(String, String)> = conn
      .query_row(
        "SELECT data, checksum FROM message_cache WHERE cache_key = ?",
        params![key],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read cache entry {}: {}", key, e))?;

    match row {
      Some((data, checksum)) => {
        if checksum != content_checksum(&data) {
          return Err(eyre!("Cache entry {} failed checksum verification", key));
        }
        Ok(Some(data))
      }
      None => Ok(None),
    }
  }

  fn write(&self, key: &str, value: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO message_cache (cache_key, data, checksum, cached_at)
         VALUES (?, ?, ?, datetime('now'))",
        params![key, value, content_checksum(value)],
      )
      .map_err(|e| eyre!("Failed to write cache entry {}: {}", key, e))?;

    Ok(())
  }
}

/// SHA256 of the stored value, used to detect torn or tampered rows.
fn content_checksum(data: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(data.as_bytes());
  hex::encode(hasher.finalize())
}

#[cfg(test)]
impl SqliteStorage {
  /// Overwrite a row's data without touching its checksum.
  pub(crate) fn corrupt(&self, key: &str, data: &str) {
    let conn = self.conn.lock().unwrap();
    conn
      .execute(
        "UPDATE message_cache SET data = ? WHERE cache_key = ?",
        params![data, key],
      )
      .unwrap();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_missing_key_reads_none() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    assert_eq!(storage.read("nope").unwrap(), None);
  }

  #[test]
  fn test_write_overwrites() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.write("k", "[1]").unwrap();
    storage.write("k", "[1,2]").unwrap();
    assert_eq!(storage.read("k").unwrap().as_deref(), Some("[1,2]"));
  }

  #[test]
  fn test_keys_are_independent() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.write("a", "1").unwrap();
    storage.write("b", "2").unwrap();
    assert_eq!(storage.read("a").unwrap().as_deref(), Some("1"));
    assert_eq!(storage.read("b").unwrap().as_deref(), Some("2"));
  }

  #[test]
  fn test_checksum_mismatch_is_an_error() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.write("k", "[]").unwrap();
    storage.corrupt("k", "[{\"oops\"");
    assert!(storage.read("k").is_err());
  }

  #[test]
  fn test_survives_reopen() {
    let dir = std::env::temp_dir().join(format!("mentor-chat-test-{}", std::process::id()));
    let path = dir.join("cache.db");
    {
      let storage = SqliteStorage::open(&path).unwrap();
      storage.write("k", "persisted").unwrap();
    }
    let storage = SqliteStorage::open(&path).unwrap();
    assert_eq!(storage.read("k").unwrap().as_deref(), Some("persisted"));
    let _ = std::fs::remove_dir_all(&dir);
  }

  #[test]
  fn test_noop_storage_never_hits() {
    let storage = NoopStorage;
    storage.write("k", "v").unwrap();
    assert_eq!(storage.read("k").unwrap(), None);
  }
}
