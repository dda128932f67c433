//! On-device message cache.
//!
//! This module provides the durable half of local-first messaging:
//! - One storage slot per user, holding the serialized message list
//! - SQLite persistence with a checksum per slot to catch corrupted rows
//! - A no-op backend for session-only operation when storage is unavailable
//! - A facade that logs storage failures instead of returning them

mod layer;
mod storage;

pub use layer::LocalCache;
pub use storage::SqliteStorage;
