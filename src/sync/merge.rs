//! Merge-by-id reconciliation of local and remote message sets.

use std::collections::HashSet;

use crate::chat::Message;

/// Sort by timestamp. Stable, so equal timestamps keep insertion order.
pub fn sort_by_timestamp(messages: &mut [Message]) {
  messages.sort_by_key(|m| m.timestamp);
}

/// Union `remote` into `local` by id.
///
/// Local entries are never overwritten; remote entries whose id is already
/// present (locally or earlier in `remote`) are skipped. The result is
/// timestamp-sorted.
pub fn merge_by_id(local: &[Message], remote: Vec<Message>) -> Vec<Message> {
  let mut seen: HashSet<String> = local.iter().map(|m| m.id.clone()).collect();
  let mut merged = local.to_vec();

  for message in remote {
    if seen.insert(message.id.clone()) {
      merged.push(message);
    }
  }

  sort_by_timestamp(&mut merged);
  merged
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::chat::Role;
  use chrono::{DateTime, Duration, TimeZone, Utc};

  fn at(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap() + Duration::seconds(secs)
  }

  fn msg(id: &str, content: &str, secs: i64) -> Message {
    Message {
      id: id.to_string(),
      role: Role::User,
      content: content.to_string(),
      timestamp: at(secs),
      synced: false,
    }
  }

  fn ids(messages: &[Message]) -> Vec<&str> {
    messages.iter().map(|m| m.id.as_str()).collect()
  }

  #[test]
  fn test_disjoint_sets_interleave_by_timestamp() {
    let local = vec![msg("l1", "a", 0), msg("l2", "b", 20), msg("l3", "c", 40)];
    let remote = vec![msg("r1", "x", 10), msg("r2", "y", 30)];

    let merged = merge_by_id(&local, remote);
    assert_eq!(ids(&merged), vec!["l1", "r1", "l2", "r2", "l3"]);
  }

  #[test]
  fn test_local_wins_on_shared_id() {
    let local = vec![msg("a", "local text", 0)];
    let remote = vec![msg("a", "remote text", 5), msg("b", "other", 10)];

    let merged = merge_by_id(&local, remote);
    assert_eq!(merged.len(), 2);
    assert_eq!(merged[0].content, "local text");
    assert_eq!(merged[0].timestamp, at(0));
  }

  #[test]
  fn test_merge_is_idempotent() {
    let local = vec![msg("l1", "a", 0), msg("l2", "b", 20)];
    let remote = vec![msg("r1", "x", 10), msg("l2", "changed", 20)];

    let once = merge_by_id(&local, remote.clone());
    let twice = merge_by_id(&once, remote);
    assert_eq!(once, twice);
  }

  #[test]
  fn test_ids_are_union() {
    let local = vec![msg("a", "", 3), msg("b", "", 1)];
    let remote = vec![msg("b", "", 2), msg("c", "", 0), msg("c", "dup", 4)];

    let merged = merge_by_id(&local, remote);
    let mut got = ids(&merged);
    got.sort();
    assert_eq!(got, vec!["a", "b", "c"]);
    assert_eq!(ids(&merged), vec!["c", "b", "a"]);
  }

  #[test]
  fn test_equal_timestamps_keep_order() {
    let mut messages = vec![msg("1", "", 5), msg("2", "", 5), msg("0", "", 1)];
    sort_by_timestamp(&mut messages);
    assert_eq!(ids(&messages), vec!["0", "1", "2"]);
  }
}
