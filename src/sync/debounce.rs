//! Single-slot debounce timer.

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Holds at most one pending timer. Scheduling again cancels the pending
/// timer and starts a new one, so a burst of triggers runs the work once,
/// `delay` after the last trigger.
///
/// Once a timer fires its work runs as a detached task: cancelling or
/// rescheduling only ever affects work that has not started.
pub struct Debouncer {
  delay: Duration,
  pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
  pub fn new(delay: Duration) -> Self {
    Self {
      delay,
      pending: Mutex::new(None),
    }
  }

  /// Run `task` after the quiet period, replacing any pending one.
  pub fn schedule<F>(&self, task: F)
  where
    F: Future<Output = ()> + Send + 'static,
  {
    let delay = self.delay;
    let timer = tokio::spawn(async move {
      tokio::time::sleep(delay).await;
      tokio::spawn(task);
    });

    let previous = self
      .pending
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .replace(timer);
    if let Some(previous) = previous {
      previous.abort();
    }
  }

  /// Cancel the pending timer. Returns true if one had not fired yet.
  pub fn cancel(&self) -> bool {
    let pending = self
      .pending
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .take();
    match pending {
      Some(timer) if !timer.is_finished() => {
        timer.abort();
        true
      }
      _ => false,
    }
  }

  /// Whether a timer is waiting to fire.
  pub fn is_pending(&self) -> bool {
    self
      .pending
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .as_ref()
      .is_some_and(|timer| !timer.is_finished())
  }
}

impl Drop for Debouncer {
  fn drop(&mut self) {
    if let Some(timer) = self
      .pending
      .get_mut()
      .unwrap_or_else(PoisonError::into_inner)
      .take()
    {
      timer.abort();
    }
  }
}
