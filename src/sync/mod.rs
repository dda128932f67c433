//! Local-first message synchronization.
//!
//! - `engine`: session state, hydration, debounced pushes
//! - `merge`: union-by-id reconciliation
//! - `debounce`: cancel-and-reschedule timer

mod debounce;
mod engine;
mod merge;

pub use engine::{HydrationSource, SessionSnapshot, SyncEngine, SyncOptions, SyncStrategy};
