//! Chat domain: messages, identities and the send/reply flow.

mod service;
mod types;

pub use service::ChatService;
pub use types::{now_millis, Message, Role, UserProfile, UserRole};
