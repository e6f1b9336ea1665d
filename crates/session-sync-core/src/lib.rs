//! Core abstractions for cross-context session state sync.
//!
//! This crate provides the fundamental building blocks:
//! - `ValueCell` - Broadcast value cell with replay-on-subscribe
//! - `UpdateMessage` - Wire format for change notifications
//! - Session store and message bus capability traits

pub mod cell;
pub mod message;
pub mod traits;

pub use cell::ValueCell;
pub use message::UpdateMessage;
pub use traits::{MessageBus, SessionStore, StoreError};
