//! Cross-context synchronization of session state.
//!
//! Keeps one logical value consistent across isolated execution contexts
//! that share nothing but an asynchronous per-session key-value store and
//! a best-effort message bus:
//! - `SessionSyncer` - per-context orchestrator
//! - `SyncConfig` - key plus reconstruction strategy for one synced value
//! - `build_from_key_value_pair` - typed reconstruction of stored values
//! - Memory-backed store and bus for tests and single-process use

pub mod bus;
pub mod codec;
pub mod config;
pub mod store;
pub mod syncer;

pub use codec::{CodecError, build_from_key_value_pair};
pub use config::{Initializer, SyncConfig};
pub use syncer::{SessionSyncer, SyncError};

#[cfg(feature = "memory")]
pub use bus::MemoryBus;
#[cfg(feature = "memory")]
pub use store::MemoryStore;
