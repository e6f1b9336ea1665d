//! Capability traits for the session store and the inter-context bus.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;
use thiserror::Error;

/// Session store error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store error: {0}")]
    Internal(String),
}

/// Asynchronous per-session key-value store shared by all execution contexts.
///
/// The store is the single source of truth for synchronized values and is
/// assumed read-after-write consistent within a session. What bounds the
/// session (lock, sign-out) is decided outside this crate.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a value under a key.
    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// Read the last persisted value for a key.
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
}

/// Fire-and-forget pub/sub channel between execution contexts.
///
/// Delivery is best-effort: a message sent while no listener is registered
/// for its type is lost, with no acknowledgment and no retry.
pub trait MessageBus: Send + Sync {
    /// Broadcast a payload to every listener of a message type.
    fn send(&self, message_type: &str, payload: Value);

    /// Persistent subscription to one message type.
    fn listen(&self, message_type: &str) -> BoxStream<'static, Value>;
}
