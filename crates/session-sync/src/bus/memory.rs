//! In-process message bus.

use std::{collections::HashMap, sync::RwLock};

use futures::{StreamExt, stream::BoxStream};
use serde_json::Value;
use session_sync_core::MessageBus;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// Broadcast capacity per message type.
const CHANNEL_CAPACITY: usize = 256;

/// In-process bus backed by one broadcast channel per message type.
///
/// Useful for tests and for running several simulated contexts inside one
/// process. A send to a type nobody currently listens on is dropped,
/// matching the best-effort delivery contract.
pub struct MemoryBus {
    channels: RwLock<HashMap<String, broadcast::Sender<Value>>>,
}

impl MemoryBus {
    /// Create a new in-process bus.
    #[must_use]
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Number of live listeners for a message type.
    #[must_use]
    pub fn listener_count(&self, message_type: &str) -> usize {
        self.channels
            .read()
            .unwrap()
            .get(message_type)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    fn sender(&self, message_type: &str) -> broadcast::Sender<Value> {
        self.channels
            .write()
            .unwrap()
            .entry(message_type.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBus for MemoryBus {
    fn send(&self, message_type: &str, payload: Value) {
        let _ = self.sender(message_type).send(payload); // no listeners is fine
    }

    fn listen(&self, message_type: &str) -> BoxStream<'static, Value> {
        let rx = self.sender(message_type).subscribe();
        BroadcastStream::new(rx)
            .filter_map(|res| async move { res.ok() })
            .boxed()
    }
}
