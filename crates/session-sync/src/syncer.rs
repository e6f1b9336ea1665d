//! Orchestrator keeping one value consistent across execution contexts.

use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use session_sync_core::{MessageBus, SessionStore, StoreError, UpdateMessage, ValueCell};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::codec::{self, CodecError};
use crate::config::SyncConfig;

/// Sync error.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("sync key must not be empty")]
    EmptyKey,
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Keeps one value consistent across isolated execution contexts.
///
/// Each context owns one syncer per synchronized value. A local change is
/// persisted to the shared session store and then announced over the bus;
/// peer syncers re-read the canonical value from the store and push it into
/// their own cell. Notifications carry the sender's instance id, so a
/// syncer discards its own echo instead of feeding back on itself.
pub struct SessionSyncer<T, S, B>
where
    S: SessionStore,
    B: MessageBus,
{
    id: Uuid,
    value: Arc<ValueCell<T>>,
    store: Arc<S>,
    bus: Arc<B>,
    config: SyncConfig<T>,
    channel: String,
}

impl<T, S, B> std::fmt::Debug for SessionSyncer<T, S, B>
where
    S: SessionStore,
    B: MessageBus,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSyncer")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

impl<T, S, B> SessionSyncer<T, S, B>
where
    T: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static,
    S: SessionStore + 'static,
    B: MessageBus + 'static,
{
    /// Create a syncer for one value in this execution context.
    ///
    /// Performs no I/O and registers nothing; call [`start`](Self::start)
    /// exactly once afterwards to activate it.
    ///
    /// # Errors
    /// Returns an error when `config.key` is empty or when the config
    /// carries neither a ctor nor an initializer.
    pub fn new(
        value: Arc<ValueCell<T>>,
        store: Arc<S>,
        bus: Arc<B>,
        config: SyncConfig<T>,
    ) -> Result<Self, SyncError> {
        if config.key.is_empty() {
            return Err(SyncError::EmptyKey);
        }
        if config.ctor.is_none() && config.initializer.is_none() {
            return Err(CodecError::MissingReconstructor.into());
        }

        let channel = UpdateMessage::channel(&config.key);
        Ok(Self {
            id: Uuid::new_v4(),
            value,
            store,
            bus,
            config,
            channel,
        })
    }

    /// Instance id used for self-echo detection.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Activate both directions of synchronization.
    ///
    /// Subscribes to the local cell (whose replay contract publishes the
    /// current value immediately) and registers the remote listener, then
    /// spawns one task per direction. Call exactly once; both tasks live
    /// for the remaining lifetime of the context. The handles are returned
    /// for embedders that manage task lifetimes, and dropping them simply
    /// detaches the tasks.
    pub fn start(self: &Arc<Self>) -> (JoinHandle<()>, JoinHandle<()>) {
        (self.observe(), self.listen_for_updates())
    }

    /// Persist a value and, on success, announce it to peer contexts.
    ///
    /// Exactly one store write per call and, only after that write
    /// succeeds, exactly one notification. A value that failed to persist
    /// is never announced.
    ///
    /// # Errors
    /// Returns an error when the value cannot be encoded or the store
    /// write fails; no notification is sent in either case.
    pub async fn update_session(&self, value: &T) -> Result<(), SyncError> {
        let raw = serde_json::to_value(value).map_err(CodecError::Encode)?;
        self.store.set(&self.config.key, raw).await?;

        let notice = serde_json::to_value(UpdateMessage::new(self.id)).map_err(CodecError::Encode)?;
        self.bus.send(&self.channel, notice);
        Ok(())
    }

    /// Apply a peer's update notification.
    ///
    /// A notification carrying this instance's own id is its echo and is
    /// discarded without touching the store. Any other notification causes
    /// exactly one store read; the raw result is rebuilt through the codec
    /// and pushed into the local cell, which re-enters the observation
    /// pipeline of [`start`](Self::start).
    ///
    /// # Errors
    /// Returns an error when the store read fails or the stored value
    /// cannot be reconstructed.
    pub async fn update_from_message(&self, message: UpdateMessage) -> Result<(), SyncError> {
        if message.id == self.id {
            tracing::trace!(key = %self.config.key, "discarding own update echo");
            return Ok(());
        }

        let raw = self
            .store
            .get(&self.config.key)
            .await?
            .unwrap_or(Value::Null);
        let rebuilt = codec::build_from_key_value_pair(raw, &self.config)?;
        self.value.set(rebuilt);
        Ok(())
    }

    fn observe(self: &Arc<Self>) -> JoinHandle<()> {
        let syncer = Arc::clone(self);
        let mut emissions = self.value.subscribe();

        tokio::spawn(async move {
            // A value equal to the last published one is not re-published;
            // this bounds the echo of a remote update at one extra
            // store-write + notification round trip.
            let mut last_published: Option<T> = None;
            while let Some(next) = emissions.next().await {
                if last_published.as_ref() == Some(&next) {
                    continue;
                }
                match syncer.update_session(&next).await {
                    Ok(()) => last_published = Some(next),
                    Err(e) => {
                        tracing::warn!(
                            key = %syncer.config.key,
                            error = %e,
                            "failed to publish session update"
                        );
                    }
                }
            }
        })
    }

    fn listen_for_updates(self: &Arc<Self>) -> JoinHandle<()> {
        let syncer = Arc::clone(self);
        let mut notices = self.bus.listen(&self.channel);

        tokio::spawn(async move {
            while let Some(payload) = notices.next().await {
                let message: UpdateMessage = match serde_json::from_value(payload) {
                    Ok(message) => message,
                    Err(e) => {
                        tracing::debug!(
                            channel = %syncer.channel,
                            error = %e,
                            "ignoring malformed update notification"
                        );
                        continue;
                    }
                };
                if let Err(e) = syncer.update_from_message(message).await {
                    tracing::warn!(
                        key = %syncer.config.key,
                        error = %e,
                        "failed to apply remote update"
                    );
                }
            }
        })
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use futures::stream::BoxStream;
    use serde_json::json;

    use super::*;
    use crate::bus::MemoryBus;
    use crate::store::MemoryStore;

    const KEY: &str = "Test__cell";
    const CHANNEL: &str = "Test__cell_update";

    /// Store double that counts calls and can be told to reject writes.
    struct RecordingStore {
        slots: MemoryStore,
        sets: AtomicUsize,
        gets: AtomicUsize,
        reject_writes: bool,
    }

    impl RecordingStore {
        fn new() -> Self {
            Self {
                slots: MemoryStore::new(),
                sets: AtomicUsize::new(0),
                gets: AtomicUsize::new(0),
                reject_writes: false,
            }
        }

        fn failing() -> Self {
            Self {
                reject_writes: true,
                ..Self::new()
            }
        }

        fn sets(&self) -> usize {
            self.sets.load(Ordering::SeqCst)
        }

        fn gets(&self) -> usize {
            self.gets.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SessionStore for RecordingStore {
        async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
            self.sets.fetch_add(1, Ordering::SeqCst);
            if self.reject_writes {
                return Err(StoreError::Internal("write rejected".to_string()));
            }
            self.slots.set(key, value).await
        }

        async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            self.slots.get(key).await
        }
    }

    /// Bus double recording every send while still delivering it.
    struct RecordingBus {
        fanout: MemoryBus,
        sent: Mutex<Vec<(String, Value)>>,
    }

    impl RecordingBus {
        fn new() -> Self {
            Self {
                fanout: MemoryBus::new(),
                sent: Mutex::new(Vec::new()),
            }
        }

        fn sent(&self) -> Vec<(String, Value)> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl MessageBus for RecordingBus {
        fn send(&self, message_type: &str, payload: Value) {
            self.sent
                .lock()
                .unwrap()
                .push((message_type.to_string(), payload.clone()));
            self.fanout.send(message_type, payload);
        }

        fn listen(&self, message_type: &str) -> BoxStream<'static, Value> {
            self.fanout.listen(message_type)
        }
    }

    fn config() -> SyncConfig<String> {
        SyncConfig::new(KEY)
            .with_initializer(|raw| serde_json::from_value(raw).map_err(CodecError::Decode))
    }

    fn cell(initial: &str) -> Arc<ValueCell<String>> {
        Arc::new(ValueCell::new(initial.to_string()))
    }

    async fn wait_until(description: &str, condition: impl Fn() -> bool) {
        for _ in 0..500 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("timed out waiting until {description}");
    }

    #[test]
    fn rejects_config_without_reconstructor() {
        let err = SessionSyncer::new(
            cell(""),
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryBus::new()),
            SyncConfig::<String>::new(KEY),
        )
        .unwrap_err();

        assert_eq!(err.to_string(), "ctor or initializer must be provided");
    }

    #[test]
    fn rejects_empty_key() {
        let err = SessionSyncer::new(
            cell(""),
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryBus::new()),
            SyncConfig::new("").with_ctor(String::new),
        )
        .unwrap_err();

        assert!(matches!(err, SyncError::EmptyKey));
    }

    #[test]
    fn accepts_either_reconstruction_path() {
        let store = Arc::new(MemoryStore::new());
        let bus = Arc::new(MemoryBus::new());

        let with_ctor = SessionSyncer::new(
            cell(""),
            store.clone(),
            bus.clone(),
            SyncConfig::new(KEY).with_ctor(String::new),
        )
        .unwrap();
        let with_initializer = SessionSyncer::new(cell(""), store, bus, config()).unwrap();

        // instance ids are the self-echo discriminator, so they must differ
        assert_ne!(with_ctor.id(), with_initializer.id());
    }

    #[tokio::test]
    async fn start_registers_one_subscription_and_one_listener() {
        let local = cell("");
        let bus = Arc::new(MemoryBus::new());
        let syncer = Arc::new(
            SessionSyncer::new(local.clone(), Arc::new(MemoryStore::new()), bus.clone(), config())
                .unwrap(),
        );

        assert_eq!(local.subscriber_count(), 0);
        assert_eq!(bus.listener_count(CHANNEL), 0);

        syncer.start();

        assert_eq!(local.subscriber_count(), 1);
        assert_eq!(bus.listener_count(CHANNEL), 1);
    }

    #[tokio::test]
    async fn each_emission_is_published_once() {
        let local = cell("");
        let store = Arc::new(RecordingStore::new());
        let bus = Arc::new(RecordingBus::new());
        let syncer =
            Arc::new(SessionSyncer::new(local.clone(), store.clone(), bus.clone(), config()).unwrap());

        syncer.start();
        wait_until("the seed value is published", || store.sets() == 1).await;

        local.set("test".to_string());
        wait_until("the emission is published", || store.sets() == 2).await;

        assert_eq!(store.slots.get(KEY).await.unwrap(), Some(json!("test")));
        let sent = bus.sent();
        assert_eq!(sent.len(), 2);
        for (channel, payload) in sent {
            assert_eq!(channel, CHANNEL);
            assert_eq!(payload, json!({ "id": syncer.id() }));
        }
    }

    #[tokio::test]
    async fn republishing_an_unchanged_value_is_skipped() {
        let local = cell("");
        let store = Arc::new(RecordingStore::new());
        let bus = Arc::new(RecordingBus::new());
        let syncer =
            Arc::new(SessionSyncer::new(local.clone(), store.clone(), bus, config()).unwrap());

        syncer.start();
        wait_until("the seed value is published", || store.sets() == 1).await;

        local.set(String::new()); // identical to the seed value
        local.set("changed".to_string());
        wait_until("the changed value is published", || store.sets() == 2).await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.sets(), 2);
    }

    #[tokio::test]
    async fn update_session_persists_then_announces() {
        let store = Arc::new(RecordingStore::new());
        let bus = Arc::new(RecordingBus::new());
        let syncer = SessionSyncer::new(cell(""), store.clone(), bus.clone(), config()).unwrap();

        syncer.update_session(&"test".to_string()).await.unwrap();

        assert_eq!(store.sets(), 1);
        assert_eq!(store.slots.get(KEY).await.unwrap(), Some(json!("test")));
        assert_eq!(
            bus.sent(),
            vec![(CHANNEL.to_string(), json!({ "id": syncer.id() }))]
        );
    }

    #[tokio::test]
    async fn failed_write_sends_no_notification() {
        let store = Arc::new(RecordingStore::failing());
        let bus = Arc::new(RecordingBus::new());
        let syncer = SessionSyncer::new(cell(""), store.clone(), bus.clone(), config()).unwrap();

        let err = syncer.update_session(&"test".to_string()).await.unwrap_err();

        assert!(matches!(err, SyncError::Store(_)));
        assert_eq!(store.sets(), 1);
        assert!(bus.sent().is_empty());
    }

    #[tokio::test]
    async fn own_echo_is_discarded_without_a_store_read() {
        let local = cell("untouched");
        let store = Arc::new(RecordingStore::new());
        let syncer =
            SessionSyncer::new(local.clone(), store.clone(), Arc::new(MemoryBus::new()), config())
                .unwrap();

        syncer
            .update_from_message(UpdateMessage::new(syncer.id()))
            .await
            .unwrap();

        assert_eq!(store.gets(), 0);
        assert_eq!(local.value(), "untouched");
    }

    #[tokio::test]
    async fn remote_update_rereads_the_store_and_pushes() {
        let local = cell("");
        let store = Arc::new(RecordingStore::new());
        let syncer =
            SessionSyncer::new(local.clone(), store.clone(), Arc::new(MemoryBus::new()), config())
                .unwrap();
        store.slots.set(KEY, json!("from session")).await.unwrap();

        syncer
            .update_from_message(UpdateMessage::new(Uuid::new_v4()))
            .await
            .unwrap();

        assert_eq!(store.gets(), 1);
        assert_eq!(local.value(), "from session");
    }

    #[tokio::test]
    async fn remote_update_with_empty_slot_builds_the_ctor_default() {
        let local = cell("local value");
        let syncer = SessionSyncer::new(
            local.clone(),
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryBus::new()),
            SyncConfig::new(KEY).with_ctor(String::new),
        )
        .unwrap();

        syncer
            .update_from_message(UpdateMessage::new(Uuid::new_v4()))
            .await
            .unwrap();

        assert_eq!(local.value(), "");
    }

    #[tokio::test]
    async fn two_contexts_converge_and_quiesce() {
        let store = Arc::new(RecordingStore::new());
        let bus = Arc::new(MemoryBus::new());

        let cell_a = cell("");
        let cell_b = cell("");
        let a = Arc::new(
            SessionSyncer::new(cell_a.clone(), store.clone(), bus.clone(), config()).unwrap(),
        );
        let b = Arc::new(
            SessionSyncer::new(cell_b.clone(), store.clone(), bus.clone(), config()).unwrap(),
        );

        a.start();
        b.start();
        wait_until("both contexts finish initializing", || {
            store.sets() >= 2 && store.gets() >= 2
        })
        .await;

        cell_a.set("hello".to_string());
        wait_until("the peer context converges", || cell_b.value() == "hello").await;

        // one extra round trip from the peer republishing, then quiet
        tokio::time::sleep(Duration::from_millis(50)).await;
        let writes = store.sets();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(store.sets(), writes);
        assert_eq!(cell_a.value(), "hello");
        assert_eq!(cell_b.value(), "hello");
    }
}
