//! Broadcast value cell with replay-on-subscribe.

use std::sync::RwLock;

use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// Per-cell broadcast capacity; emissions beyond this lag slow subscribers.
const CHANNEL_CAPACITY: usize = 256;

/// Push-based cell holding the current value of a synchronized item.
///
/// Every change is fanned out to live subscribers, and a new subscriber
/// receives the current value immediately before any live updates, so a
/// context can attach at any point and still observe the latest state.
pub struct ValueCell<T> {
    current: RwLock<T>,
    sender: broadcast::Sender<T>,
}

impl<T> ValueCell<T>
where
    T: Clone + Send + 'static,
{
    /// Create a cell seeded with an initial value.
    #[must_use]
    pub fn new(initial: T) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            current: RwLock::new(initial),
            sender,
        }
    }

    /// Snapshot of the current value.
    #[must_use]
    pub fn value(&self) -> T {
        self.current.read().unwrap().clone()
    }

    /// Replace the current value and notify subscribers.
    pub fn set(&self, next: T) {
        {
            let mut current = self.current.write().unwrap();
            *current = next.clone();
        }
        let _ = self.sender.send(next); // no live subscribers is fine
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Stream that yields the current value first, then live updates.
    ///
    /// Subscribers that fall more than the channel capacity behind lose
    /// the lagged emissions and resume with later ones.
    #[must_use]
    pub fn subscribe(&self) -> futures::stream::BoxStream<'static, T> {
        let (rx, current) = (self.sender.subscribe(), self.value());

        let replay = futures::stream::iter(std::iter::once(current));
        let live = BroadcastStream::new(rx).filter_map(|res| async move { res.ok() });

        Box::pin(replay.chain(live))
    }
}

impl<T> Default for ValueCell<T>
where
    T: Clone + Default + Send + 'static,
{
    fn default() -> Self {
        Self::new(T::default())
    }
}
