//! Wire format for cross-context update notifications.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Suffix appended to a sync key to form its bus channel name.
const UPDATE_SUFFIX: &str = "_update";

/// Notification that a synchronized value changed.
///
/// Carries only the sender's instance id, never the value itself:
/// receivers re-read the canonical value from the session store, so a
/// reordered or stale notification cannot roll state back, and message
/// size stays constant regardless of value size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateMessage {
    /// Instance id of the syncer that persisted the change.
    pub id: Uuid,
}

impl UpdateMessage {
    /// Create a notification for the given sender.
    #[must_use]
    pub const fn new(id: Uuid) -> Self {
        Self { id }
    }

    /// Bus channel carrying update notifications for a sync key.
    #[must_use]
    pub fn channel(key: &str) -> String {
        format!("{key}{UPDATE_SUFFIX}")
    }
}
