//! Per-value sync configuration.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::codec::CodecError;

/// Caller-supplied reconstruction function with full discretion over the
/// raw stored value.
pub type Initializer<T> = Arc<dyn Fn(Value) -> Result<T, CodecError> + Send + Sync>;

/// Configuration for one synchronized value.
///
/// The key names both the store slot and the bus channel for this value,
/// so it must be unique among synchronized values. At least one of
/// `ctor`/`initializer` must be set before the config is handed to a
/// syncer; `initializer` wins when both are.
pub struct SyncConfig<T> {
    /// Store slot and channel-name root for this value.
    pub key: String,
    /// No-argument constructor used when no initializer is supplied.
    pub ctor: Option<fn() -> T>,
    /// Reconstruction function taking precedence over `ctor`.
    pub initializer: Option<Initializer<T>>,
}

impl<T> SyncConfig<T> {
    /// Create a config with neither reconstruction path set.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ctor: None,
            initializer: None,
        }
    }

    /// Set the no-argument constructor.
    #[must_use]
    pub fn with_ctor(mut self, ctor: fn() -> T) -> Self {
        self.ctor = Some(ctor);
        self
    }

    /// Set the initializer.
    #[must_use]
    pub fn with_initializer<F>(mut self, initializer: F) -> Self
    where
        F: Fn(Value) -> Result<T, CodecError> + Send + Sync + 'static,
    {
        self.initializer = Some(Arc::new(initializer));
        self
    }
}

impl<T> Clone for SyncConfig<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            ctor: self.ctor,
            initializer: self.initializer.clone(),
        }
    }
}

impl<T> fmt::Debug for SyncConfig<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncConfig")
            .field("key", &self.key)
            .field("ctor", &self.ctor.is_some())
            .field("initializer", &self.initializer.is_some())
            .finish()
    }
}
