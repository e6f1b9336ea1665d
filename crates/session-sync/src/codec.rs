//! Reconstruction of typed values from their raw stored form.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::config::SyncConfig;

/// Codec error.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("ctor or initializer must be provided")]
    MissingReconstructor,
    #[error("value cannot be encoded for session storage: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("stored value cannot be decoded: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("initializer failed: {0}")]
    Initializer(String),
}

/// Rebuild a typed value from the raw form read out of the session store.
///
/// An initializer, when present, is given the raw value as-is and wins over
/// `ctor`. The `ctor` path constructs a fresh instance and overlays every
/// field present on an object-shaped `raw`, so the result equals `raw` on
/// all shared fields; a non-object `raw` contributes no fields. An absent
/// store slot is represented as `Value::Null`.
///
/// This is the only path by which a stored value re-enters a cell, keeping
/// the reconstruction rule in one place.
///
/// # Errors
/// Returns an error when neither reconstruction path is configured, when
/// the initializer rejects the raw value, or when the merged `ctor`
/// representation does not deserialize into `T`.
pub fn build_from_key_value_pair<T>(raw: Value, config: &SyncConfig<T>) -> Result<T, CodecError>
where
    T: Serialize + DeserializeOwned,
{
    if let Some(initializer) = &config.initializer {
        return initializer(raw);
    }
    let Some(ctor) = config.ctor else {
        return Err(CodecError::MissingReconstructor);
    };

    let mut rebuilt = serde_json::to_value(ctor()).map_err(CodecError::Encode)?;
    if let (Value::Object(fields), Value::Object(raw_fields)) = (&mut rebuilt, raw) {
        for (name, value) in raw_fields {
            fields.insert(name, value);
        }
    }
    serde_json::from_value(rebuilt).map_err(CodecError::Decode)
}
