//! Typed JSON documents on top of a [`DocumentStore`].
//!
//! Loading never fails: a missing document, an I/O error or a parse error
//! all yield the type's empty default, so a corrupt file means "start
//! empty" rather than a fatal error.

use crate::error::StorageResult;
use crate::store::DocumentStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

/// Loads `key` as JSON, falling back to `T::default()`.
pub fn load_or_default<T>(store: &dyn DocumentStore, key: &str) -> T
where
    T: DeserializeOwned + Default,
{
    let bytes = match store.read(key) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return T::default(),
        Err(error) => {
            warn!(key, %error, "failed to read document, starting empty");
            return T::default();
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(error) => {
            warn!(key, %error, "corrupt document, starting empty");
            T::default()
        }
    }
}

/// Serializes `value` as JSON and atomically replaces `key`.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn save<T>(store: &dyn DocumentStore, key: &str, value: &T) -> StorageResult<()>
where
    T: Serialize + ?Sized,
{
    let bytes = serde_json::to_vec(value)?;
    store.write(key, &bytes)
}
