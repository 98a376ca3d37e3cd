//! Document store trait definition.

use crate::error::{StorageError, StorageResult};

/// A keyed store of whole documents.
///
/// Stores are **opaque byte stores**: each key maps to one document that is
/// replaced as a unit. The engine owns all format interpretation.
///
/// # Invariants
///
/// - `read` returns exactly the bytes of the last successful `write`
/// - `write` either fully replaces the document or leaves the old one intact
/// - `remove` of a missing key is not an error
/// - Stores must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For testing
/// - [`super::FileStore`] - For persistent storage
pub trait DocumentStore: Send + Sync {
    /// Reads the document stored under `key`, or `None` if there is none.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or an I/O error occurs.
    fn read(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Replaces the document stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the write fails. A failed
    /// write leaves any previous document untouched.
    fn write(&self, key: &str, data: &[u8]) -> StorageResult<()>;

    /// Removes the document under `key`.
    ///
    /// Returns `true` if a document was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or an I/O error occurs.
    fn remove(&self, key: &str) -> StorageResult<bool>;

    /// Returns true if a document exists under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or an I/O error occurs.
    fn contains(&self, key: &str) -> StorageResult<bool> {
        Ok(self.read(key)?.is_some())
    }

    /// Lists the keys directly under `prefix` (e.g. `"photos/"`), sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing fails.
    fn keys(&self, prefix: &str) -> StorageResult<Vec<String>>;
}

/// Checks that a key is a relative path that stays inside the store.
///
/// # Errors
///
/// Returns [`StorageError::InvalidKey`] for empty or absolute keys and for
/// keys with empty, `.` or `..` segments.
pub fn validate_key(key: &str) -> StorageResult<()> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..");
    if bad {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_nested_relative_keys() {
        assert!(validate_key("recents.json").is_ok());
        assert!(validate_key("photos/artifact_1.jpg").is_ok());
    }

    #[test]
    fn rejects_escaping_keys() {
        for key in ["", "/etc/passwd", "../x", "photos/../../x", "photos//a", "a\\b", "./a"] {
            assert!(
                matches!(validate_key(key), Err(StorageError::InvalidKey(_))),
                "{key:?} should be rejected"
            );
        }
    }
}
