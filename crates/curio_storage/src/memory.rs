//! In-memory document store for testing.

use crate::error::StorageResult;
use crate::store::{validate_key, DocumentStore};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// An in-memory document store.
///
/// This store keeps all documents in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Simulated remote document areas shared between engine instances
///
/// # Thread Safety
///
/// This store is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use curio_storage::{DocumentStore, InMemoryStore};
///
/// let store = InMemoryStore::new();
/// store.write("photos/a.jpg", b"jpeg").unwrap();
/// assert_eq!(store.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    documents: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of documents held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    /// Returns true if the store holds no documents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }

    /// Removes every document.
    pub fn clear(&self) {
        self.documents.write().clear();
    }
}

impl DocumentStore for InMemoryStore {
    fn read(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_key(key)?;
        Ok(self.documents.read().get(key).cloned())
    }

    fn write(&self, key: &str, data: &[u8]) -> StorageResult<()> {
        validate_key(key)?;
        self.documents.write().insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        Ok(self.documents.write().remove(key).is_some())
    }

    fn contains(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        Ok(self.documents.read().contains_key(key))
    }

    fn keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        Ok(self
            .documents
            .read()
            .keys()
            .filter(|key| {
                key.strip_prefix(prefix)
                    .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;

    #[test]
    fn memory_new_is_empty() {
        let store = InMemoryStore::new();
        assert!(store.is_empty());
        assert_eq!(store.read("recents.json").unwrap(), None);
    }

    #[test]
    fn memory_write_replaces() {
        let store = InMemoryStore::new();
        store.write("recents.json", b"[\"a\"]").unwrap();
        store.write("recents.json", b"[\"b\"]").unwrap();
        assert_eq!(store.read("recents.json").unwrap(), Some(b"[\"b\"]".to_vec()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn memory_keys_are_one_level() {
        let store = InMemoryStore::new();
        store.write("photos/a.jpg", b"a").unwrap();
        store.write("photos/nested/b.jpg", b"b").unwrap();
        store.write("recents.json", b"[]").unwrap();

        assert_eq!(store.keys("photos/").unwrap(), vec!["photos/a.jpg".to_string()]);
        assert_eq!(store.keys("").unwrap(), vec!["recents.json".to_string()]);
    }

    #[test]
    fn memory_remove_and_clear() {
        let store = InMemoryStore::new();
        store.write("a.json", b"1").unwrap();
        assert!(store.remove("a.json").unwrap());
        assert!(!store.remove("a.json").unwrap());

        store.write("b.json", b"2").unwrap();
        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn memory_validates_keys() {
        let store = InMemoryStore::new();
        assert!(matches!(store.write("../x", b""), Err(StorageError::InvalidKey(_))));
    }
}
