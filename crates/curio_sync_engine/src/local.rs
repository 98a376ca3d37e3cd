//! The local store for the four document domains and photo blobs.

use crate::records::RecordOp;
use curio_storage::{json, DocumentStore, StorageResult};
use curio_sync_protocol::{
    encode_snapshot, Domain, DomainDocument, DomainState, ItemId, Locations, PhotoRefs,
    RecentItems, SyncToken, UserItems,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// Key prefix of the local photo blob directory.
pub(crate) const PHOTOS_PREFIX: &str = "photos/";

/// Key of the sync bookkeeping document.
pub(crate) const PENDING_KEY: &str = "sync_state.json";

/// Sync bookkeeping that has to survive a restart.
///
/// Deletes and record writes made while offline are only known here until
/// they reach the remote. Losing them would let the next merge bring a
/// deleted item back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct PendingSync {
    /// Newest remote token merged into local state.
    pub last_seen: SyncToken,
    /// Items deleted locally since the last successful push.
    pub deleted_items: Vec<ItemId>,
    /// Photo blobs to delete from the remote.
    pub deleted_photos: Vec<String>,
    /// Record writes not yet applied to the record store.
    pub record_ops: Vec<RecordOp>,
}

impl PendingSync {
    /// Returns true if anything still has to be pushed.
    pub fn has_work(&self) -> bool {
        !self.deleted_items.is_empty()
            || !self.deleted_photos.is_empty()
            || !self.record_ops.is_empty()
    }
}

/// Typed access to the engine's local data directory.
///
/// Every domain is its own document; a failure saving one domain never
/// prevents saving the others.
#[derive(Clone)]
pub struct LocalStore {
    store: Arc<dyn DocumentStore>,
}

impl LocalStore {
    /// Wraps a document store.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Loads a domain, or its empty default if it is missing or corrupt.
    pub fn load<T: DomainDocument>(&self) -> T {
        json::load_or_default(self.store.as_ref(), T::file_name())
    }

    /// Atomically replaces a domain document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be encoded or written.
    pub fn save<T: DomainDocument>(&self, value: &T) -> StorageResult<()> {
        json::save(self.store.as_ref(), T::file_name(), value)
    }

    /// Loads all four domains.
    pub fn load_state(&self) -> DomainState {
        DomainState {
            recents: self.load::<RecentItems>(),
            photos: self.load::<PhotoRefs>(),
            locations: self.load::<Locations>(),
            user_items: self.load::<UserItems>(),
        }
    }

    /// Persists one domain of `state`, logging a failure.
    ///
    /// Returns true if the domain was written.
    pub fn save_domain(&self, state: &DomainState, domain: Domain) -> bool {
        let result = match domain {
            Domain::Recents => self.save(&state.recents),
            Domain::Photos => self.save(&state.photos),
            Domain::Locations => self.save(&state.locations),
            Domain::UserItems => self.save(&state.user_items),
            Domain::Records => return true,
        };
        match result {
            Ok(()) => true,
            Err(error) => {
                warn!(domain = %domain, %error, "failed to persist domain, keeping in-memory state");
                false
            }
        }
    }

    /// Persists every domain in `domains`. Returns the number written.
    pub fn save_all(&self, state: &DomainState, domains: &[Domain]) -> usize {
        domains
            .iter()
            .filter(|domain| self.save_domain(state, **domain))
            .count()
    }

    /// Loads the sync bookkeeping, or an empty one if it is missing or corrupt.
    pub(crate) fn load_pending(&self) -> PendingSync {
        json::load_or_default(self.store.as_ref(), PENDING_KEY)
    }

    /// Persists the sync bookkeeping, logging a failure.
    ///
    /// Returns true if it was written.
    pub(crate) fn save_pending(&self, pending: &PendingSync) -> bool {
        match json::save(self.store.as_ref(), PENDING_KEY, pending) {
            Ok(()) => true,
            Err(error) => {
                warn!(%error, "failed to persist sync state, keeping it in memory");
                false
            }
        }
    }

    /// Writes a photo blob.
    ///
    /// # Errors
    ///
    /// Returns an error if the filename is invalid or the write fails.
    pub fn write_photo(&self, filename: &str, data: &[u8]) -> StorageResult<()> {
        self.store.write(&photo_key(filename), data)
    }

    /// Reads a photo blob.
    ///
    /// # Errors
    ///
    /// Returns an error if the filename is invalid or the read fails.
    pub fn read_photo(&self, filename: &str) -> StorageResult<Option<Vec<u8>>> {
        self.store.read(&photo_key(filename))
    }

    /// Returns true if the photo blob exists locally.
    pub fn has_photo(&self, filename: &str) -> bool {
        self.store.contains(&photo_key(filename)).unwrap_or(false)
    }

    /// Removes a photo blob, logging a failure.
    pub fn remove_photo(&self, filename: &str) {
        if let Err(error) = self.store.remove(&photo_key(filename)) {
            warn!(filename, %error, "failed to remove photo blob");
        }
    }

    /// Lists the local photo blob filenames.
    pub fn photo_files(&self) -> Vec<String> {
        match self.store.keys(PHOTOS_PREFIX) {
            Ok(keys) => keys
                .into_iter()
                .filter_map(|key| key.strip_prefix(PHOTOS_PREFIX).map(str::to_string))
                .collect(),
            Err(error) => {
                warn!(%error, "failed to list photo blobs");
                Vec::new()
            }
        }
    }

    /// Encodes the document domains of `state` for a push, in push order.
    pub fn documents(state: &DomainState) -> Vec<(Domain, Vec<u8>)> {
        let encoded = [
            (Domain::Recents, encode_snapshot(&state.recents)),
            (Domain::Photos, encode_snapshot(&state.photos)),
            (Domain::Locations, encode_snapshot(&state.locations)),
            (Domain::UserItems, encode_snapshot(&state.user_items)),
        ];
        encoded
            .into_iter()
            .filter_map(|(domain, bytes)| match bytes {
                Ok(bytes) => Some((domain, bytes)),
                Err(error) => {
                    warn!(domain = %domain, %error, "failed to encode snapshot");
                    None
                }
            })
            .collect()
    }
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore").finish_non_exhaustive()
    }
}

pub(crate) fn photo_key(filename: &str) -> String {
    format!("{PHOTOS_PREFIX}{filename}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use curio_storage::{FileStore, InMemoryStore};
    use curio_sync_protocol::CatalogItem;

    fn memory() -> LocalStore {
        LocalStore::new(Arc::new(InMemoryStore::new()))
    }

    #[test]
    fn empty_store_loads_defaults() {
        let local = memory();
        assert_eq!(local.load_state(), DomainState::default());
    }

    #[test]
    fn domains_persist_independently() {
        let dir = tempfile::tempdir().unwrap();
        let local = LocalStore::new(Arc::new(FileStore::open(dir.path()).unwrap()));

        let mut state = DomainState::default();
        state.add_recent(ItemId::from("a"));
        state.user_items.upsert(CatalogItem::new("u1", "Mine"));
        assert_eq!(local.save_all(&state, &Domain::DOCUMENTS), 4);

        assert!(dir.path().join("recents.json").exists());
        assert!(dir.path().join("user_items.json").exists());
        assert_eq!(local.load_state(), state);
    }

    #[test]
    fn corrupt_domain_starts_empty() {
        let store = Arc::new(InMemoryStore::new());
        store.write("recents.json", b"{ not json").unwrap();
        store.write("artifacts.json", br#"{"a":"a.jpg"}"#).unwrap();

        let local = LocalStore::new(store);
        let state = local.load_state();
        assert!(state.recents.is_empty());
        assert_eq!(state.photos.get(&"a".into()), Some("a.jpg"));
    }

    #[test]
    fn pending_sync_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let pending = PendingSync {
            last_seen: SyncToken::from_millis(1_700_000_000_000),
            deleted_items: vec![ItemId::from("sketch-1")],
            deleted_photos: vec!["artifact_sketch-1.jpg".into()],
            record_ops: vec![
                RecordOp::Item(CatalogItem::new("u2", "Mine")),
                RecordOp::Delete(ItemId::from("sketch-1")),
            ],
        };

        let local = LocalStore::new(Arc::new(FileStore::open(dir.path()).unwrap()));
        assert_eq!(local.load_pending(), PendingSync::default());
        assert!(local.save_pending(&pending));
        assert!(dir.path().join(PENDING_KEY).exists());

        let reopened = LocalStore::new(Arc::new(FileStore::open(dir.path()).unwrap()));
        let loaded = reopened.load_pending();
        assert!(loaded.has_work());
        assert_eq!(loaded, pending);
    }

    #[test]
    fn corrupt_pending_sync_starts_empty() {
        let store = Arc::new(InMemoryStore::new());
        store.write(PENDING_KEY, b"[1, 2").unwrap();
        let pending = LocalStore::new(store).load_pending();
        assert!(!pending.has_work());
        assert_eq!(pending.last_seen, SyncToken::ZERO);
    }

    #[test]
    fn photo_blobs() {
        let local = memory();
        local.write_photo("x.jpg", b"jpeg").unwrap();
        assert!(local.has_photo("x.jpg"));
        assert_eq!(local.read_photo("x.jpg").unwrap(), Some(b"jpeg".to_vec()));
        assert_eq!(local.photo_files(), vec!["x.jpg".to_string()]);

        local.remove_photo("x.jpg");
        assert!(!local.has_photo("x.jpg"));
        local.remove_photo("x.jpg");
    }

    #[test]
    fn documents_in_push_order() {
        let documents = LocalStore::documents(&DomainState::default());
        let domains: Vec<Domain> = documents.iter().map(|(domain, _)| *domain).collect();
        assert_eq!(domains, Domain::DOCUMENTS.to_vec());
        assert_eq!(documents[0].1, b"[]".to_vec());
    }
}
