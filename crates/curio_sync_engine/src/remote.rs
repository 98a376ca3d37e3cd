//! Remote collaborator abstractions.
//!
//! The engine talks to three remote surfaces and one probe:
//! - [`AvailabilityProbe`]: is the backend reachable and authenticated
//! - [`DocumentMirror`]: one snapshot file per document domain, plus a
//!   blob area for photos
//! - [`TokenSignal`]: a tiny key-value slot broadcasting the last push time
//! - [`RecordStore`]: zoned records with optimistic concurrency, paged
//!   queries and change subscriptions
//!
//! These traits abstract the vendor backend, allowing different
//! implementations (a synced folder, a cloud record database, the
//! in-memory [`crate::MemoryCloud`] for tests).

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use bytes::Bytes;
use curio_sync_protocol::{Record, RecordId, RecordKind, SyncToken, ZoneId};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Checks whether the remote backend can be used.
#[async_trait]
pub trait AvailabilityProbe: Send + Sync {
    /// Returns true if the backend is reachable and the user is signed in.
    async fn check_availability(&self) -> bool;
}

/// Whole-document mirror shared by all of a user's devices.
#[async_trait]
pub trait DocumentMirror: Send + Sync {
    /// Overwrites the remote document `name`.
    async fn push_document(&self, name: &str, data: Vec<u8>) -> SyncResult<()>;

    /// Reads the remote document `name`, or `None` if it does not exist yet.
    async fn pull_document(&self, name: &str) -> SyncResult<Option<Vec<u8>>>;

    /// Uploads a photo blob under `filename`.
    async fn push_blob(&self, filename: &str, data: Bytes) -> SyncResult<()>;

    /// Downloads the photo blob `filename`, or `None` if it is absent.
    async fn fetch_blob(&self, filename: &str) -> SyncResult<Option<Bytes>>;

    /// Returns true if the blob `filename` exists remotely.
    async fn has_blob(&self, filename: &str) -> SyncResult<bool>;

    /// Deletes the blob `filename`. Deleting a missing blob succeeds.
    async fn delete_blob(&self, filename: &str) -> SyncResult<()>;
}

/// The quota-constrained "something changed" slot.
#[async_trait]
pub trait TokenSignal: Send + Sync {
    /// Reads the current token, or `None` if nothing was ever pushed.
    async fn read_token(&self) -> SyncResult<Option<SyncToken>>;

    /// Publishes a new token.
    async fn write_token(&self, token: SyncToken) -> SyncResult<()>;

    /// Subscribes to externally delivered token changes.
    fn subscribe(&self) -> broadcast::Receiver<SyncToken>;
}

/// Selects records of one kind within a zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordQuery {
    /// Zone to search.
    pub zone: ZoneId,
    /// Record type to match.
    pub kind: RecordKind,
}

impl RecordQuery {
    /// Creates a query for all records of `kind` in `zone`.
    pub fn new(zone: ZoneId, kind: RecordKind) -> Self {
        Self { zone, kind }
    }
}

/// Opaque continuation cursor returned with a page of results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryCursor(pub String);

/// One page of query results.
#[derive(Debug, Clone, Default)]
pub struct RecordPage {
    /// Records on this page.
    pub records: Vec<Record>,
    /// Cursor for the next page; `None` on the last page.
    pub cursor: Option<QueryCursor>,
}

/// Zoned record store with optimistic concurrency.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Creates `zone`. Creating an existing zone succeeds.
    async fn ensure_zone(&self, zone: &ZoneId) -> SyncResult<()>;

    /// Saves a record.
    ///
    /// Fails with [`SyncError::Conflict`] if the stored record's change tag
    /// differs from `record.change_tag`.
    async fn save(&self, record: Record) -> SyncResult<Record>;

    /// Fetches the current server version of a record.
    async fn fetch(&self, id: &RecordId) -> SyncResult<Option<Record>>;

    /// Fetches one page of `query` results, starting at `cursor`.
    async fn query(
        &self,
        query: &RecordQuery,
        cursor: Option<QueryCursor>,
        limit: usize,
    ) -> SyncResult<RecordPage>;

    /// Deletes a record. May fail with [`SyncError::NotFound`].
    async fn delete(&self, id: &RecordId) -> SyncResult<()>;

    /// Registers a silent change subscription. Registering twice is a no-op.
    async fn subscribe(&self, zone: &ZoneId, subscription: &str) -> SyncResult<()>;

    /// Receives change notifications for subscribed zones.
    fn changes(&self) -> broadcast::Receiver<RecordId>;
}

/// The set of remote collaborators handed to the engine.
#[derive(Clone)]
pub struct Remote {
    /// Availability probe.
    pub availability: Arc<dyn AvailabilityProbe>,
    /// Document mirror.
    pub mirror: Arc<dyn DocumentMirror>,
    /// Sync token slot.
    pub token: Arc<dyn TokenSignal>,
    /// Record store, if the backend has one.
    pub records: Option<Arc<dyn RecordStore>>,
}

impl Remote {
    /// Creates a remote without a record store.
    pub fn new(
        availability: Arc<dyn AvailabilityProbe>,
        mirror: Arc<dyn DocumentMirror>,
        token: Arc<dyn TokenSignal>,
    ) -> Self {
        Self {
            availability,
            mirror,
            token,
            records: None,
        }
    }

    /// Adds a record store.
    pub fn with_records(mut self, records: Arc<dyn RecordStore>) -> Self {
        self.records = Some(records);
        self
    }

    /// A remote that is never available; the engine runs local-only.
    pub fn local_only() -> Self {
        let offline = Arc::new(LocalOnly::new());
        Self::new(offline.clone(), offline.clone(), offline)
    }
}

impl std::fmt::Debug for Remote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Remote")
            .field("records", &self.records.is_some())
            .finish_non_exhaustive()
    }
}

/// A backend that never becomes available.
#[derive(Debug)]
pub struct LocalOnly {
    changes: broadcast::Sender<SyncToken>,
}

impl LocalOnly {
    /// Creates the offline backend.
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(1);
        Self { changes }
    }
}

impl Default for LocalOnly {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AvailabilityProbe for LocalOnly {
    async fn check_availability(&self) -> bool {
        false
    }
}

#[async_trait]
impl DocumentMirror for LocalOnly {
    async fn push_document(&self, _name: &str, _data: Vec<u8>) -> SyncResult<()> {
        Err(SyncError::Unavailable)
    }

    async fn pull_document(&self, _name: &str) -> SyncResult<Option<Vec<u8>>> {
        Err(SyncError::Unavailable)
    }

    async fn push_blob(&self, _filename: &str, _data: Bytes) -> SyncResult<()> {
        Err(SyncError::Unavailable)
    }

    async fn fetch_blob(&self, _filename: &str) -> SyncResult<Option<Bytes>> {
        Err(SyncError::Unavailable)
    }

    async fn has_blob(&self, _filename: &str) -> SyncResult<bool> {
        Err(SyncError::Unavailable)
    }

    async fn delete_blob(&self, _filename: &str) -> SyncResult<()> {
        Err(SyncError::Unavailable)
    }
}

#[async_trait]
impl TokenSignal for LocalOnly {
    async fn read_token(&self) -> SyncResult<Option<SyncToken>> {
        Err(SyncError::Unavailable)
    }

    async fn write_token(&self, _token: SyncToken) -> SyncResult<()> {
        Err(SyncError::Unavailable)
    }

    fn subscribe(&self) -> broadcast::Receiver<SyncToken> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_only_is_never_available() {
        let remote = Remote::local_only();
        assert!(!remote.availability.check_availability().await);
        assert!(remote.records.is_none());
        assert!(matches!(
            remote.mirror.pull_document("recents.json").await,
            Err(SyncError::Unavailable)
        ));
        assert!(matches!(remote.token.read_token().await, Err(SyncError::Unavailable)));
    }
}
