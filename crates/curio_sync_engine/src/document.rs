//! Document strategy: whole-snapshot mirroring of the four domains.

use crate::error::SyncResult;
use crate::local::LocalStore;
use crate::remote::{DocumentMirror, TokenSignal};
use bytes::Bytes;
use curio_sync_protocol::{decode_snapshot, Domain, DomainState, ItemId, RemoteSnapshot, SyncToken};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, warn};

/// Everything one push sends.
#[derive(Debug, Clone, Default)]
pub struct PushJob {
    /// Domain state at the time the push was started.
    pub state: DomainState,
    /// Photo blobs that may not have reached the remote yet.
    pub photos: Vec<String>,
    /// Photo blobs of deleted items to remove remotely.
    pub deleted_photos: Vec<String>,
    /// Items deleted since the last successful push.
    pub deleted_items: Vec<ItemId>,
    /// Newest token this device has merged.
    pub observed: SyncToken,
}

/// Result of a successful push.
#[derive(Debug, Clone, PartialEq)]
pub struct PushReport {
    /// Token published after the push.
    pub token: SyncToken,
    /// Number of documents written.
    pub documents: usize,
    /// Number of blobs uploaded.
    pub blobs: usize,
    /// Remote changes from other devices that were merged into the pushed
    /// documents before overwriting them.
    pub merged: Option<FetchedSnapshot>,
}

/// Remote snapshots fetched by a pull.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedSnapshot {
    /// Remote token at fetch time.
    pub token: SyncToken,
    /// The decoded documents.
    pub snapshot: RemoteSnapshot,
}

/// Where a missing photo blob was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotoResolution {
    /// Downloaded from the remote blob area.
    Remote,
    /// Already present locally.
    Local,
    /// Not found anywhere.
    Unresolved,
}

/// Pushes and pulls whole domain documents.
#[derive(Clone)]
pub struct DocumentSync {
    mirror: Arc<dyn DocumentMirror>,
    token: Arc<dyn TokenSignal>,
}

impl DocumentSync {
    /// Creates the strategy over a mirror and token slot.
    pub fn new(mirror: Arc<dyn DocumentMirror>, token: Arc<dyn TokenSignal>) -> Self {
        Self { mirror, token }
    }

    /// Overwrites every remote document, uploads pending blobs and
    /// publishes a new sync token.
    ///
    /// If another device pushed since this device last merged, its
    /// documents are merged into the pushed state first, so the overwrite
    /// never drops changes this device has not seen. Items deleted since
    /// the last push stay deleted in the merged result.
    ///
    /// # Errors
    ///
    /// Returns the first remote failure. Documents written before the
    /// failure stay written; the caller retries the whole job later.
    pub async fn push(&self, job: &PushJob, local: &LocalStore) -> SyncResult<PushReport> {
        let remote_token = self.token.read_token().await?.unwrap_or_default();

        let mut state = job.state.clone();
        let merged = if remote_token.is_newer_than(job.observed) {
            let snapshot = self.fetch_documents().await?;
            let report = state.merge_remote(snapshot.clone());
            for id in &job.deleted_items {
                state.delete_item(id);
            }
            debug!(adopted = report.adopted(), "merged unseen remote changes before push");
            Some(FetchedSnapshot {
                token: remote_token,
                snapshot,
            })
        } else {
            None
        };

        let documents = LocalStore::documents(&state);
        for (domain, bytes) in &documents {
            let Some(name) = domain.file_name() else {
                continue;
            };
            self.mirror.push_document(name, bytes.clone()).await?;
        }

        let mut blobs = 0;
        for filename in &job.photos {
            if self.mirror.has_blob(filename).await? {
                continue;
            }
            match local.read_photo(filename) {
                Ok(Some(data)) => {
                    self.mirror.push_blob(filename, Bytes::from(data)).await?;
                    blobs += 1;
                }
                Ok(None) => debug!(filename, "photo blob missing locally, not uploaded"),
                Err(error) => warn!(filename, %error, "failed to read photo blob"),
            }
        }

        for filename in &job.deleted_photos {
            self.mirror.delete_blob(filename).await?;
        }

        let token = SyncToken::next_after(job.observed.max(remote_token), SyncToken::now());
        self.token.write_token(token).await?;

        Ok(PushReport {
            token,
            documents: documents.len(),
            blobs,
            merged,
        })
    }

    /// Fetches the remote documents if the remote token is newer than
    /// `observed`, or unconditionally when `force` is set.
    ///
    /// A document that fails to decode is treated as absent.
    ///
    /// # Errors
    ///
    /// Returns the first remote failure.
    pub async fn fetch(
        &self,
        observed: SyncToken,
        force: bool,
    ) -> SyncResult<Option<FetchedSnapshot>> {
        let remote_token = self.token.read_token().await?;
        let newer = remote_token.is_some_and(|token| token.is_newer_than(observed));
        if !newer && !force {
            debug!(%observed, "remote not newer, skipping pull");
            return Ok(None);
        }

        Ok(Some(FetchedSnapshot {
            token: remote_token.unwrap_or(observed).max(observed),
            snapshot: self.fetch_documents().await?,
        }))
    }

    /// Makes a referenced photo blob available locally.
    ///
    /// Checks the remote blob area first, then the local blob directory.
    pub async fn resolve_photo(&self, filename: &str, local: &LocalStore) -> PhotoResolution {
        match self.mirror.fetch_blob(filename).await {
            Ok(Some(data)) => match local.write_photo(filename, &data) {
                Ok(()) => return PhotoResolution::Remote,
                Err(error) => warn!(filename, %error, "failed to store downloaded photo"),
            },
            Ok(None) => {}
            Err(error) => warn!(filename, %error, "failed to fetch photo blob"),
        }

        if local.has_photo(filename) {
            PhotoResolution::Local
        } else {
            PhotoResolution::Unresolved
        }
    }

    async fn fetch_documents(&self) -> SyncResult<RemoteSnapshot> {
        Ok(RemoteSnapshot {
            recents: self.fetch_document(Domain::Recents).await?,
            photos: self.fetch_document(Domain::Photos).await?,
            locations: self.fetch_document(Domain::Locations).await?,
            user_items: self.fetch_document(Domain::UserItems).await?,
        })
    }

    async fn fetch_document<T: DeserializeOwned>(&self, domain: Domain) -> SyncResult<Option<T>> {
        let Some(name) = domain.file_name() else {
            return Ok(None);
        };
        let Some(bytes) = self.mirror.pull_document(name).await? else {
            return Ok(None);
        };
        match decode_snapshot(&bytes) {
            Ok(value) => Ok(Some(value)),
            Err(error) => {
                warn!(domain = %domain, %error, "malformed remote snapshot, ignoring");
                Ok(None)
            }
        }
    }
}

impl std::fmt::Debug for DocumentSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentSync").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryCloud, MemoryDevice};
    use curio_storage::InMemoryStore;

    fn sync(device: &MemoryDevice) -> DocumentSync {
        let remote = device.remote();
        DocumentSync::new(remote.mirror, remote.token)
    }

    fn local() -> LocalStore {
        LocalStore::new(Arc::new(InMemoryStore::new()))
    }

    fn job(state: &DomainState, observed: SyncToken) -> PushJob {
        PushJob {
            state: state.clone(),
            observed,
            ..PushJob::default()
        }
    }

    #[tokio::test]
    async fn push_then_fetch_on_other_device() {
        let cloud = MemoryCloud::new();
        let a = sync(&cloud.device());
        let b = sync(&cloud.device());

        let mut state = DomainState::default();
        state.add_recent(ItemId::from("a"));
        let report = a.push(&job(&state, SyncToken::ZERO), &local()).await.unwrap();
        assert_eq!(report.documents, 4);
        assert!(report.merged.is_none());
        assert_eq!(cloud.token(), Some(report.token));

        let fetched = b.fetch(SyncToken::ZERO, false).await.unwrap().unwrap();
        assert_eq!(fetched.token, report.token);
        assert_eq!(fetched.snapshot.recents, Some(state.recents));
    }

    #[tokio::test]
    async fn fetch_skips_when_not_newer() {
        let cloud = MemoryCloud::new();
        let device = cloud.device();
        let sync = sync(&device);

        assert!(sync.fetch(SyncToken::ZERO, false).await.unwrap().is_none());

        let report = sync
            .push(&job(&DomainState::default(), SyncToken::ZERO), &local())
            .await
            .unwrap();
        assert!(sync.fetch(report.token, false).await.unwrap().is_none());
        assert_eq!(cloud.calls("pull_document"), 0);

        assert!(sync.fetch(report.token, true).await.unwrap().is_some());
        assert_eq!(cloud.calls("pull_document"), 4);
    }

    #[tokio::test]
    async fn push_publishes_token_ahead_of_observed() {
        let cloud = MemoryCloud::new();
        let sync = sync(&cloud.device());
        let far_future = SyncToken::from_millis(u64::MAX / 2);

        let report = sync
            .push(&job(&DomainState::default(), far_future), &local())
            .await
            .unwrap();
        assert!(report.token.is_newer_than(far_future));
    }

    #[tokio::test]
    async fn push_merges_unseen_remote_changes_first() {
        let cloud = MemoryCloud::new();
        let a = sync(&cloud.device());
        let b = sync(&cloud.device());

        let mut a_state = DomainState::default();
        a_state.add_recent(ItemId::from("a"));
        let first = a.push(&job(&a_state, SyncToken::ZERO), &local()).await.unwrap();

        let mut b_state = DomainState::default();
        b_state.add_recent(ItemId::from("b"));
        let second = b.push(&job(&b_state, SyncToken::ZERO), &local()).await.unwrap();
        assert!(second.token.is_newer_than(first.token));

        let merged = second.merged.unwrap();
        assert_eq!(merged.token, first.token);
        assert_eq!(merged.snapshot.recents, Some(a_state.recents));

        let remote: curio_sync_protocol::RecentItems =
            decode_snapshot(&cloud.document("recents.json").unwrap()).unwrap();
        assert_eq!(remote.as_slice(), &[ItemId::from("b"), ItemId::from("a")]);
    }

    #[tokio::test]
    async fn pre_push_merge_keeps_local_deletes() {
        let cloud = MemoryCloud::new();
        let a = sync(&cloud.device());
        let b = sync(&cloud.device());

        let mut shared = DomainState::default();
        shared.add_recent(ItemId::from("x"));
        a.push(&job(&shared, SyncToken::ZERO), &local()).await.unwrap();

        let mut deleting = job(&DomainState::default(), SyncToken::ZERO);
        deleting.deleted_items = vec![ItemId::from("x")];
        b.push(&deleting, &local()).await.unwrap();

        let remote: curio_sync_protocol::RecentItems =
            decode_snapshot(&cloud.document("recents.json").unwrap()).unwrap();
        assert!(remote.is_empty());
    }

    #[tokio::test]
    async fn malformed_remote_document_is_ignored() {
        let cloud = MemoryCloud::new();
        let device = cloud.device();
        device
            .push_document("recents.json", b"{ broken".to_vec())
            .await
            .unwrap();
        device
            .push_document("artifacts.json", br#"{"x":"x.jpg"}"#.to_vec())
            .await
            .unwrap();

        let fetched = sync(&device).fetch(SyncToken::ZERO, true).await.unwrap().unwrap();
        assert_eq!(fetched.snapshot.recents, None);
        assert_eq!(fetched.snapshot.photos.unwrap().get(&"x".into()), Some("x.jpg"));
    }

    #[tokio::test]
    async fn push_uploads_missing_blobs_and_deletes_removed() {
        let cloud = MemoryCloud::new();
        let device = cloud.device();
        let sync = sync(&device);
        let local = local();
        local.write_photo("new.jpg", b"new").unwrap();
        device
            .push_blob("old.jpg", Bytes::from_static(b"old"))
            .await
            .unwrap();

        let job = PushJob {
            photos: vec!["new.jpg".into(), "gone.jpg".into()],
            deleted_photos: vec!["old.jpg".into()],
            ..PushJob::default()
        };
        let report = sync.push(&job, &local).await.unwrap();
        assert_eq!(report.blobs, 1);
        assert_eq!(cloud.blob("new.jpg"), Some(b"new".to_vec()));
        assert_eq!(cloud.blob("old.jpg"), None);
    }

    #[tokio::test]
    async fn photo_resolution_order() {
        let cloud = MemoryCloud::new();
        let device = cloud.device();
        let sync = sync(&device);
        let local = local();

        device
            .push_blob("remote.jpg", Bytes::from_static(b"r"))
            .await
            .unwrap();
        assert_eq!(
            sync.resolve_photo("remote.jpg", &local).await,
            PhotoResolution::Remote
        );
        assert_eq!(local.read_photo("remote.jpg").unwrap(), Some(b"r".to_vec()));

        local.write_photo("local.jpg", b"l").unwrap();
        assert_eq!(
            sync.resolve_photo("local.jpg", &local).await,
            PhotoResolution::Local
        );
        assert_eq!(
            sync.resolve_photo("nowhere.jpg", &local).await,
            PhotoResolution::Unresolved
        );
    }
}
