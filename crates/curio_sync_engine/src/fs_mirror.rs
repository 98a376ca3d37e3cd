//! Document mirror over a shared directory.
//!
//! Any directory every device can see works as a remote: a synced cloud
//! folder, a network share, a removable drive. The layout matches the
//! local data directory, plus a `sync_token.json` slot.

use crate::error::SyncResult;
use crate::local::photo_key;
use crate::remote::{AvailabilityProbe, DocumentMirror, Remote, TokenSignal};
use async_trait::async_trait;
use bytes::Bytes;
use curio_storage::{json, DocumentStore, FileStore};
use curio_sync_protocol::SyncToken;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;

const TOKEN_KEY: &str = "sync_token.json";

/// A [`DocumentMirror`] and [`TokenSignal`] backed by a directory.
///
/// Directories deliver no change notifications; devices using this mirror
/// rely on the periodic pull.
#[derive(Debug)]
pub struct FsMirror {
    store: FileStore,
}

impl FsMirror {
    /// Opens the mirror directory, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(root: &Path) -> SyncResult<Self> {
        Ok(Self {
            store: FileStore::shared(root)?,
        })
    }

    /// Returns the mirror directory.
    pub fn root(&self) -> &Path {
        self.store.root()
    }

    /// Wraps this mirror as the engine's remote. There is no record store.
    pub fn into_remote(self) -> Remote {
        let mirror = Arc::new(self);
        Remote::new(mirror.clone(), mirror.clone(), mirror)
    }
}

#[async_trait]
impl AvailabilityProbe for FsMirror {
    async fn check_availability(&self) -> bool {
        self.store.root().is_dir()
    }
}

#[async_trait]
impl DocumentMirror for FsMirror {
    async fn push_document(&self, name: &str, data: Vec<u8>) -> SyncResult<()> {
        Ok(self.store.write(name, &data)?)
    }

    async fn pull_document(&self, name: &str) -> SyncResult<Option<Vec<u8>>> {
        Ok(self.store.read(name)?)
    }

    async fn push_blob(&self, filename: &str, data: Bytes) -> SyncResult<()> {
        Ok(self.store.write(&photo_key(filename), &data)?)
    }

    async fn fetch_blob(&self, filename: &str) -> SyncResult<Option<Bytes>> {
        Ok(self.store.read(&photo_key(filename))?.map(Bytes::from))
    }

    async fn has_blob(&self, filename: &str) -> SyncResult<bool> {
        Ok(self.store.contains(&photo_key(filename))?)
    }

    async fn delete_blob(&self, filename: &str) -> SyncResult<()> {
        self.store.remove(&photo_key(filename))?;
        Ok(())
    }
}

#[async_trait]
impl TokenSignal for FsMirror {
    async fn read_token(&self) -> SyncResult<Option<SyncToken>> {
        let token: Option<SyncToken> = json::load_or_default(&self.store, TOKEN_KEY);
        Ok(token)
    }

    async fn write_token(&self, token: SyncToken) -> SyncResult<()> {
        Ok(json::save(&self.store, TOKEN_KEY, &token)?)
    }

    fn subscribe(&self) -> broadcast::Receiver<SyncToken> {
        broadcast::channel(1).1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn documents_blobs_and_token_round_trip_through_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = FsMirror::open(&dir.path().join("shared")).unwrap();
        assert!(mirror.check_availability().await);

        mirror
            .push_document("recents.json", b"[\"a\"]".to_vec())
            .await
            .unwrap();
        assert!(dir.path().join("shared/recents.json").exists());
        assert_eq!(mirror.pull_document("locations.json").await.unwrap(), None);

        mirror
            .push_blob("a.jpg", Bytes::from_static(b"jpeg"))
            .await
            .unwrap();
        assert!(mirror.has_blob("a.jpg").await.unwrap());
        assert!(dir.path().join("shared/photos/a.jpg").exists());
        mirror.delete_blob("a.jpg").await.unwrap();
        mirror.delete_blob("a.jpg").await.unwrap();
        assert_eq!(mirror.fetch_blob("a.jpg").await.unwrap(), None);

        assert_eq!(mirror.read_token().await.unwrap(), None);
        mirror.write_token(SyncToken::from_millis(7)).await.unwrap();
        assert_eq!(
            mirror.read_token().await.unwrap(),
            Some(SyncToken::from_millis(7))
        );
    }

    #[tokio::test]
    async fn two_mirrors_share_one_directory() {
        let dir = tempfile::tempdir().unwrap();
        let a = FsMirror::open(dir.path()).unwrap();
        let b = FsMirror::open(dir.path()).unwrap();

        a.write_token(SyncToken::from_millis(99)).await.unwrap();
        assert_eq!(b.read_token().await.unwrap(), Some(SyncToken::from_millis(99)));
    }

    #[tokio::test]
    async fn missing_directory_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("mirror");
        let mirror = FsMirror::open(&root).unwrap();
        std::fs::remove_dir_all(&root).unwrap();
        assert!(!mirror.check_availability().await);
    }
}
