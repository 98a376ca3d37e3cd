//! Record strategy: per-record sync with optimistic concurrency.

use crate::error::{SyncError, SyncResult};
use crate::local::LocalStore;
use crate::remote::{QueryCursor, RecordQuery, RecordStore};
use bytes::Bytes;
use curio_sync_protocol::{CatalogItem, ItemId, PhotoRecord, Record, RecordId, RecordKind, ZoneId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// A record write waiting for the next push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) enum RecordOp {
    /// Upsert a user-authored item.
    Item(CatalogItem),
    /// Upsert the photo of an item from its local blob.
    Photo { item: ItemId, filename: String },
    /// Delete the item and photo records of an item.
    Delete(ItemId),
}

/// Catalog items and photos fetched from the record store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPull {
    /// Decoded catalog items.
    pub items: Vec<CatalogItem>,
    /// `(item, filename)` of every photo materialized locally.
    pub photos: Vec<(ItemId, String)>,
}

/// Record-store operations scoped to one zone.
pub struct RecordSync {
    store: Arc<dyn RecordStore>,
    zone: ZoneId,
    page_size: usize,
    change_tags: Mutex<HashMap<RecordId, u64>>,
}

impl RecordSync {
    /// Creates the strategy for `zone`.
    pub fn new(store: Arc<dyn RecordStore>, zone: ZoneId, page_size: usize) -> Self {
        Self {
            store,
            zone,
            page_size: page_size.max(1),
            change_tags: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the zone.
    pub fn zone(&self) -> &ZoneId {
        &self.zone
    }

    /// Saves a record.
    ///
    /// On a concurrent-modification conflict the server version is fetched,
    /// the caller's fields are reapplied on top of it and the save is retried
    /// exactly once.
    ///
    /// # Errors
    ///
    /// Returns the error of the retried save, or any non-conflict failure.
    pub async fn upsert(&self, mut record: Record) -> SyncResult<Record> {
        if record.change_tag.is_none() {
            record.change_tag = self.change_tags.lock().get(&record.id).copied();
        }

        let saved = match self.store.save(record.clone()).await {
            Ok(saved) => saved,
            Err(SyncError::Conflict(id)) => {
                debug!(record = %id, "record modified concurrently, reapplying fields");
                let retry = match self.store.fetch(&id).await? {
                    Some(mut server) => {
                        server.reapply_fields(&record);
                        server
                    }
                    None => Record {
                        change_tag: None,
                        ..record
                    },
                };
                self.store.save(retry).await?
            }
            Err(error) => return Err(error),
        };

        self.remember(&saved);
        Ok(saved)
    }

    /// Starts a paged query over all records of `kind` in the zone.
    pub fn query(&self, kind: RecordKind) -> RecordPages {
        RecordPages::new(
            self.store.clone(),
            RecordQuery::new(self.zone.clone(), kind),
            self.page_size,
        )
    }

    /// Deletes a record. Deleting a missing record succeeds.
    ///
    /// # Errors
    ///
    /// Returns any failure other than the record being absent.
    pub async fn delete(&self, id: &RecordId) -> SyncResult<()> {
        self.change_tags.lock().remove(id);
        match self.store.delete(id).await {
            Ok(()) | Err(SyncError::NotFound(_)) => Ok(()),
            Err(error) => Err(error),
        }
    }

    /// Upserts the catalog record of a user-authored item.
    ///
    /// # Errors
    ///
    /// Returns an error if the item cannot be encoded or saved.
    pub async fn push_item(&self, item: &CatalogItem) -> SyncResult<Record> {
        self.upsert(item.to_record(self.zone.clone())?).await
    }

    /// Upserts the photo record of `item` from its local blob.
    ///
    /// Returns `None` if the blob no longer exists locally.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob cannot be read or the save fails.
    pub async fn push_photo(
        &self,
        item: &ItemId,
        filename: &str,
        local: &LocalStore,
    ) -> SyncResult<Option<Record>> {
        let Some(data) = local.read_photo(filename)? else {
            debug!(item_id = %item, filename, "photo blob gone, skipping record");
            return Ok(None);
        };
        let photo = PhotoRecord {
            item_id: item.clone(),
            filename: filename.to_string(),
            asset: Bytes::from(data),
        };
        self.upsert(photo.to_record(self.zone.clone())).await.map(Some)
    }

    /// Deletes the catalog and photo records of `item`.
    ///
    /// # Errors
    ///
    /// Returns the first delete failure.
    pub async fn delete_item(&self, item: &ItemId) -> SyncResult<()> {
        self.delete(&RecordId::catalog_item(self.zone.clone(), item))
            .await?;
        self.delete(&RecordId::photo(self.zone.clone(), item)).await
    }

    /// Fetches every catalog and photo record in the zone.
    ///
    /// Photo assets are copied into the local blob directory, replacing any
    /// stale copy. Records that fail to decode are skipped.
    ///
    /// # Errors
    ///
    /// Returns the first query failure.
    pub async fn pull(&self, local: &LocalStore) -> SyncResult<RecordPull> {
        let mut pull = RecordPull::default();

        for record in self.query(RecordKind::CatalogItem).collect_all().await? {
            self.remember(&record);
            match CatalogItem::from_record(&record) {
                Ok(item) => pull.items.push(item),
                Err(error) => warn!(record = %record.id, %error, "skipping undecodable record"),
            }
        }

        for record in self.query(RecordKind::Photo).collect_all().await? {
            self.remember(&record);
            let photo = match PhotoRecord::from_record(&record) {
                Ok(photo) => photo,
                Err(error) => {
                    warn!(record = %record.id, %error, "skipping undecodable record");
                    continue;
                }
            };
            if photo.filename.contains('/') {
                warn!(record = %record.id, "photo filename is not a plain name, skipping");
                continue;
            }
            match local.write_photo(&photo.filename, &photo.asset) {
                Ok(()) => pull.photos.push((photo.item_id, photo.filename)),
                Err(error) => warn!(filename = %photo.filename, %error, "failed to store photo asset"),
            }
        }

        debug!(
            items = pull.items.len(),
            photos = pull.photos.len(),
            "pulled records"
        );
        Ok(pull)
    }

    pub(crate) async fn apply(&self, op: &RecordOp, local: &LocalStore) -> SyncResult<()> {
        match op {
            RecordOp::Item(item) => self.push_item(item).await.map(|_| ()),
            RecordOp::Photo { item, filename } => {
                self.push_photo(item, filename, local).await.map(|_| ())
            }
            RecordOp::Delete(item) => self.delete_item(item).await,
        }
    }

    fn remember(&self, record: &Record) {
        if let Some(tag) = record.change_tag {
            self.change_tags.lock().insert(record.id.clone(), tag);
        }
    }
}

impl std::fmt::Debug for RecordSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordSync")
            .field("zone", &self.zone)
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

/// A lazy, finite, non-restartable sequence of query result pages.
///
/// Pages are requested until the store stops returning a cursor. Once
/// exhausted the sequence stays exhausted; a fresh query starts over.
pub struct RecordPages {
    store: Arc<dyn RecordStore>,
    query: RecordQuery,
    page_size: usize,
    cursor: Option<QueryCursor>,
    exhausted: bool,
    pages: usize,
}

impl RecordPages {
    fn new(store: Arc<dyn RecordStore>, query: RecordQuery, page_size: usize) -> Self {
        Self {
            store,
            query,
            page_size,
            cursor: None,
            exhausted: false,
            pages: 0,
        }
    }

    /// Fetches the next page, or `None` once the results are exhausted.
    ///
    /// # Errors
    ///
    /// Returns the store's failure. A failed page can be requested again.
    pub async fn next_page(&mut self) -> SyncResult<Option<Vec<Record>>> {
        if self.exhausted {
            return Ok(None);
        }

        let page = self
            .store
            .query(&self.query, self.cursor.clone(), self.page_size)
            .await?;
        self.pages += 1;
        self.cursor = page.cursor;
        self.exhausted = self.cursor.is_none();
        Ok(Some(page.records))
    }

    /// Fetches every remaining page and concatenates the records.
    ///
    /// # Errors
    ///
    /// Returns the first page failure.
    pub async fn collect_all(mut self) -> SyncResult<Vec<Record>> {
        let mut records = Vec::new();
        while let Some(page) = self.next_page().await? {
            records.extend(page);
        }
        Ok(records)
    }

    /// Returns the number of pages fetched so far.
    pub fn pages_fetched(&self) -> usize {
        self.pages
    }

    /// Returns true once the last page has been fetched.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

impl std::fmt::Debug for RecordPages {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordPages")
            .field("query", &self.query)
            .field("pages", &self.pages)
            .field("exhausted", &self.exhausted)
            .finish_non_exhaustive()
    }
}
