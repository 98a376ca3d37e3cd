//! In-memory multi-device remote for tests and simulations.
//!
//! A [`MemoryCloud`] is the shared backend; each [`MemoryDevice`] is one
//! device's connection to it with its own availability switch. Change
//! notifications are fanned out to every device except the one that made
//! the change.

use crate::error::{SyncError, SyncResult};
use crate::local::photo_key;
use crate::remote::{
    AvailabilityProbe, DocumentMirror, QueryCursor, RecordPage, RecordQuery, RecordStore, Remote,
    TokenSignal,
};
use async_trait::async_trait;
use bytes::Bytes;
use curio_storage::{DocumentStore, InMemoryStore};
use curio_sync_protocol::{Record, RecordId, SyncToken, ZoneId};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

const NOTIFICATION_BUFFER: usize = 64;

/// A simulated shared backend.
#[derive(Clone, Default)]
pub struct MemoryCloud {
    inner: Arc<CloudInner>,
}

#[derive(Default)]
struct CloudInner {
    files: InMemoryStore,
    token: Mutex<Option<SyncToken>>,
    zones: RwLock<HashMap<ZoneId, BTreeMap<String, Record>>>,
    devices: Mutex<Vec<DeviceChannels>>,
    next_device: AtomicU64,
    next_tag: AtomicU64,
    failures: Mutex<HashMap<String, usize>>,
    conflicts: Mutex<usize>,
    calls: Mutex<HashMap<String, usize>>,
}

struct DeviceChannels {
    device: u64,
    tokens: broadcast::Sender<SyncToken>,
    records: broadcast::Sender<RecordId>,
    subscriptions: HashSet<(ZoneId, String)>,
}

impl MemoryCloud {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Connects a new, available device.
    pub fn device(&self) -> MemoryDevice {
        let device = self.inner.next_device.fetch_add(1, Ordering::SeqCst);
        let (tokens, _) = broadcast::channel(NOTIFICATION_BUFFER);
        let (records, _) = broadcast::channel(NOTIFICATION_BUFFER);
        self.inner.devices.lock().push(DeviceChannels {
            device,
            tokens,
            records,
            subscriptions: HashSet::new(),
        });
        MemoryDevice {
            cloud: self.clone(),
            device,
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Returns how many times the remote operation `op` was called.
    pub fn calls(&self, op: &str) -> usize {
        self.inner.calls.lock().get(op).copied().unwrap_or(0)
    }

    /// Returns the total number of remote operations called.
    pub fn total_calls(&self) -> usize {
        self.inner.calls.lock().values().sum()
    }

    /// Makes the next `times` calls of `op` fail with a retryable
    /// transport error.
    pub fn fail_next(&self, op: &str, times: usize) {
        self.inner.failures.lock().insert(op.to_string(), times);
    }

    /// Makes the next `times` record saves fail with a conflict.
    pub fn inject_conflicts(&self, times: usize) {
        *self.inner.conflicts.lock() = times;
    }

    /// Returns the remote document `name`.
    pub fn document(&self, name: &str) -> Option<Vec<u8>> {
        self.inner.files.read(name).ok().flatten()
    }

    /// Returns the remote blob `filename`.
    pub fn blob(&self, filename: &str) -> Option<Vec<u8>> {
        self.inner.files.read(&photo_key(filename)).ok().flatten()
    }

    /// Returns the current sync token.
    pub fn token(&self) -> Option<SyncToken> {
        *self.inner.token.lock()
    }

    /// Returns true if `zone` exists.
    pub fn has_zone(&self, zone: &ZoneId) -> bool {
        self.inner.zones.read().contains_key(zone)
    }

    /// Returns the stored version of a record.
    pub fn record(&self, id: &RecordId) -> Option<Record> {
        self.inner
            .zones
            .read()
            .get(&id.zone)
            .and_then(|records| records.get(&id.name))
            .cloned()
    }

    /// Returns every record in `zone`, ordered by name.
    pub fn records(&self, zone: &ZoneId) -> Vec<Record> {
        self.inner
            .zones
            .read()
            .get(zone)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Writes a record as another client would, bypassing change tags.
    pub fn put_record(&self, record: Record) -> Record {
        let stored = self.store_record(record);
        self.notify_record(None, &stored.id);
        stored
    }

    fn store_record(&self, mut record: Record) -> Record {
        record.change_tag = Some(self.inner.next_tag.fetch_add(1, Ordering::SeqCst) + 1);
        self.inner
            .zones
            .write()
            .entry(record.id.zone.clone())
            .or_default()
            .insert(record.id.name.clone(), record.clone());
        record
    }

    fn begin(&self, op: &str) -> SyncResult<()> {
        *self.inner.calls.lock().entry(op.to_string()).or_default() += 1;

        let mut failures = self.inner.failures.lock();
        if let Some(remaining) = failures.get_mut(op) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(SyncError::transport_retryable(format!("{op} failed")));
            }
        }
        Ok(())
    }

    fn notify_token(&self, origin: u64, token: SyncToken) {
        for channels in self.inner.devices.lock().iter() {
            if channels.device != origin {
                let _ = channels.tokens.send(token);
            }
        }
    }

    fn notify_record(&self, origin: Option<u64>, id: &RecordId) {
        for channels in self.inner.devices.lock().iter() {
            let subscribed = channels.subscriptions.iter().any(|(zone, _)| zone == &id.zone);
            if subscribed && Some(channels.device) != origin {
                let _ = channels.records.send(id.clone());
            }
        }
    }
}

impl std::fmt::Debug for MemoryCloud {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCloud")
            .field("documents", &self.inner.files.len())
            .field("token", &self.token())
            .finish_non_exhaustive()
    }
}

/// One device's connection to a [`MemoryCloud`].
#[derive(Clone)]
pub struct MemoryDevice {
    cloud: MemoryCloud,
    device: u64,
    available: Arc<AtomicBool>,
}

impl MemoryDevice {
    /// Simulates signing out or losing the network.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Returns the backend this device is connected to.
    pub fn cloud(&self) -> &MemoryCloud {
        &self.cloud
    }

    /// Returns this device's collaborators, record store included.
    pub fn remote(&self) -> Remote {
        let device = Arc::new(self.clone());
        Remote::new(device.clone(), device.clone(), device.clone()).with_records(device)
    }

    fn channels<T>(&self, pick: impl FnOnce(&DeviceChannels) -> T) -> Option<T> {
        self.cloud
            .inner
            .devices
            .lock()
            .iter()
            .find(|channels| channels.device == self.device)
            .map(pick)
    }
}

impl std::fmt::Debug for MemoryDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryDevice")
            .field("device", &self.device)
            .field("available", &self.available.load(Ordering::SeqCst))
            .finish()
    }
}

#[async_trait]
impl AvailabilityProbe for MemoryDevice {
    async fn check_availability(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentMirror for MemoryDevice {
    async fn push_document(&self, name: &str, data: Vec<u8>) -> SyncResult<()> {
        self.cloud.begin("push_document")?;
        self.cloud.inner.files.write(name, &data)?;
        Ok(())
    }

    async fn pull_document(&self, name: &str) -> SyncResult<Option<Vec<u8>>> {
        self.cloud.begin("pull_document")?;
        Ok(self.cloud.inner.files.read(name)?)
    }

    async fn push_blob(&self, filename: &str, data: Bytes) -> SyncResult<()> {
        self.cloud.begin("push_blob")?;
        self.cloud.inner.files.write(&photo_key(filename), &data)?;
        Ok(())
    }

    async fn fetch_blob(&self, filename: &str) -> SyncResult<Option<Bytes>> {
        self.cloud.begin("fetch_blob")?;
        Ok(self
            .cloud
            .inner
            .files
            .read(&photo_key(filename))?
            .map(Bytes::from))
    }

    async fn has_blob(&self, filename: &str) -> SyncResult<bool> {
        self.cloud.begin("has_blob")?;
        Ok(self.cloud.inner.files.contains(&photo_key(filename))?)
    }

    async fn delete_blob(&self, filename: &str) -> SyncResult<()> {
        self.cloud.begin("delete_blob")?;
        self.cloud.inner.files.remove(&photo_key(filename))?;
        Ok(())
    }
}

#[async_trait]
impl TokenSignal for MemoryDevice {
    async fn read_token(&self) -> SyncResult<Option<SyncToken>> {
        self.cloud.begin("read_token")?;
        Ok(self.cloud.token())
    }

    async fn write_token(&self, token: SyncToken) -> SyncResult<()> {
        self.cloud.begin("write_token")?;
        *self.cloud.inner.token.lock() = Some(token);
        self.cloud.notify_token(self.device, token);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<SyncToken> {
        self.channels(|channels| channels.tokens.subscribe())
            .unwrap_or_else(|| broadcast::channel(1).1)
    }
}

#[async_trait]
impl RecordStore for MemoryDevice {
    async fn ensure_zone(&self, zone: &ZoneId) -> SyncResult<()> {
        self.cloud.begin("ensure_zone")?;
        self.cloud
            .inner
            .zones
            .write()
            .entry(zone.clone())
            .or_default();
        Ok(())
    }

    async fn save(&self, record: Record) -> SyncResult<Record> {
        self.cloud.begin("save")?;
        if !self.cloud.has_zone(&record.id.zone) {
            return Err(SyncError::ZoneNotFound(record.id.zone.to_string()));
        }

        {
            let mut conflicts = self.cloud.inner.conflicts.lock();
            if *conflicts > 0 {
                *conflicts -= 1;
                return Err(SyncError::Conflict(record.id));
            }
        }

        let stored_tag = self.cloud.record(&record.id).and_then(|stored| stored.change_tag);
        if stored_tag != record.change_tag {
            return Err(SyncError::Conflict(record.id));
        }

        let stored = self.cloud.store_record(record);
        self.cloud.notify_record(Some(self.device), &stored.id);
        Ok(stored)
    }

    async fn fetch(&self, id: &RecordId) -> SyncResult<Option<Record>> {
        self.cloud.begin("fetch")?;
        Ok(self.cloud.record(id))
    }

    async fn query(
        &self,
        query: &RecordQuery,
        cursor: Option<QueryCursor>,
        limit: usize,
    ) -> SyncResult<RecordPage> {
        self.cloud.begin("query")?;
        let offset = match cursor {
            Some(QueryCursor(position)) => position
                .parse::<usize>()
                .map_err(|_| SyncError::transport_fatal("invalid query cursor"))?,
            None => 0,
        };

        let zones = self.cloud.inner.zones.read();
        let Some(zone) = zones.get(&query.zone) else {
            return Err(SyncError::ZoneNotFound(query.zone.to_string()));
        };
        let matching: Vec<&Record> = zone
            .values()
            .filter(|record| record.kind == query.kind)
            .collect();

        let limit = limit.max(1);
        let end = (offset + limit).min(matching.len());
        let records = matching
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .map(|record| (*record).clone())
            .collect();
        let cursor = (end < matching.len()).then(|| QueryCursor(end.to_string()));
        Ok(RecordPage { records, cursor })
    }

    async fn delete(&self, id: &RecordId) -> SyncResult<()> {
        self.cloud.begin("delete")?;
        let removed = self
            .cloud
            .inner
            .zones
            .write()
            .get_mut(&id.zone)
            .and_then(|records| records.remove(&id.name));
        match removed {
            Some(_) => {
                self.cloud.notify_record(Some(self.device), id);
                Ok(())
            }
            None => Err(SyncError::NotFound(id.clone())),
        }
    }

    async fn subscribe(&self, zone: &ZoneId, subscription: &str) -> SyncResult<()> {
        self.cloud.begin("subscribe")?;
        let mut devices = self.cloud.inner.devices.lock();
        if let Some(channels) = devices
            .iter_mut()
            .find(|channels| channels.device == self.device)
        {
            channels
                .subscriptions
                .insert((zone.clone(), subscription.to_string()));
        }
        Ok(())
    }

    fn changes(&self) -> broadcast::Receiver<RecordId> {
        self.channels(|channels| channels.records.subscribe())
            .unwrap_or_else(|| broadcast::channel(1).1)
    }
}
