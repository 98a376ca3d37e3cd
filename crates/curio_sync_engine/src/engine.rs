//! The sync engine actor and its handle.
//!
//! One actor task owns the [`DomainState`]. Every mutation, read, timer
//! and lifecycle event reaches it as a command over a bounded channel,
//! so no two callers ever interleave their access to the state. Remote I/O
//! runs in spawned tasks that report back with a completion command; the
//! actor itself never awaits anything but its channel.

use crate::availability::AvailabilityMonitor;
use crate::config::SyncConfig;
use crate::document::{DocumentSync, PhotoResolution, PushJob, PushReport};
use crate::error::{SyncError, SyncResult};
use crate::local::{LocalStore, PendingSync};
use crate::records::{RecordOp, RecordPull, RecordSync};
use crate::remote::Remote;
use crate::scheduler::{Scheduler, SchedulerState};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use curio_storage::DocumentStore;
use curio_sync_protocol::{
    CatalogItem, Domain, DomainState, ItemId, LocalPriorityMerge, LocationRecord, Locations,
    PhotoRefs, RecentItems, RemoteSnapshot, SyncToken, UserItems,
};
use parking_lot::Mutex;
use std::collections::{BTreeSet, VecDeque};
use std::future::Future;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Application lifecycle transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The application moved to the background: push pending changes now.
    EnteredBackground,
    /// The application became active: pull now.
    BecameActive,
}

/// Result of [`SyncEngine::force_sync`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Pushed and pulled; `adopted` remote entries were merged locally.
    Synced {
        /// Number of remote entries adopted.
        adopted: usize,
    },
    /// Another sync was running; this request was dropped.
    AlreadySyncing,
    /// The remote backend is unavailable; nothing was sent.
    Unavailable,
    /// A remote failure deferred the sync to the next trigger.
    Deferred {
        /// Description of the failure.
        reason: String,
    },
    /// The engine has shut down.
    Stopped,
}

/// Snapshot of the engine's sync bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStatus {
    /// Completion time of the last successful push or pull.
    pub last_sync: Option<DateTime<Utc>>,
    /// True while remote I/O is running.
    pub syncing: bool,
    /// Result of the last availability check.
    pub available: bool,
    /// Push scheduler state.
    pub scheduler: SchedulerState,
    /// True if local changes have not reached the remote yet.
    pub pending_changes: bool,
    /// Photo references the last pull could not resolve to a blob.
    pub unresolved_photos: usize,
    /// Newest remote token merged into local state.
    pub last_seen_token: SyncToken,
}

/// Handle to a running sync engine.
///
/// Cloning the handle is cheap; the engine stops when the last handle is
/// dropped or [`SyncEngine::shutdown`] is called. Mutations always apply
/// locally first and never report remote failures.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    commands: mpsc::Sender<Command>,
    device_id: Uuid,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        for task in self.background.lock().drain(..) {
            task.abort();
        }
    }
}

impl SyncEngine {
    /// Loads local state and starts the engine.
    ///
    /// An initial pull is queued as if the application had just become
    /// active. `catalog` is the read-only baseline that user-authored items
    /// are overlaid on.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn start(
        config: SyncConfig,
        store: Arc<dyn DocumentStore>,
        remote: Remote,
        catalog: Vec<CatalogItem>,
    ) -> Self {
        let local = LocalStore::new(store);
        let state = local.load_state();
        let pending = local.load_pending();
        let record_store = remote.records.clone().filter(|_| config.record_sync);

        let context = Arc::new(RemoteContext {
            monitor: AvailabilityMonitor::new(
                remote.availability.clone(),
                record_store.clone(),
                config.zone.clone(),
            ),
            documents: DocumentSync::new(remote.mirror.clone(), remote.token.clone()),
            records: record_store
                .clone()
                .map(|records| RecordSync::new(records, config.zone.clone(), config.page_size)),
            local: local.clone(),
        });

        info!(
            device_id = %config.device_id,
            zone = %config.zone,
            recents = state.recents.len(),
            photos = state.photos.len(),
            user_items = state.user_items.len(),
            pending_deletes = pending.deleted_items.len(),
            pending_records = pending.record_ops.len(),
            "starting sync engine"
        );

        let (sender, receiver) = mpsc::channel(config.command_buffer.max(1));
        let _ = sender.try_send(Command::Lifecycle(LifecycleEvent::BecameActive));

        let mut background = vec![
            spawn_pull_ticker(sender.downgrade(), config.pull_interval),
            spawn_change_listener(remote.token.subscribe(), sender.downgrade()),
        ];
        if let Some(records) = &record_store {
            background.push(spawn_change_listener(records.changes(), sender.downgrade()));
        }

        let device_id = config.device_id;
        let actor = Actor {
            pending_photos: state.photos.iter().map(|(_, name)| name.to_string()).collect(),
            record_sync: record_store.is_some(),
            config,
            state,
            catalog,
            local,
            context,
            scheduler: Scheduler::new(),
            commands: sender.downgrade(),
            last_seen: pending.last_seen,
            last_sync: None,
            unresolved_photos: 0,
            deleted_photos: pending.deleted_photos,
            deleted_items: pending.deleted_items,
            record_ops: pending.record_ops.into(),
            in_flight: PendingSync::default(),
        };
        tokio::spawn(actor.run(receiver));

        Self {
            inner: Arc::new(EngineInner {
                commands: sender,
                device_id,
                background: Mutex::new(background),
            }),
        }
    }

    /// Returns this installation's device id.
    pub fn device_id(&self) -> Uuid {
        self.inner.device_id
    }

    /// Marks an item as viewed.
    pub async fn add_recent(&self, id: impl Into<ItemId>) {
        self.send(Command::AddRecent(id.into())).await;
    }

    /// Creates or replaces a user-authored item.
    pub async fn upsert_item(&self, item: CatalogItem) {
        self.send(Command::UpsertItem(item)).await;
    }

    /// Stores a captured photo for an item, replacing any previous photo.
    ///
    /// Returns the blob filename, or `None` if the photo could not be
    /// written locally.
    pub async fn save_artifact_photo(
        &self,
        data: impl Into<Bytes>,
        id: impl Into<ItemId>,
    ) -> Option<String> {
        let (reply, response) = oneshot::channel();
        let command = Command::SavePhoto {
            data: data.into(),
            item: id.into(),
            reply,
        };
        if !self.send(command).await {
            return None;
        }
        response.await.ok().flatten()
    }

    /// Stores where an item was captured.
    pub async fn capture_location(&self, location: LocationRecord, id: impl Into<ItemId>) {
        let command = Command::CaptureLocation {
            item: id.into(),
            location,
        };
        self.send(command).await;
    }

    /// Removes an item from every domain and from the remote.
    pub async fn delete_item(&self, id: impl Into<ItemId>) {
        self.send(Command::DeleteItem(id.into())).await;
    }

    /// Pushes pending changes, then pulls regardless of the sync token.
    pub async fn force_sync(&self) -> SyncOutcome {
        let (reply, response) = oneshot::channel();
        if !self.send(Command::ForceSync(reply)).await {
            return SyncOutcome::Stopped;
        }
        response.await.unwrap_or(SyncOutcome::Stopped)
    }

    /// Reports an application lifecycle transition.
    pub async fn lifecycle(&self, event: LifecycleEvent) {
        self.send(Command::Lifecycle(event)).await;
    }

    /// The application moved to the background: pushes pending changes
    /// immediately, skipping the debounce window.
    ///
    /// This is a no-op when there are no pending changes, and the push is
    /// dropped if another sync is already running.
    pub async fn enter_background(&self) {
        self.lifecycle(LifecycleEvent::EnteredBackground).await;
    }

    /// The application became active.
    pub async fn become_active(&self) {
        self.lifecycle(LifecycleEvent::BecameActive).await;
    }

    /// Another device reported a change; pull if the remote is newer.
    pub async fn notify_remote_change(&self) {
        self.send(Command::RemoteChanged).await;
    }

    /// Returns the recently viewed items.
    pub async fn recents(&self) -> RecentItems {
        self.read(|actor| actor.state.recents.clone())
            .await
            .unwrap_or_default()
    }

    /// Returns the photo references.
    pub async fn photo_refs(&self) -> PhotoRefs {
        self.read(|actor| actor.state.photos.clone())
            .await
            .unwrap_or_default()
    }

    /// Returns the capture locations.
    pub async fn locations(&self) -> Locations {
        self.read(|actor| actor.state.locations.clone())
            .await
            .unwrap_or_default()
    }

    /// Returns the user-authored items.
    pub async fn user_items(&self) -> UserItems {
        self.read(|actor| actor.state.user_items.clone())
            .await
            .unwrap_or_default()
    }

    /// Returns the catalog with user-authored items merged in.
    pub async fn items(&self) -> Vec<CatalogItem> {
        self.read(|actor| actor.state.items(&actor.catalog))
            .await
            .unwrap_or_default()
    }

    /// Returns the photo bytes stored for an item.
    pub async fn photo_bytes(&self, id: impl Into<ItemId>) -> Option<Bytes> {
        let id = id.into();
        self.read(move |actor| {
            let filename = actor.state.photos.get(&id)?;
            match actor.local.read_photo(filename) {
                Ok(data) => data.map(Bytes::from),
                Err(error) => {
                    warn!(item_id = %id, %error, "failed to read photo blob");
                    None
                }
            }
        })
        .await
        .flatten()
    }

    /// Returns the sync status.
    pub async fn status(&self) -> SyncStatus {
        self.read(Actor::status).await.unwrap_or_default()
    }

    /// Stops the engine after persisting every domain and the pending
    /// sync bookkeeping.
    ///
    /// In-flight remote calls are allowed to finish; their results are
    /// discarded.
    pub async fn shutdown(&self) {
        let (reply, response) = oneshot::channel();
        if self.send(Command::Shutdown(reply)).await {
            let _ = response.await;
        }
        for task in self.inner.background.lock().drain(..) {
            task.abort();
        }
    }

    async fn send(&self, command: Command) -> bool {
        if self.inner.commands.send(command).await.is_err() {
            debug!("sync engine stopped, command dropped");
            return false;
        }
        true
    }

    async fn read<T, F>(&self, read: F) -> Option<T>
    where
        T: Send + 'static,
        F: FnOnce(&Actor) -> T + Send + 'static,
    {
        let (reply, response) = oneshot::channel();
        let command = Command::Read(Box::new(move |actor: &Actor| {
            let _ = reply.send(read(actor));
        }));
        if !self.send(command).await {
            return None;
        }
        response.await.ok()
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("device_id", &self.inner.device_id)
            .finish_non_exhaustive()
    }
}

type ReadFn = Box<dyn FnOnce(&Actor) + Send>;

enum Command {
    AddRecent(ItemId),
    UpsertItem(CatalogItem),
    SavePhoto {
        data: Bytes,
        item: ItemId,
        reply: oneshot::Sender<Option<String>>,
    },
    CaptureLocation {
        item: ItemId,
        location: LocationRecord,
    },
    DeleteItem(ItemId),
    ForceSync(oneshot::Sender<SyncOutcome>),
    Lifecycle(LifecycleEvent),
    RemoteChanged,
    PullTick,
    DebounceElapsed(u64),
    PushFinished(PushDone),
    PullFinished(SyncResult<Option<Pulled>>),
    FullSyncFinished {
        push: PushDone,
        pull: Option<SyncResult<Option<Pulled>>>,
        reply: oneshot::Sender<SyncOutcome>,
    },
    Read(ReadFn),
    Shutdown(oneshot::Sender<()>),
}

/// Remote collaborators shared by the spawned sync tasks.
struct RemoteContext {
    monitor: AvailabilityMonitor,
    documents: DocumentSync,
    records: Option<RecordSync>,
    local: LocalStore,
}

/// Remote data brought back by a pull, ready to merge.
struct Pulled {
    token: SyncToken,
    snapshot: RemoteSnapshot,
    records: Option<RecordPull>,
    unresolved: usize,
}

struct PushDone {
    job: PushJob,
    unapplied: VecDeque<RecordOp>,
    result: SyncResult<(PushReport, Option<Pulled>)>,
}

impl RemoteContext {
    async fn push(&self, job: PushJob, mut ops: VecDeque<RecordOp>) -> PushDone {
        if !self.monitor.check().await {
            return PushDone {
                job,
                unapplied: ops,
                result: Err(SyncError::Unavailable),
            };
        }

        if let Some(records) = &self.records {
            while let Some(op) = ops.front() {
                if let Err(error) = records.apply(op, &self.local).await {
                    return PushDone {
                        job,
                        unapplied: ops,
                        result: Err(error),
                    };
                }
                ops.pop_front();
            }
        }

        let result = match self.documents.push(&job, &self.local).await {
            Ok(mut report) => {
                let pulled = match report.merged.take() {
                    Some(fetched) => Some(Pulled {
                        token: fetched.token,
                        unresolved: self
                            .resolve_photos(&fetched.snapshot, &job.state.photos)
                            .await,
                        records: self.pull_records().await,
                        snapshot: fetched.snapshot,
                    }),
                    None => None,
                };
                Ok((report, pulled))
            }
            Err(error) => Err(error),
        };
        PushDone {
            job,
            unapplied: ops,
            result,
        }
    }

    async fn pull(
        &self,
        observed: SyncToken,
        force: bool,
        local_photos: PhotoRefs,
    ) -> SyncResult<Option<Pulled>> {
        if !self.monitor.check().await {
            return Err(SyncError::Unavailable);
        }
        let Some(fetched) = self.documents.fetch(observed, force).await? else {
            return Ok(None);
        };

        let records = self.pull_records().await;
        let unresolved = self.resolve_photos(&fetched.snapshot, &local_photos).await;
        Ok(Some(Pulled {
            token: fetched.token,
            snapshot: fetched.snapshot,
            records,
            unresolved,
        }))
    }

    async fn pull_records(&self) -> Option<RecordPull> {
        let records = self.records.as_ref()?;
        match records.pull(&self.local).await {
            Ok(pull) => Some(pull),
            Err(error) => {
                warn!(%error, "record pull failed, merging documents only");
                None
            }
        }
    }

    /// Resolves remote photo references that would be adopted but whose
    /// blob is missing locally. Returns the number left unresolved.
    async fn resolve_photos(&self, snapshot: &RemoteSnapshot, local_photos: &PhotoRefs) -> usize {
        let Some(remote) = &snapshot.photos else {
            return 0;
        };

        let mut unresolved = 0;
        for (id, filename) in remote.iter() {
            if local_photos.get(id).is_some() || self.local.has_photo(filename) {
                continue;
            }
            match self.documents.resolve_photo(filename, &self.local).await {
                PhotoResolution::Remote => debug!(item_id = %id, filename, "downloaded photo"),
                PhotoResolution::Local => {}
                PhotoResolution::Unresolved => {
                    debug!(item_id = %id, filename, "photo blob not found");
                    unresolved += 1;
                }
            }
        }
        unresolved
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Merged {
    adopted: usize,
    changed: bool,
}

struct Actor {
    config: SyncConfig,
    state: DomainState,
    catalog: Vec<CatalogItem>,
    local: LocalStore,
    context: Arc<RemoteContext>,
    record_sync: bool,
    scheduler: Scheduler,
    commands: mpsc::WeakSender<Command>,
    last_seen: SyncToken,
    last_sync: Option<DateTime<Utc>>,
    unresolved_photos: usize,
    pending_photos: BTreeSet<String>,
    deleted_photos: Vec<String>,
    deleted_items: Vec<ItemId>,
    record_ops: VecDeque<RecordOp>,
    /// Work handed to the running push, kept until it lands.
    in_flight: PendingSync,
}

impl Actor {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        if self.pending().has_work() {
            debug!("changes left from a previous session");
            self.note_write();
        }
        while let Some(command) = commands.recv().await {
            if self.handle(command).is_break() {
                break;
            }
        }
        info!(device_id = %self.config.device_id, "sync engine stopped");
    }

    fn handle(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::AddRecent(id) => {
                if self.state.add_recent(id) {
                    self.persist(&[Domain::Recents]);
                    self.note_write();
                }
            }
            Command::UpsertItem(item) => {
                self.state.user_items.upsert(item.clone());
                self.persist(&[Domain::UserItems]);
                if self.record_sync {
                    self.record_ops.push_back(RecordOp::Item(item));
                    self.persist_pending();
                }
                self.note_write();
            }
            Command::SavePhoto { data, item, reply } => {
                let _ = reply.send(self.save_photo(&data, item));
            }
            Command::CaptureLocation { item, location } => {
                self.state.locations.set(item, location);
                self.persist(&[Domain::Locations]);
                self.note_write();
            }
            Command::DeleteItem(id) => self.delete_item(id),
            Command::ForceSync(reply) => self.force_sync(reply),
            Command::Lifecycle(LifecycleEvent::EnteredBackground) => self.push_now(),
            Command::Lifecycle(LifecycleEvent::BecameActive) | Command::RemoteChanged => {
                self.start_pull();
            }
            Command::PullTick => {
                if let Some(generation) = self.scheduler.tick() {
                    self.arm_debounce(generation);
                }
                self.start_pull();
            }
            Command::DebounceElapsed(generation) => {
                if self.scheduler.debounce_elapsed(generation) {
                    self.spawn_push();
                } else {
                    debug!(generation, "debounce timer ignored");
                }
            }
            Command::PushFinished(done) => {
                let pushed = self.apply_push(done).is_ok();
                self.finish_sync(Some(pushed), false);
            }
            Command::PullFinished(result) => {
                let repush = match self.apply_pull(result) {
                    Ok(merged) => merged.changed,
                    Err(error) => {
                        log_deferred("pull", &error);
                        false
                    }
                };
                self.finish_sync(None, repush);
            }
            Command::FullSyncFinished { push, pull, reply } => {
                self.full_sync_finished(push, pull, reply);
            }
            Command::Read(read) => read(&*self),
            Command::Shutdown(reply) => {
                self.persist(&Domain::DOCUMENTS);
                self.persist_pending();
                let _ = reply.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn status(&self) -> SyncStatus {
        SyncStatus {
            last_sync: self.last_sync,
            syncing: self.scheduler.is_syncing(),
            available: self.context.monitor.is_available(),
            scheduler: self.scheduler.state(),
            pending_changes: self.scheduler.is_dirty() || self.scheduler.state().is_active(),
            unresolved_photos: self.unresolved_photos,
            last_seen_token: self.last_seen,
        }
    }

    fn persist(&self, domains: &[Domain]) {
        self.local.save_all(&self.state, domains);
    }

    /// Pending work, including what the running push has not landed yet.
    fn pending(&self) -> PendingSync {
        let mut pending = self.in_flight.clone();
        pending.last_seen = self.last_seen;
        pending.deleted_items.extend(self.deleted_items.iter().cloned());
        pending.deleted_photos.extend(self.deleted_photos.iter().cloned());
        pending.record_ops.extend(self.record_ops.iter().cloned());
        pending
    }

    fn persist_pending(&self) {
        self.local.save_pending(&self.pending());
    }

    fn save_photo(&mut self, data: &[u8], item: ItemId) -> Option<String> {
        let filename = photo_filename(&item);
        if let Err(error) = self.local.write_photo(&filename, data) {
            warn!(item_id = %item, %error, "failed to store photo");
            return None;
        }

        if let Some(previous) = self.state.photos.set(item.clone(), filename.clone()) {
            self.local.remove_photo(&previous);
            self.pending_photos.remove(&previous);
            self.deleted_photos.push(previous);
        }
        self.pending_photos.insert(filename.clone());
        self.persist(&[Domain::Photos]);

        if self.record_sync {
            self.record_ops.push_back(RecordOp::Photo {
                item,
                filename: filename.clone(),
            });
        }
        self.persist_pending();
        self.note_write();
        Some(filename)
    }

    fn delete_item(&mut self, id: ItemId) {
        let deleted = self.state.delete_item(&id);
        let removed = deleted.removed_anything();
        if removed {
            self.persist(&deleted.domains);
            debug!(item_id = %id, domains = deleted.domains.len(), "deleted item");
        }
        if let Some(filename) = deleted.photo {
            self.local.remove_photo(&filename);
            self.pending_photos.remove(&filename);
            self.deleted_photos.push(filename);
        }
        if self.record_sync {
            self.record_ops.push_back(RecordOp::Delete(id.clone()));
        }
        if removed || self.record_sync {
            self.deleted_items.push(id);
            self.persist_pending();
            self.note_write();
        }
    }

    fn note_write(&mut self) {
        if let Some(generation) = self.scheduler.note_write() {
            debug!(generation, "push scheduled");
            self.arm_debounce(generation);
        }
    }

    fn arm_debounce(&self, generation: u64) {
        let delay = self.config.push_debounce;
        self.spawn(async move {
            time::sleep(delay).await;
            Command::DebounceElapsed(generation)
        });
    }

    fn push_now(&mut self) {
        if !self.scheduler.is_dirty() {
            debug!("no pending changes to push");
            return;
        }
        if self.scheduler.begin_forced_push() {
            self.spawn_push();
        } else {
            debug!("sync in progress, push dropped");
        }
    }

    fn start_pull(&mut self) {
        if !self.scheduler.begin_pull() {
            debug!("sync in progress, pull dropped");
            return;
        }
        let context = self.context.clone();
        let observed = self.last_seen;
        let local_photos = self.state.photos.clone();
        self.spawn(async move {
            Command::PullFinished(context.pull(observed, false, local_photos).await)
        });
    }

    fn force_sync(&mut self, reply: oneshot::Sender<SyncOutcome>) {
        if !self.scheduler.begin_forced_push() {
            let _ = reply.send(SyncOutcome::AlreadySyncing);
            return;
        }
        let (job, ops) = self.take_push_job();
        let local_photos = self.state.photos.clone();
        let context = self.context.clone();
        self.spawn(async move {
            let push = context.push(job, ops).await;
            let pull = match &push.result {
                Ok((report, _)) => Some(context.pull(report.token, true, local_photos).await),
                Err(_) => None,
            };
            Command::FullSyncFinished { push, pull, reply }
        });
    }

    fn spawn_push(&mut self) {
        let (job, ops) = self.take_push_job();
        let context = self.context.clone();
        self.spawn(async move { Command::PushFinished(context.push(job, ops).await) });
    }

    fn take_push_job(&mut self) -> (PushJob, VecDeque<RecordOp>) {
        let job = PushJob {
            state: self.state.clone(),
            photos: self.pending_photos.iter().cloned().collect(),
            deleted_photos: std::mem::take(&mut self.deleted_photos),
            deleted_items: std::mem::take(&mut self.deleted_items),
            observed: self.last_seen,
        };
        let ops = std::mem::take(&mut self.record_ops);
        self.in_flight = PendingSync {
            last_seen: self.last_seen,
            deleted_items: job.deleted_items.clone(),
            deleted_photos: job.deleted_photos.clone(),
            record_ops: ops.iter().cloned().collect(),
        };
        (job, ops)
    }

    fn apply_push(&mut self, done: PushDone) -> SyncResult<Merged> {
        let PushDone {
            job,
            unapplied,
            result,
        } = done;
        self.in_flight = PendingSync::default();

        let result = match result {
            Ok((report, pulled)) => {
                for filename in &job.photos {
                    self.pending_photos.remove(filename);
                }
                let merged = match pulled {
                    Some(pulled) => {
                        self.unresolved_photos = pulled.unresolved;
                        self.merge(pulled.snapshot, pulled.records, &job.deleted_items)
                    }
                    None => Merged::default(),
                };
                self.last_seen = self.last_seen.max(report.token);
                self.last_sync = Some(Utc::now());
                info!(
                    token = %report.token,
                    documents = report.documents,
                    blobs = report.blobs,
                    adopted = merged.adopted,
                    "push complete"
                );
                Ok(merged)
            }
            Err(error) => {
                self.requeue(job, unapplied);
                log_deferred("push", &error);
                Err(error)
            }
        };
        self.persist_pending();
        result
    }

    fn apply_pull(&mut self, result: SyncResult<Option<Pulled>>) -> SyncResult<Merged> {
        let Some(pulled) = result? else {
            self.last_sync = Some(Utc::now());
            return Ok(Merged::default());
        };

        let merged = self.merge(pulled.snapshot, pulled.records, &[]);
        self.last_seen = self.last_seen.max(pulled.token);
        self.persist_pending();
        self.last_sync = Some(Utc::now());
        self.unresolved_photos = pulled.unresolved;
        info!(
            token = %pulled.token,
            adopted = merged.adopted,
            unresolved_photos = pulled.unresolved,
            "pull complete"
        );
        Ok(merged)
    }

    fn full_sync_finished(
        &mut self,
        push: PushDone,
        pull: Option<SyncResult<Option<Pulled>>>,
        reply: oneshot::Sender<SyncOutcome>,
    ) {
        let (outcome, pushed, repush) = match self.apply_push(push) {
            Err(error) => (deferred_outcome(&error), false, false),
            Ok(pushed) => match pull.map(|result| self.apply_pull(result)) {
                Some(Ok(pulled)) => (
                    SyncOutcome::Synced {
                        adopted: pushed.adopted + pulled.adopted,
                    },
                    true,
                    pulled.changed,
                ),
                Some(Err(error)) => {
                    log_deferred("pull", &error);
                    (deferred_outcome(&error), true, false)
                }
                None => (
                    SyncOutcome::Synced {
                        adopted: pushed.adopted,
                    },
                    true,
                    false,
                ),
            },
        };
        self.finish_sync(Some(pushed), repush);
        let _ = reply.send(outcome);
    }

    /// Merges remote data with local priority and persists what changed.
    ///
    /// Deletes that have not been pushed yet are reapplied so a merge never
    /// brings a deleted item back before the delete reaches the remote.
    fn merge(
        &mut self,
        snapshot: RemoteSnapshot,
        records: Option<RecordPull>,
        pushed_deletes: &[ItemId],
    ) -> Merged {
        let mut report = self.state.merge_remote(snapshot);
        if let Some(pull) = records {
            let items = UserItems::from(pull.items);
            report.record(Domain::UserItems, self.state.user_items.merge_remote(items));
            let photos: PhotoRefs = pull.photos.into_iter().collect();
            report.record(Domain::Photos, self.state.photos.merge_remote(photos));
        }

        let mut changed = report.changed_domains();
        let pending_deletes: Vec<ItemId> = pushed_deletes
            .iter()
            .chain(self.deleted_items.iter())
            .cloned()
            .collect();
        for id in &pending_deletes {
            let deleted = self.state.delete_item(id);
            changed.extend(deleted.domains);
        }

        let changed: Vec<Domain> = Domain::DOCUMENTS
            .into_iter()
            .filter(|domain| changed.contains(domain))
            .collect();
        self.persist(&changed);
        for domain in &changed {
            debug!(domain = %domain, "merged remote changes");
        }

        Merged {
            adopted: report.adopted(),
            changed: !changed.is_empty(),
        }
    }

    fn requeue(&mut self, job: PushJob, mut unapplied: VecDeque<RecordOp>) {
        let mut deleted_photos = job.deleted_photos;
        deleted_photos.append(&mut self.deleted_photos);
        self.deleted_photos = deleted_photos;

        let mut deleted_items = job.deleted_items;
        deleted_items.append(&mut self.deleted_items);
        self.deleted_items = deleted_items;

        unapplied.append(&mut self.record_ops);
        self.record_ops = unapplied;
    }

    fn finish_sync(&mut self, pushed: Option<bool>, repush: bool) {
        if let Some(generation) = self.scheduler.finish(pushed) {
            debug!(generation, "push re-armed after sync");
            self.arm_debounce(generation);
        }
        if repush {
            self.note_write();
        }
    }

    /// Runs `task` off the actor and feeds its result back as a command.
    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = Command> + Send + 'static,
    {
        let commands = self.commands.clone();
        tokio::spawn(async move {
            let command = task.await;
            let Some(sender) = commands.upgrade() else {
                return;
            };
            if sender.send(command).await.is_err() {
                debug!("sync engine stopped before result was applied");
            }
        });
    }
}

fn log_deferred(operation: &'static str, error: &SyncError) {
    match error {
        SyncError::Unavailable => debug!(operation, "remote unavailable, staying local-only"),
        error if error.is_retryable() => {
            warn!(operation, %error, "remote failure, deferring to next sync");
        }
        error => warn!(operation, %error, "remote operation failed"),
    }
}

fn deferred_outcome(error: &SyncError) -> SyncOutcome {
    match error {
        SyncError::Unavailable => SyncOutcome::Unavailable,
        error => SyncOutcome::Deferred {
            reason: error.to_string(),
        },
    }
}

/// Returns a fresh blob filename for a photo of `item`.
fn photo_filename(item: &ItemId) -> String {
    let sanitized: String = item
        .as_str()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("artifact_{sanitized}_{}.jpg", Uuid::new_v4().simple())
}

fn spawn_pull_ticker(commands: mpsc::WeakSender<Command>, period: Duration) -> JoinHandle<()> {
    let period = period.max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(sender) = commands.upgrade() else {
                break;
            };
            if sender.send(Command::PullTick).await.is_err() {
                break;
            }
        }
    })
}

fn spawn_change_listener<T>(
    mut changes: broadcast::Receiver<T>,
    commands: mpsc::WeakSender<Command>,
) -> JoinHandle<()>
where
    T: Clone + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            }
            let Some(sender) = commands.upgrade() else {
                break;
            };
            if sender.send(Command::RemoteChanged).await.is_err() {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCloud;
    use curio_storage::InMemoryStore;

    fn engine(remote: Remote) -> SyncEngine {
        SyncEngine::start(
            SyncConfig::new(Uuid::new_v4()),
            Arc::new(InMemoryStore::new()),
            remote,
            vec![CatalogItem::new("c1", "Amphora")],
        )
    }

    #[test]
    fn photo_filenames_are_unique_and_safe() {
        let item = ItemId::from("room 4/case 2");
        let first = photo_filename(&item);
        let second = photo_filename(&item);
        assert_ne!(first, second);
        assert!(first.starts_with("artifact_room_4_case_2_"));
        assert!(first.ends_with(".jpg"));
        assert!(!first.contains('/'));
    }

    #[tokio::test]
    async fn local_only_mutations_apply() {
        let engine = engine(Remote::local_only());
        engine.add_recent("c1").await;
        engine.add_recent("u1").await;
        engine.upsert_item(CatalogItem::new("u1", "Sketch")).await;

        assert_eq!(
            engine.recents().await.as_slice(),
            &[ItemId::from("u1"), ItemId::from("c1")]
        );
        let titles: Vec<String> = engine.items().await.into_iter().map(|item| item.title).collect();
        assert_eq!(titles, vec!["Amphora".to_string(), "Sketch".to_string()]);

        let outcome = loop {
            match engine.force_sync().await {
                SyncOutcome::AlreadySyncing => tokio::task::yield_now().await,
                outcome => break outcome,
            }
        };
        assert_eq!(outcome, SyncOutcome::Unavailable);
    }

    #[tokio::test]
    async fn photo_replacement_removes_previous_blob() {
        let engine = engine(Remote::local_only());
        let first = engine.save_artifact_photo(&b"one"[..], "c1").await.unwrap();
        let second = engine.save_artifact_photo(&b"two"[..], "c1").await.unwrap();
        assert_ne!(first, second);

        let refs = engine.photo_refs().await;
        assert_eq!(refs.get(&"c1".into()), Some(second.as_str()));
        assert_eq!(engine.photo_bytes("c1").await, Some(Bytes::from_static(b"two")));
    }

    #[tokio::test]
    async fn shutdown_stops_engine() {
        let engine = engine(Remote::local_only());
        engine.add_recent("c1").await;
        engine.shutdown().await;

        engine.add_recent("c2").await;
        assert!(engine.recents().await.is_empty());
        assert_eq!(engine.force_sync().await, SyncOutcome::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn entering_background_without_changes_pushes_nothing() {
        let cloud = MemoryCloud::new();
        let engine = engine(cloud.device().remote());
        time::sleep(Duration::from_millis(10)).await;

        engine.enter_background().await;
        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(cloud.calls("push_document"), 0);
        assert_eq!(cloud.calls("write_token"), 0);
        assert!(!engine.status().await.pending_changes);
    }

    #[tokio::test]
    async fn shutdown_saves_pending_deletes() {
        let store: Arc<dyn DocumentStore> = Arc::new(InMemoryStore::new());
        let cloud = MemoryCloud::new();
        let device = cloud.device();
        device.set_available(false);

        let engine = SyncEngine::start(
            SyncConfig::new(Uuid::new_v4()),
            store.clone(),
            device.remote(),
            Vec::new(),
        );
        engine.upsert_item(CatalogItem::new("u1", "Sketch")).await;
        engine.delete_item("u1").await;
        engine.shutdown().await;

        let pending = LocalStore::new(store).load_pending();
        assert!(pending.has_work());
        assert_eq!(pending.deleted_items, vec![ItemId::from("u1")]);
        assert_eq!(pending.record_ops.last(), Some(&RecordOp::Delete(ItemId::from("u1"))));
    }

    #[tokio::test]
    async fn status_reflects_pending_changes() {
        let cloud = MemoryCloud::new();
        let device = cloud.device();
        device.set_available(false);
        let engine = engine(device.remote());

        engine
            .capture_location(LocationRecord::new(41.9, 12.5, Utc::now()), "c1")
            .await;
        let status = engine.status().await;
        assert!(status.pending_changes);
        assert!(!status.available);
        assert_eq!(status.last_sync, None);
    }
}
