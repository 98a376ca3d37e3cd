//! # Curio Sync Engine
//!
//! Offline-first synchronization for the Curio museum guide.
//!
//! This crate provides:
//! - The local store for the four document domains
//! - Availability gating of every remote call
//! - A coalescing push scheduler and periodic pull
//! - Document-strategy mirroring with local-priority merge
//! - Record-strategy sync with optimistic-concurrency retry and paging
//! - An actor that serializes every mutation of the domain state
//!
//! ## Architecture
//!
//! Every mutation goes to the local store first and always succeeds from
//! the caller's point of view. The scheduler then coalesces bursts of
//! writes into one outbound push. Pulls run on a timer, on lifecycle
//! events and on remote change notifications:
//! 1. Check availability (skip silently when offline)
//! 2. Compare the remote sync token with the newest merged token
//! 3. Fetch remote snapshots and records, resolve photo blobs
//! 4. Merge into local state with local priority, persist, re-push if changed
//!
//! ## Key Invariants
//!
//! - Local state is authoritative; merges only add remote-only data
//! - Only an explicit delete removes data
//! - Remote failures never reach the caller
//! - At most one push or pull runs its remote I/O at a time

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod availability;
mod config;
mod document;
mod engine;
mod error;
mod fs_mirror;
mod local;
mod memory;
mod records;
mod remote;
mod scheduler;

pub use availability::AvailabilityMonitor;
pub use config::SyncConfig;
pub use document::{DocumentSync, FetchedSnapshot, PhotoResolution, PushJob, PushReport};
pub use engine::{LifecycleEvent, SyncEngine, SyncOutcome, SyncStatus};
pub use error::{SyncError, SyncResult};
pub use fs_mirror::FsMirror;
pub use local::LocalStore;
pub use memory::{MemoryCloud, MemoryDevice};
pub use records::{RecordPages, RecordPull, RecordSync};
pub use remote::{
    AvailabilityProbe, DocumentMirror, LocalOnly, QueryCursor, RecordPage, RecordQuery,
    RecordStore, Remote, TokenSignal,
};
pub use scheduler::{Scheduler, SchedulerState};
