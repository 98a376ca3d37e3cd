//! # Curio Sync Protocol
//!
//! Domain model and merge rules for the Curio museum guide sync engine.
//!
//! This crate provides:
//! - [`ItemId`] and [`CatalogItem`], the shared item shape
//! - The four document domains ([`RecentItems`], [`PhotoRefs`],
//!   [`Locations`], [`UserItems`]) and their invariants
//! - [`LocalPriorityMerge`], the additive local-wins merge policy
//! - [`DomainState`], the full in-memory state with cross-domain delete
//! - The remote record schema ([`Record`], [`RecordId`], [`PhotoRecord`])
//! - [`SyncToken`], the cheap "something changed" signal
//!
//! This is a pure crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod domain;
mod error;
mod item;
mod merge;
mod record;
mod snapshot;
mod state;
mod token;

pub use domain::{
    Domain, DomainDocument, LocationRecord, Locations, PhotoRefs, RecentItems, SyncStrategy,
    UserItems,
};
pub use error::{ProtocolError, ProtocolResult};
pub use item::{CatalogItem, GlossaryEntry, ItemId, MediaDescriptor, Reference};
pub use merge::{LocalPriorityMerge, MergeOutcome};
pub use record::{
    FieldValue, PhotoRecord, Record, RecordId, RecordKind, ZoneId, ITEM_RECORD_PREFIX,
    PHOTO_RECORD_PREFIX,
};
pub use snapshot::{decode_snapshot, encode_snapshot};
pub use state::{DeletedItem, DomainState, MergeReport, RemoteSnapshot};
pub use token::SyncToken;
