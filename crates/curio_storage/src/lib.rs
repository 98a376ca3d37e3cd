//! # Curio Storage
//!
//! Local document stores for the Curio sync engine.
//!
//! Stores are **opaque key → bytes maps**. They do not interpret the
//! documents they hold; the typed JSON layer in [`json`] and the engine
//! own all format interpretation.
//!
//! ## Design Principles
//!
//! - Keys are relative, `/`-separated paths (`recents.json`, `photos/a.jpg`)
//! - Writes replace the whole document atomically
//! - A missing or unreadable document loads as the empty default
//! - Must be `Send + Sync` so the engine actor and its tasks can share them
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and simulated remote areas
//! - [`FileStore`] - Directory-backed persistence using OS file APIs
//!
//! ## Example
//!
//! ```rust
//! use curio_storage::{DocumentStore, InMemoryStore};
//!
//! let store = InMemoryStore::new();
//! store.write("recents.json", b"[\"a\"]").unwrap();
//! assert_eq!(store.read("recents.json").unwrap(), Some(b"[\"a\"]".to_vec()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
pub mod json;
mod memory;
mod store;

pub use error::{StorageError, StorageResult};
pub use file::FileStore;
pub use json::{load_or_default, save};
pub use memory::InMemoryStore;
pub use store::{validate_key, DocumentStore};
