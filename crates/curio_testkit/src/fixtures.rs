//! Test fixtures and data directory helpers.

use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use curio_storage::{DocumentStore, FileStore, InMemoryStore};
use curio_sync_protocol::{CatalogItem, GlossaryEntry, LocationRecord, MediaDescriptor, Reference};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// A locked data directory with automatic cleanup.
pub struct TestDataDir {
    store: Arc<FileStore>,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: TempDir,
}

impl TestDataDir {
    /// Creates a new empty data directory.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileStore::open(temp_dir.path()).expect("Failed to open data directory");
        Self {
            store: Arc::new(store),
            _temp_dir: temp_dir,
        }
    }

    /// Returns the directory path.
    pub fn path(&self) -> &Path {
        self.store.root()
    }

    /// Returns the store as the engine expects it.
    pub fn store(&self) -> Arc<dyn DocumentStore> {
        self.store.clone()
    }

    /// Returns true if `key` exists in the directory.
    pub fn contains(&self, key: &str) -> bool {
        self.path().join(key).exists()
    }
}

impl Default for TestDataDir {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns a fresh in-memory store.
pub fn memory_store() -> Arc<dyn DocumentStore> {
    Arc::new(InMemoryStore::new())
}

/// A small read-only catalog baseline.
pub fn sample_catalog() -> Vec<CatalogItem> {
    let mut amphora = CatalogItem::new("amphora-17", "Attic amphora")
        .with_summary("Black-figure storage jar, around 540 BC.")
        .with_detail("Two-handled jar decorated with a chariot scene.");
    amphora.easy_read = "A big old jar with two handles.".into();
    amphora.glossary = vec![GlossaryEntry {
        term: "black-figure".into(),
        definition: "Painting style with dark figures on red clay.".into(),
    }];
    amphora.media = Some(MediaDescriptor {
        image: Some("amphora-17.jpg".into()),
        ..MediaDescriptor::default()
    });
    amphora.references = vec![Reference {
        title: "Collection record".into(),
        url: Some("https://museum.example/collection/amphora-17".into()),
    }];

    vec![
        amphora,
        CatalogItem::new("helmet-03", "Corinthian helmet")
            .with_summary("Bronze helmet with cheek guards."),
        CatalogItem::new("coin-88", "Silver tetradrachm").with_summary("Athenian owl coin."),
    ]
}

/// A user-authored item.
pub fn sample_user_item(id: &str) -> CatalogItem {
    CatalogItem::new(id, format!("My notes on {id}")).with_detail("Seen on the second floor.")
}

/// A fixed capture time.
pub fn sample_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 14, 10, 30, 0)
        .single()
        .expect("Valid timestamp")
}

/// A location with every optional field set.
pub fn sample_location() -> LocationRecord {
    let mut location = LocationRecord::new(37.9715, 23.7257, sample_time());
    location.place_name = Some("Acropolis Museum".into());
    location.locality = Some("Athens".into());
    location.region = Some("Attica".into());
    location.country = Some("Greece".into());
    location
}

/// Fake JPEG bytes that differ per `seed`.
pub fn sample_photo(seed: u8) -> Bytes {
    let mut data = vec![0xFF, 0xD8, 0xFF, 0xE0];
    data.extend(std::iter::repeat(seed).take(64));
    data.extend([0xFF, 0xD9]);
    Bytes::from(data)
}
