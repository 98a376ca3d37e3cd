//! CLI command implementations.

pub mod delete;
pub mod inspect;
pub mod recent;
pub mod sync;

use curio_storage::{json, DocumentStore, FileStore};
use curio_sync_engine::{Remote, SyncConfig, SyncEngine};
use curio_sync_protocol::CatalogItem;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

const DEVICE_KEY: &str = "device.json";

/// Opens and locks a data directory.
pub fn open_store(path: &Path) -> Result<Arc<dyn DocumentStore>, Box<dyn std::error::Error>> {
    Ok(Arc::new(FileStore::open(path)?))
}

/// Loads the catalog baseline, or an empty one if no file was given.
pub fn load_catalog(path: Option<&Path>) -> Result<Vec<CatalogItem>, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let data = std::fs::read(path)
        .map_err(|e| format!("Failed to read catalog {}: {e}", path.display()))?;
    Ok(serde_json::from_slice(&data)?)
}

/// Returns the device id stored in the data directory, creating one on
/// first use.
pub fn device_id(store: &dyn DocumentStore) -> Result<Uuid, Box<dyn std::error::Error>> {
    let stored: Option<Uuid> = json::load_or_default(store, DEVICE_KEY);
    if let Some(id) = stored {
        return Ok(id);
    }
    let id = Uuid::new_v4();
    json::save(store, DEVICE_KEY, &id)?;
    Ok(id)
}

/// Starts an engine over the data directory.
pub fn start_engine(
    path: &Path,
    catalog: Option<&Path>,
    remote: Remote,
) -> Result<SyncEngine, Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    let config = SyncConfig::new(device_id(store.as_ref())?);
    Ok(SyncEngine::start(config, store, remote, load_catalog(catalog)?))
}
