//! Inspect command implementation.

use curio_sync_engine::LocalStore;
use curio_sync_protocol::{CatalogItem, DomainState};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;

/// Data directory inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Data directory path.
    pub path: String,
    /// Recently viewed item ids, most recent first.
    pub recents: Vec<String>,
    /// Number of photo references.
    pub photo_refs: usize,
    /// Number of capture locations.
    pub locations: usize,
    /// Number of user-authored items.
    pub user_items: usize,
    /// Number of items after overlaying user items on the catalog.
    pub items: usize,
    /// Number of photo blobs on disk.
    pub blob_count: usize,
    /// Total size of photo blobs in bytes.
    pub blob_size: u64,
    /// Referenced photos with no blob on disk.
    pub missing_blobs: Vec<String>,
    /// Blobs on disk that no reference points to.
    pub orphan_blobs: Vec<String>,
}

/// Runs the inspect command.
pub fn run(
    path: &Path,
    catalog: Option<&Path>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if !path.is_dir() {
        return Err(format!("No data directory found at {:?}", path).into());
    }

    let local = LocalStore::new(super::open_store(path)?);
    let catalog = super::load_catalog(catalog)?;
    let result = inspect(path, &local, &catalog);

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn inspect(path: &Path, local: &LocalStore, catalog: &[CatalogItem]) -> InspectResult {
    let state: DomainState = local.load_state();
    let files: BTreeSet<String> = local.photo_files().into_iter().collect();
    let referenced: BTreeSet<&str> = state.photos.iter().map(|(_, name)| name).collect();

    let blob_size = files
        .iter()
        .filter_map(|name| local.read_photo(name).ok().flatten())
        .map(|data| data.len() as u64)
        .sum();

    InspectResult {
        path: path.display().to_string(),
        recents: state
            .recents
            .as_slice()
            .iter()
            .map(|id| id.to_string())
            .collect(),
        photo_refs: state.photos.len(),
        locations: state.locations.len(),
        user_items: state.user_items.len(),
        items: state.items(catalog).len(),
        blob_count: files.len(),
        blob_size,
        missing_blobs: referenced
            .iter()
            .filter(|name| !files.contains(**name))
            .map(|name| name.to_string())
            .collect(),
        orphan_blobs: files
            .iter()
            .filter(|name| !referenced.contains(name.as_str()))
            .cloned()
            .collect(),
    }
}

fn print_text_output(result: &InspectResult) {
    println!("Curio Data Directory");
    println!("====================");
    println!();
    println!("Path: {}", result.path);
    println!();
    println!("Domains:");
    println!("  Recents:     {}", result.recents.len());
    println!("  Photo refs:  {}", result.photo_refs);
    println!("  Locations:   {}", result.locations);
    println!("  User items:  {}", result.user_items);
    println!("  All items:   {}", result.items);

    if !result.recents.is_empty() {
        println!();
        println!("Recently viewed:");
        for id in &result.recents {
            println!("  {id}");
        }
    }

    println!();
    println!("Photo blobs:");
    println!("  Count: {}", result.blob_count);
    println!("  Size:  {}", format_size(result.blob_size));
    for name in &result.missing_blobs {
        println!("  missing: {name}");
    }
    for name in &result.orphan_blobs {
        println!("  orphan:  {name}");
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} bytes", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
