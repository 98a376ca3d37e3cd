//! Recent command implementation.

use curio_sync_engine::Remote;
use std::path::Path;

/// Marks `id` as viewed and prints the resulting list.
pub async fn run(
    path: &Path,
    catalog: Option<&Path>,
    id: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = super::start_engine(path, catalog, Remote::local_only())?;
    engine.add_recent(id).await;
    let recents = engine.recents().await;
    engine.shutdown().await;

    println!("Recently viewed:");
    for (position, id) in recents.as_slice().iter().enumerate() {
        println!("  {:>2}. {}", position + 1, id);
    }
    Ok(())
}
