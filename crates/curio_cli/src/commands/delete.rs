//! Delete command implementation.

use curio_sync_engine::Remote;
use curio_sync_protocol::ItemId;
use std::path::Path;

/// Deletes `id` from every domain.
///
/// The delete reaches a mirror on the next `sync`.
pub async fn run(
    path: &Path,
    catalog: Option<&Path>,
    id: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = super::start_engine(path, catalog, Remote::local_only())?;
    let item = ItemId::from(id);
    let present = engine.recents().await.contains(&item)
        || engine.photo_refs().await.get(&item).is_some()
        || engine.locations().await.get(&item).is_some()
        || engine.user_items().await.contains(&item);
    engine.delete_item(item).await;
    engine.shutdown().await;

    if present {
        println!("Deleted {id}");
    } else {
        println!("Nothing stored for {id}");
    }
    Ok(())
}
