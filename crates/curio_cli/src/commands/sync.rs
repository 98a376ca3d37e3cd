//! Sync command implementation.

use curio_sync_engine::{FsMirror, SyncOutcome};
use std::path::Path;
use std::time::Duration;

/// Runs one push and pull against the mirror directory.
pub async fn run(
    path: &Path,
    catalog: Option<&Path>,
    mirror: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let remote = FsMirror::open(mirror)?.into_remote();
    let engine = super::start_engine(path, catalog, remote)?;

    // The engine pulls on start; wait for it instead of dropping the request.
    let outcome = loop {
        match engine.force_sync().await {
            SyncOutcome::AlreadySyncing => tokio::time::sleep(Duration::from_millis(50)).await,
            outcome => break outcome,
        }
    };
    let status = engine.status().await;
    engine.shutdown().await;

    match outcome {
        SyncOutcome::Synced { adopted } => {
            println!("Synced with {}", mirror.display());
            println!("  Adopted entries:    {adopted}");
            println!("  Unresolved photos:  {}", status.unresolved_photos);
            println!("  Token:              {}", status.last_seen_token);
            Ok(())
        }
        SyncOutcome::Unavailable => Err(format!("Mirror {} is not available", mirror.display()).into()),
        SyncOutcome::Deferred { reason } => Err(format!("Sync failed: {reason}").into()),
        SyncOutcome::AlreadySyncing | SyncOutcome::Stopped => Err("Sync engine stopped".into()),
    }
}
