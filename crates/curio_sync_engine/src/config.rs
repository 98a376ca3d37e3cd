//! Configuration for the sync engine.

use curio_sync_protocol::ZoneId;
use std::time::Duration;
use uuid::Uuid;

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Device ID (unique per installation).
    pub device_id: Uuid,
    /// Record-store zone holding this user's records.
    pub zone: ZoneId,
    /// Delay between the first unpushed write and the push.
    pub push_debounce: Duration,
    /// Period of the background pull.
    pub pull_interval: Duration,
    /// Page size for record queries.
    pub page_size: usize,
    /// Whether catalog items and photos are also synced as records.
    pub record_sync: bool,
    /// Capacity of the engine's command queue.
    pub command_buffer: usize,
}

impl SyncConfig {
    /// Default zone name.
    pub const DEFAULT_ZONE: &'static str = "MuseumZone";

    /// Creates a new sync configuration with the reference timings.
    pub fn new(device_id: Uuid) -> Self {
        Self {
            device_id,
            zone: ZoneId::new(Self::DEFAULT_ZONE),
            push_debounce: Duration::from_secs(2),
            pull_interval: Duration::from_secs(30),
            page_size: 100,
            record_sync: true,
            command_buffer: 256,
        }
    }

    /// Sets the zone name.
    pub fn with_zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = ZoneId::new(zone);
        self
    }

    /// Sets the push debounce delay.
    pub fn with_push_debounce(mut self, delay: Duration) -> Self {
        self.push_debounce = delay;
        self
    }

    /// Sets the background pull period.
    pub fn with_pull_interval(mut self, interval: Duration) -> Self {
        self.pull_interval = interval;
        self
    }

    /// Sets the record query page size.
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size.max(1);
        self
    }

    /// Enables or disables the record strategy.
    pub fn with_record_sync(mut self, enabled: bool) -> Self {
        self.record_sync = enabled;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new(Uuid::nil())
    }
}
