//! Availability gating of remote calls.

use crate::remote::{AvailabilityProbe, RecordStore};
use curio_sync_protocol::ZoneId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Name of the silent change subscription registered on the zone.
pub(crate) const CHANGE_SUBSCRIPTION: &str = "curio-changes";

/// Tracks whether the remote backend can be used.
///
/// Every remote operation calls [`AvailabilityMonitor::check`] first. When
/// availability is (re)confirmed the record zone and its change
/// subscription are created; both operations are idempotent on the store.
pub struct AvailabilityMonitor {
    probe: Arc<dyn AvailabilityProbe>,
    records: Option<Arc<dyn RecordStore>>,
    zone: ZoneId,
    available: AtomicBool,
    zone_ready: AtomicBool,
}

impl AvailabilityMonitor {
    /// Creates a monitor. The backend counts as unavailable until checked.
    pub fn new(
        probe: Arc<dyn AvailabilityProbe>,
        records: Option<Arc<dyn RecordStore>>,
        zone: ZoneId,
    ) -> Self {
        Self {
            probe,
            records,
            zone,
            available: AtomicBool::new(false),
            zone_ready: AtomicBool::new(false),
        }
    }

    /// Probes the backend and returns whether remote calls may proceed.
    pub async fn check(&self) -> bool {
        let available = self.probe.check_availability().await;
        let was_available = self.available.swap(available, Ordering::SeqCst);

        if !available {
            if was_available {
                info!("remote backend became unavailable, running local-only");
            }
            self.zone_ready.store(false, Ordering::SeqCst);
            return false;
        }

        if !was_available {
            info!("remote backend available");
        }
        if !self.zone_ready.load(Ordering::SeqCst) {
            self.prepare_zone().await;
        }
        true
    }

    /// Returns the result of the last check.
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Returns true if the record zone was created since the backend last
    /// became available.
    pub fn zone_ready(&self) -> bool {
        self.zone_ready.load(Ordering::SeqCst)
    }

    async fn prepare_zone(&self) {
        let Some(records) = &self.records else {
            self.zone_ready.store(true, Ordering::SeqCst);
            return;
        };

        if let Err(error) = records.ensure_zone(&self.zone).await {
            warn!(zone = %self.zone, %error, "failed to create record zone");
            return;
        }
        if let Err(error) = records.subscribe(&self.zone, CHANGE_SUBSCRIPTION).await {
            warn!(zone = %self.zone, %error, "failed to register change subscription");
            return;
        }
        debug!(zone = %self.zone, "record zone ready");
        self.zone_ready.store(true, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for AvailabilityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvailabilityMonitor")
            .field("zone", &self.zone)
            .field("available", &self.is_available())
            .field("zone_ready", &self.zone_ready())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCloud;

    fn monitor(device: &crate::memory::MemoryDevice) -> AvailabilityMonitor {
        let remote = device.remote();
        AvailabilityMonitor::new(remote.availability, remote.records, ZoneId::new("MuseumZone"))
    }

    #[tokio::test]
    async fn unavailable_until_checked() {
        let cloud = MemoryCloud::new();
        let device = cloud.device();
        let monitor = monitor(&device);

        assert!(!monitor.is_available());
        assert!(monitor.check().await);
        assert!(monitor.is_available());
        assert!(monitor.zone_ready());
    }

    #[tokio::test]
    async fn zone_is_prepared_once_per_availability_window() {
        let cloud = MemoryCloud::new();
        let device = cloud.device();
        let monitor = monitor(&device);

        monitor.check().await;
        monitor.check().await;
        assert_eq!(cloud.calls("ensure_zone"), 1);

        device.set_available(false);
        assert!(!monitor.check().await);
        assert!(!monitor.zone_ready());

        device.set_available(true);
        assert!(monitor.check().await);
        assert_eq!(cloud.calls("ensure_zone"), 2);
        assert_eq!(cloud.calls("subscribe"), 2);
        assert!(cloud.has_zone(&ZoneId::new("MuseumZone")));
    }

    #[tokio::test]
    async fn zone_failure_is_retried_on_next_check() {
        let cloud = MemoryCloud::new();
        let device = cloud.device();
        let monitor = monitor(&device);

        cloud.fail_next("ensure_zone", 1);
        assert!(monitor.check().await);
        assert!(!monitor.zone_ready());

        assert!(monitor.check().await);
        assert!(monitor.zone_ready());
    }
}
