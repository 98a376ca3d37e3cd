//! Local-priority merge.
//!
//! Merging a remote snapshot into local state is **additive and never
//! destructive**: existing local values are kept as they are and only
//! remote-only data is adopted. Absence never propagates through a merge;
//! only an explicit delete removes data.

use crate::domain::{Locations, PhotoRefs, RecentItems, UserItems};
use crate::item::ItemId;

/// Result of merging one remote snapshot into one local domain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Number of remote entries adopted.
    pub adopted: usize,
}

impl MergeOutcome {
    /// Returns true if the local value changed.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.adopted > 0
    }
}

/// A domain value that can absorb a remote snapshot of itself.
///
/// Implementations must be idempotent: merging the same remote value a
/// second time adopts nothing.
pub trait LocalPriorityMerge {
    /// Merges `remote` into `self`, keeping every local value.
    fn merge_remote(&mut self, remote: Self) -> MergeOutcome;
}

impl LocalPriorityMerge for RecentItems {
    /// Keeps the local order, then appends remote-only ids up to the cap.
    fn merge_remote(&mut self, remote: Self) -> MergeOutcome {
        let before = self.len();
        self.append_missing(Vec::<ItemId>::from(remote));
        MergeOutcome {
            adopted: self.len() - before,
        }
    }
}

impl LocalPriorityMerge for PhotoRefs {
    /// Adopts remote keys that are absent locally.
    fn merge_remote(&mut self, remote: Self) -> MergeOutcome {
        let local = self.entries();
        let mut adopted = 0;
        for (id, filename) in remote {
            if !local.contains_key(&id) {
                local.insert(id, filename);
                adopted += 1;
            }
        }
        MergeOutcome { adopted }
    }
}

impl LocalPriorityMerge for Locations {
    /// Adopts remote keys that are absent locally.
    fn merge_remote(&mut self, mut remote: Self) -> MergeOutcome {
        let local = self.entries();
        let mut adopted = 0;
        for (id, record) in std::mem::take(remote.entries()) {
            if let std::collections::btree_map::Entry::Vacant(slot) = local.entry(id) {
                slot.insert(record);
                adopted += 1;
            }
        }
        MergeOutcome { adopted }
    }
}

impl LocalPriorityMerge for UserItems {
    /// Appends remote items whose id is not present locally.
    fn merge_remote(&mut self, remote: Self) -> MergeOutcome {
        let before = self.len();
        self.append_missing(remote.into());
        MergeOutcome {
            adopted: self.len() - before,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LocationRecord;
    use crate::item::CatalogItem;
    use chrono::{TimeZone, Utc};

    fn recents(values: &[&str]) -> RecentItems {
        RecentItems::from(values.iter().map(|v| ItemId::from(*v)).collect::<Vec<_>>())
    }

    fn photos(pairs: &[(&str, &str)]) -> PhotoRefs {
        pairs
            .iter()
            .map(|(id, name)| (ItemId::from(*id), name.to_string()))
            .collect()
    }

    #[test]
    fn recents_keep_local_order_then_remote_only() {
        let mut local = recents(&["A", "B"]);
        let outcome = local.merge_remote(recents(&["C", "A"]));

        assert_eq!(local, recents(&["A", "B", "C"]));
        assert_eq!(outcome.adopted, 1);
    }

    #[test]
    fn recents_merge_truncates_to_cap() {
        let mut local = recents(&["a", "b", "c", "d", "e", "f", "g", "h"]);
        let outcome = local.merge_remote(recents(&["x", "y", "z"]));

        assert_eq!(local.len(), RecentItems::CAP);
        assert_eq!(local.as_slice()[8], ItemId::from("x"));
        assert_eq!(local.as_slice()[9], ItemId::from("y"));
        assert_eq!(outcome.adopted, 2);
    }

    #[test]
    fn photo_merge_never_overwrites_local_key() {
        let mut local = photos(&[("X", "p1.jpg")]);
        let outcome = local.merge_remote(photos(&[("X", "p2.jpg"), ("Y", "p3.jpg")]));

        assert_eq!(local, photos(&[("X", "p1.jpg"), ("Y", "p3.jpg")]));
        assert_eq!(outcome.adopted, 1);
    }

    #[test]
    fn location_merge_adopts_only_missing_keys() {
        let at = Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap();
        let mut local = Locations::new();
        local.set("X".into(), LocationRecord::new(1.0, 1.0, at));

        let mut remote = Locations::new();
        remote.set("X".into(), LocationRecord::new(9.0, 9.0, at));
        remote.set("Y".into(), LocationRecord::new(2.0, 2.0, at));

        let outcome = local.merge_remote(remote);
        assert_eq!(outcome.adopted, 1);
        assert_eq!(local.get(&"X".into()).unwrap().latitude, 1.0);
        assert_eq!(local.get(&"Y".into()).unwrap().latitude, 2.0);
    }

    #[test]
    fn user_items_append_remote_only() {
        let mut local = UserItems::new();
        local.upsert(CatalogItem::new("u1", "Local title"));

        let mut remote = UserItems::new();
        remote.upsert(CatalogItem::new("u1", "Remote title"));
        remote.upsert(CatalogItem::new("u2", "Other device"));

        let outcome = local.merge_remote(remote);
        assert_eq!(outcome.adopted, 1);
        assert_eq!(local.get(&"u1".into()).unwrap().title, "Local title");
        assert!(local.contains(&"u2".into()));
    }

    #[test]
    fn merge_is_idempotent() {
        let remote = photos(&[("X", "p2.jpg"), ("Y", "p3.jpg")]);
        let mut local = photos(&[("X", "p1.jpg")]);

        local.merge_remote(remote.clone());
        let once = local.clone();
        let outcome = local.merge_remote(remote);

        assert_eq!(local, once);
        assert!(!outcome.changed());
    }
}
