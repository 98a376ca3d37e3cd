//! The complete in-memory domain state.

use crate::domain::{Domain, Locations, PhotoRefs, RecentItems, UserItems};
use crate::item::{CatalogItem, ItemId};
use crate::merge::{LocalPriorityMerge, MergeOutcome};

/// All four document domains, owned together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DomainState {
    /// Recently viewed items.
    pub recents: RecentItems,
    /// Photo references.
    pub photos: PhotoRefs,
    /// Capture locations.
    pub locations: Locations,
    /// User-authored items.
    pub user_items: UserItems,
}

/// What an explicit delete removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletedItem {
    /// Domains the item was removed from.
    pub domains: Vec<Domain>,
    /// Photo filename that was referenced, so its blob can be removed.
    pub photo: Option<String>,
}

impl DeletedItem {
    /// Returns true if the item was present anywhere.
    #[must_use]
    pub fn removed_anything(&self) -> bool {
        !self.domains.is_empty()
    }
}

/// Remote snapshots fetched for a merge. Absent documents are `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteSnapshot {
    /// Remote recents document.
    pub recents: Option<RecentItems>,
    /// Remote photo references document.
    pub photos: Option<PhotoRefs>,
    /// Remote locations document.
    pub locations: Option<Locations>,
    /// Remote user items document.
    pub user_items: Option<UserItems>,
}

/// Per-domain result of merging a [`RemoteSnapshot`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    outcomes: Vec<(Domain, MergeOutcome)>,
}

impl MergeReport {
    /// Records the outcome for one domain.
    pub fn record(&mut self, domain: Domain, outcome: MergeOutcome) {
        self.outcomes.push((domain, outcome));
    }

    /// Returns the domains whose local value changed.
    #[must_use]
    pub fn changed_domains(&self) -> Vec<Domain> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| outcome.changed())
            .map(|(domain, _)| *domain)
            .collect()
    }

    /// Returns true if any domain changed.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.outcomes.iter().any(|(_, outcome)| outcome.changed())
    }

    /// Returns the total number of adopted entries.
    #[must_use]
    pub fn adopted(&self) -> usize {
        self.outcomes.iter().map(|(_, outcome)| outcome.adopted).sum()
    }
}

impl DomainState {
    /// Records a view of `id`.
    pub fn add_recent(&mut self, id: ItemId) -> bool {
        self.recents.touch(id)
    }

    /// Removes `id` from every domain.
    pub fn delete_item(&mut self, id: &ItemId) -> DeletedItem {
        let mut deleted = DeletedItem::default();
        if self.recents.remove(id) {
            deleted.domains.push(Domain::Recents);
        }
        if let Some(filename) = self.photos.remove(id) {
            deleted.domains.push(Domain::Photos);
            deleted.photo = Some(filename);
        }
        if self.locations.remove(id).is_some() {
            deleted.domains.push(Domain::Locations);
        }
        if self.user_items.remove(id) {
            deleted.domains.push(Domain::UserItems);
        }
        deleted
    }

    /// Merges every present remote document with local priority.
    pub fn merge_remote(&mut self, remote: RemoteSnapshot) -> MergeReport {
        let mut report = MergeReport::default();
        if let Some(recents) = remote.recents {
            report.record(Domain::Recents, self.recents.merge_remote(recents));
        }
        if let Some(photos) = remote.photos {
            report.record(Domain::Photos, self.photos.merge_remote(photos));
        }
        if let Some(locations) = remote.locations {
            report.record(Domain::Locations, self.locations.merge_remote(locations));
        }
        if let Some(user_items) = remote.user_items {
            report.record(Domain::UserItems, self.user_items.merge_remote(user_items));
        }
        report
    }

    /// Returns the catalog with user-authored items merged in.
    #[must_use]
    pub fn items(&self, catalog: &[CatalogItem]) -> Vec<CatalogItem> {
        self.user_items.overlay(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LocationRecord;
    use chrono::Utc;

    fn populated() -> DomainState {
        let mut state = DomainState::default();
        state.add_recent("x".into());
        state.add_recent("y".into());
        state.photos.set("x".into(), "x.jpg");
        state
            .locations
            .set("x".into(), LocationRecord::new(0.0, 0.0, Utc::now()));
        state.user_items.upsert(CatalogItem::new("x", "Mine"));
        state
    }

    #[test]
    fn delete_removes_item_from_all_domains() {
        let mut state = populated();
        let deleted = state.delete_item(&"x".into());

        assert_eq!(
            deleted.domains,
            vec![Domain::Recents, Domain::Photos, Domain::Locations, Domain::UserItems]
        );
        assert_eq!(deleted.photo.as_deref(), Some("x.jpg"));
        assert!(!state.recents.contains(&"x".into()));
        assert!(state.recents.contains(&"y".into()));
        assert!(state.photos.is_empty());
        assert!(state.locations.is_empty());
        assert!(state.user_items.is_empty());
    }

    #[test]
    fn delete_of_unknown_item_is_noop() {
        let mut state = populated();
        let before = state.clone();
        assert!(!state.delete_item(&"nope".into()).removed_anything());
        assert_eq!(state, before);
    }

    #[test]
    fn merge_reports_changed_domains() {
        let mut state = populated();
        let mut remote_photos = PhotoRefs::new();
        remote_photos.set("z".into(), "z.jpg");

        let report = state.merge_remote(RemoteSnapshot {
            recents: Some(RecentItems::from(vec![ItemId::from("y")])),
            photos: Some(remote_photos),
            locations: None,
            user_items: None,
        });

        assert_eq!(report.changed_domains(), vec![Domain::Photos]);
        assert_eq!(report.adopted(), 1);
        assert!(report.changed());
    }

    #[test]
    fn deleted_item_is_not_resurrected_by_missing_remote_key() {
        let mut state = populated();
        state.delete_item(&"x".into());
        // A remote that simply lacks "x" leaves the delete in place.
        let report = state.merge_remote(RemoteSnapshot {
            photos: Some(PhotoRefs::new()),
            ..RemoteSnapshot::default()
        });
        assert!(!report.changed());
        assert!(state.photos.is_empty());
    }
}
