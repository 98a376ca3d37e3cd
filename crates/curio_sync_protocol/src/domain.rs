//! The independently persisted and synced data domains.

use crate::item::{CatalogItem, ItemId};
use crate::merge::LocalPriorityMerge;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::btree_map;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// A category of user data that is persisted and synced on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    /// Recently viewed item ids.
    Recents,
    /// Item id → photo blob filename.
    Photos,
    /// Item id → capture location.
    Locations,
    /// Items created or edited by the user.
    UserItems,
    /// Catalog item and photo records in the remote record store.
    Records,
}

/// How a domain reaches the other devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// Whole-document snapshot overwrite with local-priority merge on pull.
    Document,
    /// Per-record writes with optimistic concurrency.
    Record,
}

impl Domain {
    /// The domains mirrored as whole documents, in push order.
    pub const DOCUMENTS: [Domain; 4] = [
        Domain::Recents,
        Domain::Photos,
        Domain::Locations,
        Domain::UserItems,
    ];

    /// Returns the local and remote file name of a document domain.
    #[must_use]
    pub fn file_name(&self) -> Option<&'static str> {
        match self {
            Domain::Recents => Some("recents.json"),
            Domain::Photos => Some("artifacts.json"),
            Domain::Locations => Some("locations.json"),
            Domain::UserItems => Some("user_items.json"),
            Domain::Records => None,
        }
    }

    /// Returns the strategy used to sync this domain.
    #[must_use]
    pub fn strategy(&self) -> SyncStrategy {
        match self {
            Domain::Records => SyncStrategy::Record,
            _ => SyncStrategy::Document,
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Domain::Recents => "recents",
            Domain::Photos => "photos",
            Domain::Locations => "locations",
            Domain::UserItems => "user_items",
            Domain::Records => "records",
        };
        f.write_str(name)
    }
}

/// A domain value that is stored and mirrored as one JSON document.
pub trait DomainDocument:
    Serialize + DeserializeOwned + Default + Clone + PartialEq + LocalPriorityMerge
{
    /// The domain this document belongs to.
    const DOMAIN: Domain;

    /// Returns the document's file name.
    fn file_name() -> &'static str {
        Self::DOMAIN.file_name().unwrap_or_default()
    }
}

/// Recently viewed items, most recent first.
///
/// Ids are unique and the list never holds more than [`RecentItems::CAP`]
/// entries. Decoding normalizes foreign input to the same invariants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<ItemId>", into = "Vec<ItemId>")]
pub struct RecentItems {
    ids: Vec<ItemId>,
}

impl RecentItems {
    /// Maximum number of recent entries.
    pub const CAP: usize = 10;

    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves `id` to the front, inserting it if absent.
    ///
    /// Returns true if the list changed.
    pub fn touch(&mut self, id: ItemId) -> bool {
        if self.ids.first() == Some(&id) {
            return false;
        }
        self.ids.retain(|existing| existing != &id);
        self.ids.insert(0, id);
        self.ids.truncate(Self::CAP);
        true
    }

    /// Removes `id`. Returns true if it was present.
    pub fn remove(&mut self, id: &ItemId) -> bool {
        let before = self.ids.len();
        self.ids.retain(|existing| existing != id);
        self.ids.len() != before
    }

    /// Returns true if `id` is in the list.
    #[must_use]
    pub fn contains(&self, id: &ItemId) -> bool {
        self.ids.contains(id)
    }

    /// Returns the ids, most recent first.
    #[must_use]
    pub fn as_slice(&self) -> &[ItemId] {
        &self.ids
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns true if the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub(crate) fn append_missing(&mut self, remote: Vec<ItemId>) {
        for id in remote {
            if self.ids.len() >= Self::CAP {
                break;
            }
            if !self.ids.contains(&id) {
                self.ids.push(id);
            }
        }
    }
}

impl From<Vec<ItemId>> for RecentItems {
    fn from(ids: Vec<ItemId>) -> Self {
        let mut recents = RecentItems::new();
        recents.append_missing(ids);
        recents
    }
}

impl From<RecentItems> for Vec<ItemId> {
    fn from(recents: RecentItems) -> Self {
        recents.ids
    }
}

impl DomainDocument for RecentItems {
    const DOMAIN: Domain = Domain::Recents;
}

/// Photo references: item id → blob filename, one per item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhotoRefs(BTreeMap<ItemId, String>);

impl PhotoRefs {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the photo of `id`, returning the filename it replaced.
    pub fn set(&mut self, id: ItemId, filename: impl Into<String>) -> Option<String> {
        self.0.insert(id, filename.into())
    }

    /// Returns the photo filename of `id`.
    #[must_use]
    pub fn get(&self, id: &ItemId) -> Option<&str> {
        self.0.get(id).map(String::as_str)
    }

    /// Removes the photo of `id`, returning its filename.
    pub fn remove(&mut self, id: &ItemId) -> Option<String> {
        self.0.remove(id)
    }

    /// Iterates over `(id, filename)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&ItemId, &str)> {
        self.0.iter().map(|(id, name)| (id, name.as_str()))
    }

    /// Returns the number of references.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no references.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn entries(&mut self) -> &mut BTreeMap<ItemId, String> {
        &mut self.0
    }
}

impl FromIterator<(ItemId, String)> for PhotoRefs {
    fn from_iter<I: IntoIterator<Item = (ItemId, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for PhotoRefs {
    type Item = (ItemId, String);
    type IntoIter = btree_map::IntoIter<ItemId, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl DomainDocument for PhotoRefs {
    const DOMAIN: Domain = Domain::Photos;
}

/// Where and when the user captured an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRecord {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Point-of-interest name, e.g. the museum.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place_name: Option<String>,
    /// City or town.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locality: Option<String>,
    /// State, province or region.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Country.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    /// Capture time.
    pub captured_at: DateTime<Utc>,
}

impl LocationRecord {
    /// Creates a record with coordinates only.
    #[must_use]
    pub fn new(latitude: f64, longitude: f64, captured_at: DateTime<Utc>) -> Self {
        Self {
            latitude,
            longitude,
            place_name: None,
            locality: None,
            region: None,
            country: None,
            captured_at,
        }
    }
}

/// Capture locations: item id → location, one per item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locations(BTreeMap<ItemId, LocationRecord>);

impl Locations {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the location of `id`, replacing any previous one.
    pub fn set(&mut self, id: ItemId, record: LocationRecord) -> Option<LocationRecord> {
        self.0.insert(id, record)
    }

    /// Returns the location of `id`.
    #[must_use]
    pub fn get(&self, id: &ItemId) -> Option<&LocationRecord> {
        self.0.get(id)
    }

    /// Removes the location of `id`.
    pub fn remove(&mut self, id: &ItemId) -> Option<LocationRecord> {
        self.0.remove(id)
    }

    /// Iterates over `(id, location)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&ItemId, &LocationRecord)> {
        self.0.iter()
    }

    /// Returns the number of locations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no locations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn entries(&mut self) -> &mut BTreeMap<ItemId, LocationRecord> {
        &mut self.0
    }
}

impl DomainDocument for Locations {
    const DOMAIN: Domain = Domain::Locations;
}

/// Items created or edited by the user. Ids are unique.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<CatalogItem>", into = "Vec<CatalogItem>")]
pub struct UserItems {
    items: Vec<CatalogItem>,
}

impl UserItems {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `item`, replacing an existing item with the same id in place.
    ///
    /// Returns true if an item was replaced.
    pub fn upsert(&mut self, item: CatalogItem) -> bool {
        match self.items.iter_mut().find(|existing| existing.id == item.id) {
            Some(existing) => {
                *existing = item;
                true
            }
            None => {
                self.items.push(item);
                false
            }
        }
    }

    /// Removes the item with `id`. Returns true if it was present.
    pub fn remove(&mut self, id: &ItemId) -> bool {
        let before = self.items.len();
        self.items.retain(|item| &item.id != id);
        self.items.len() != before
    }

    /// Returns the item with `id`.
    #[must_use]
    pub fn get(&self, id: &ItemId) -> Option<&CatalogItem> {
        self.items.iter().find(|item| &item.id == id)
    }

    /// Returns true if an item with `id` exists.
    #[must_use]
    pub fn contains(&self, id: &ItemId) -> bool {
        self.get(id).is_some()
    }

    /// Returns the items in insertion order.
    #[must_use]
    pub fn as_slice(&self) -> &[CatalogItem] {
        &self.items
    }

    /// Returns the number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if there are no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Merges the read-only catalog baseline with the user's items.
    ///
    /// A user item with a catalog id replaces that catalog entry in place;
    /// the remaining user items follow the catalog in insertion order.
    #[must_use]
    pub fn overlay(&self, catalog: &[CatalogItem]) -> Vec<CatalogItem> {
        let mut merged: Vec<CatalogItem> = catalog
            .iter()
            .map(|item| self.get(&item.id).unwrap_or(item).clone())
            .collect();
        let catalog_ids: HashSet<&ItemId> = catalog.iter().map(|item| &item.id).collect();
        merged.extend(
            self.items
                .iter()
                .filter(|item| !catalog_ids.contains(&item.id))
                .cloned(),
        );
        merged
    }

    pub(crate) fn append_missing(&mut self, remote: Vec<CatalogItem>) {
        for item in remote {
            if !self.contains(&item.id) {
                self.items.push(item);
            }
        }
    }
}

impl From<Vec<CatalogItem>> for UserItems {
    fn from(items: Vec<CatalogItem>) -> Self {
        let mut user_items = UserItems::new();
        user_items.append_missing(items);
        user_items
    }
}

impl From<UserItems> for Vec<CatalogItem> {
    fn from(user_items: UserItems) -> Self {
        user_items.items
    }
}

impl DomainDocument for UserItems {
    const DOMAIN: Domain = Domain::UserItems;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<ItemId> {
        values.iter().map(|v| ItemId::from(*v)).collect()
    }

    #[test]
    fn domain_files_and_strategies() {
        assert_eq!(Domain::Recents.file_name(), Some("recents.json"));
        assert_eq!(Domain::Photos.file_name(), Some("artifacts.json"));
        assert_eq!(Domain::Locations.file_name(), Some("locations.json"));
        assert_eq!(Domain::UserItems.file_name(), Some("user_items.json"));
        assert_eq!(Domain::Records.file_name(), None);

        for domain in Domain::DOCUMENTS {
            assert_eq!(domain.strategy(), SyncStrategy::Document);
        }
        assert_eq!(Domain::Records.strategy(), SyncStrategy::Record);
        assert_eq!(PhotoRefs::file_name(), "artifacts.json");
    }

    #[test]
    fn touch_moves_existing_to_front() {
        let mut recents = RecentItems::from(ids(&["a", "b", "c"]));
        assert!(recents.touch("c".into()));
        assert_eq!(recents.as_slice(), ids(&["c", "a", "b"]).as_slice());
        assert!(!recents.touch("c".into()));
    }

    #[test]
    fn touch_respects_cap() {
        let mut recents = RecentItems::new();
        for i in 0..25 {
            recents.touch(ItemId::new(format!("item-{i}")));
        }
        assert_eq!(recents.len(), RecentItems::CAP);
        assert_eq!(recents.as_slice()[0], ItemId::new("item-24"));
        assert_eq!(recents.as_slice()[9], ItemId::new("item-15"));
    }

    #[test]
    fn decoding_normalizes_duplicates_and_cap() {
        let json = r#"["a","b","a","c","d","e","f","g","h","i","j","k","l"]"#;
        let recents: RecentItems = serde_json::from_str(json).unwrap();
        assert_eq!(recents.len(), RecentItems::CAP);
        assert_eq!(
            recents.as_slice(),
            ids(&["a", "b", "c", "d", "e", "f", "g", "h", "i", "j"]).as_slice()
        );
    }

    #[test]
    fn recents_serialize_as_plain_list() {
        let recents = RecentItems::from(ids(&["b", "a"]));
        assert_eq!(serde_json::to_string(&recents).unwrap(), r#"["b","a"]"#);
    }

    #[test]
    fn photo_refs_last_write_wins() {
        let mut photos = PhotoRefs::new();
        assert_eq!(photos.set("x".into(), "p1.jpg"), None);
        assert_eq!(photos.set("x".into(), "p2.jpg"), Some("p1.jpg".to_string()));
        assert_eq!(photos.get(&"x".into()), Some("p2.jpg"));
        assert_eq!(photos.len(), 1);
    }

    #[test]
    fn user_items_upsert_keeps_ids_unique() {
        let mut items = UserItems::new();
        assert!(!items.upsert(CatalogItem::new("u1", "First")));
        assert!(items.upsert(CatalogItem::new("u1", "Renamed")));
        assert_eq!(items.len(), 1);
        assert_eq!(items.get(&"u1".into()).unwrap().title, "Renamed");
    }

    #[test]
    fn user_items_decoding_drops_duplicate_ids() {
        let json = r#"[{"id":"u1","title":"A"},{"id":"u1","title":"B"}]"#;
        let items: UserItems = serde_json::from_str(json).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items.as_slice()[0].title, "A");
    }

    #[test]
    fn overlay_replaces_catalog_entries_and_appends_new() {
        let catalog = vec![CatalogItem::new("c1", "Vase"), CatalogItem::new("c2", "Helmet")];
        let mut user = UserItems::new();
        user.upsert(CatalogItem::new("u1", "My sketch"));
        user.upsert(CatalogItem::new("c2", "Helmet (annotated)"));

        let merged = user.overlay(&catalog);
        let titles: Vec<&str> = merged.iter().map(|item| item.title.as_str()).collect();
        assert_eq!(titles, vec!["Vase", "Helmet (annotated)", "My sketch"]);
    }

    #[test]
    fn location_record_json_shape() {
        let at = DateTime::parse_from_rfc3339("2026-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut record = LocationRecord::new(48.86, 2.33, at);
        record.place_name = Some("Louvre".into());

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["place_name"], "Louvre");
        assert!(json.get("country").is_none());

        let back: LocationRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
