//! Property-based test generators using proptest.
//!
//! Provides strategies for generating domain values that maintain the
//! domains' invariants.

use chrono::{TimeZone, Utc};
use curio_sync_protocol::{
    CatalogItem, DomainState, ItemId, LocationRecord, Locations, PhotoRefs, RecentItems, UserItems,
};
use proptest::prelude::*;

/// Strategy for item ids drawn from a small pool, so generated domains
/// overlap often.
pub fn item_id_strategy() -> impl Strategy<Value = ItemId> {
    (0u8..16).prop_map(|n| ItemId::new(format!("item-{n}")))
}

/// Strategy for photo blob filenames.
pub fn filename_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9]{1,8}")
        .expect("Invalid regex")
        .prop_map(|stem| format!("{stem}.jpg"))
}

/// Strategy for recent-item lists (normalized on construction).
pub fn recents_strategy() -> impl Strategy<Value = RecentItems> {
    prop::collection::vec(item_id_strategy(), 0..16).prop_map(RecentItems::from)
}

/// Strategy for photo reference maps.
pub fn photo_refs_strategy() -> impl Strategy<Value = PhotoRefs> {
    prop::collection::vec((item_id_strategy(), filename_strategy()), 0..8)
        .prop_map(|entries| entries.into_iter().collect())
}

/// Strategy for location records.
pub fn location_strategy() -> impl Strategy<Value = LocationRecord> {
    (-90.0f64..90.0, -180.0f64..180.0, 0i64..2_000_000_000).prop_map(|(lat, lon, secs)| {
        let at = Utc
            .timestamp_opt(secs, 0)
            .single()
            .expect("Valid timestamp");
        LocationRecord::new(lat, lon, at)
    })
}

/// Strategy for location maps.
pub fn locations_strategy() -> impl Strategy<Value = Locations> {
    prop::collection::vec((item_id_strategy(), location_strategy()), 0..8).prop_map(|entries| {
        let mut locations = Locations::new();
        for (id, record) in entries {
            locations.set(id, record);
        }
        locations
    })
}

/// Strategy for catalog items.
pub fn catalog_item_strategy() -> impl Strategy<Value = CatalogItem> {
    (item_id_strategy(), "[A-Za-z ]{1,24}")
        .prop_map(|(id, title)| CatalogItem::new(id, title))
}

/// Strategy for user-authored item lists.
pub fn user_items_strategy() -> impl Strategy<Value = UserItems> {
    prop::collection::vec(catalog_item_strategy(), 0..8).prop_map(UserItems::from)
}

/// Strategy for a complete domain state.
pub fn domain_state_strategy() -> impl Strategy<Value = DomainState> {
    (
        recents_strategy(),
        photo_refs_strategy(),
        locations_strategy(),
        user_items_strategy(),
    )
        .prop_map(|(recents, photos, locations, user_items)| DomainState {
            recents,
            photos,
            locations,
            user_items,
        })
}

/// A user action against the local domains.
#[derive(Debug, Clone)]
pub enum UserAction {
    /// View an item.
    View(ItemId),
    /// Create or replace a user-authored item.
    Author(CatalogItem),
    /// Record where an item was captured.
    Locate(ItemId, LocationRecord),
    /// Delete an item everywhere.
    Delete(ItemId),
}

/// Strategy for user actions, weighted towards viewing.
pub fn user_action_strategy() -> impl Strategy<Value = UserAction> {
    prop_oneof![
        4 => item_id_strategy().prop_map(UserAction::View),
        2 => catalog_item_strategy().prop_map(UserAction::Author),
        2 => (item_id_strategy(), location_strategy())
            .prop_map(|(id, location)| UserAction::Locate(id, location)),
        1 => item_id_strategy().prop_map(UserAction::Delete),
    ]
}

/// Strategy for a sequence of user actions.
pub fn action_sequence_strategy(
    min_actions: usize,
    max_actions: usize,
) -> impl Strategy<Value = Vec<UserAction>> {
    prop::collection::vec(user_action_strategy(), min_actions..max_actions)
}

/// Case counts for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Few cases, for tests that start an engine per case.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 24,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
