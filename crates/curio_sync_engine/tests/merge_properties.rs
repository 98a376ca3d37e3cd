//! Property tests for local-priority merge and local mutations.

use curio_sync_engine::{Remote, SyncConfig, SyncEngine};
use curio_sync_protocol::{DomainState, LocalPriorityMerge, RecentItems, RemoteSnapshot};
use curio_testkit::prelude::*;
use proptest::prelude::*;
use std::collections::BTreeSet;

fn snapshot(state: &DomainState) -> RemoteSnapshot {
    RemoteSnapshot {
        recents: Some(state.recents.clone()),
        photos: Some(state.photos.clone()),
        locations: Some(state.locations.clone()),
        user_items: Some(state.user_items.clone()),
    }
}

proptest! {
    #![proptest_config(PropTestConfig::default().to_proptest_config())]

    #[test]
    fn merge_is_idempotent(local in domain_state_strategy(), remote in domain_state_strategy()) {
        let mut once = local;
        once.merge_remote(snapshot(&remote));
        let mut twice = once.clone();
        let report = twice.merge_remote(snapshot(&remote));

        prop_assert_eq!(report.adopted(), 0);
        prop_assert!(report.changed_domains().is_empty());
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn merged_recents_are_unique_and_capped(
        local in recents_strategy(),
        remote in recents_strategy(),
    ) {
        let mut merged = local.clone();
        merged.merge_remote(remote);

        prop_assert!(merged.len() <= RecentItems::CAP);
        let unique: BTreeSet<_> = merged.as_slice().iter().collect();
        prop_assert_eq!(unique.len(), merged.len());
        prop_assert_eq!(&merged.as_slice()[..local.len()], local.as_slice());
    }

    #[test]
    fn merge_never_overwrites_local_entries(
        local in domain_state_strategy(),
        remote in domain_state_strategy(),
    ) {
        let mut merged = local.clone();
        merged.merge_remote(snapshot(&remote));

        for (id, filename) in local.photos.iter() {
            prop_assert_eq!(merged.photos.get(id), Some(filename));
        }
        for (id, record) in local.locations.iter() {
            prop_assert_eq!(merged.locations.get(id), Some(record));
        }
        for item in local.user_items.as_slice() {
            prop_assert_eq!(merged.user_items.get(&item.id), Some(item));
        }
    }

    #[test]
    fn merge_is_a_union_without_duplicates(
        local in domain_state_strategy(),
        remote in domain_state_strategy(),
    ) {
        let mut merged = local.clone();
        merged.merge_remote(snapshot(&remote));

        for (id, _) in remote.photos.iter() {
            prop_assert!(merged.photos.get(id).is_some());
        }
        for (id, _) in remote.locations.iter() {
            prop_assert!(merged.locations.get(id).is_some());
        }

        let expected: BTreeSet<_> = local
            .user_items
            .as_slice()
            .iter()
            .chain(remote.user_items.as_slice())
            .map(|item| item.id.clone())
            .collect();
        let ids: Vec<_> = merged.user_items.as_slice().iter().map(|item| item.id.clone()).collect();
        prop_assert_eq!(ids.len(), expected.len());
        prop_assert_eq!(ids.into_iter().collect::<BTreeSet<_>>(), expected);
    }

    #[test]
    fn absent_remote_documents_change_nothing(local in domain_state_strategy()) {
        let mut merged = local.clone();
        let report = merged.merge_remote(RemoteSnapshot::default());
        prop_assert_eq!(report.adopted(), 0);
        prop_assert_eq!(merged, local);
    }
}

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn engine_applies_actions_like_the_local_model(actions in action_sequence_strategy(0, 24)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let (engine_state, model) = runtime.block_on(async {
            let engine = SyncEngine::start(
                SyncConfig::default(),
                memory_store(),
                Remote::local_only(),
                Vec::new(),
            );
            let mut model = DomainState::default();

            for action in actions {
                match action {
                    UserAction::View(id) => {
                        model.add_recent(id.clone());
                        engine.add_recent(id).await;
                    }
                    UserAction::Author(item) => {
                        model.user_items.upsert(item.clone());
                        engine.upsert_item(item).await;
                    }
                    UserAction::Locate(id, location) => {
                        model.locations.set(id.clone(), location.clone());
                        engine.capture_location(location, id).await;
                    }
                    UserAction::Delete(id) => {
                        model.delete_item(&id);
                        engine.delete_item(id).await;
                    }
                }
            }

            let state = DomainState {
                recents: engine.recents().await,
                photos: engine.photo_refs().await,
                locations: engine.locations().await,
                user_items: engine.user_items().await,
            };
            engine.shutdown().await;
            (state, model)
        });

        prop_assert_eq!(engine_state, model);
    }
}
