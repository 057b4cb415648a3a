mod common;

use std::collections::BTreeSet;
use std::sync::Arc;

use common::{masternode, masternodes};
use platform_abci::identity::IdentityStatus;
use platform_abci::{
    BlockInfo, Bytes32, Error, Identity, MasternodeRegistrySynchronizer, MemoryCoreChain,
};
use platform_store::{AuthenticatedStore, MemoryStore};
use proptest::prelude::*;

const BLOCK: BlockInfo = BlockInfo::new(1, 0, 0);

fn sync_and_apply(
    synchronizer: &mut MasternodeRegistrySynchronizer,
    store: &MemoryStore,
    from: u64,
    to: u64,
) -> platform_abci::MasternodeDiffResult {
    let diff = synchronizer.synchronize(from, to).unwrap();
    let tx = store.start_transaction().unwrap();
    synchronizer.apply(&diff, store, Some(&tx), &BLOCK).unwrap();
    store.commit_transaction(tx).unwrap();
    synchronizer.advance(diff.to_height);
    diff
}

fn identity(store: &MemoryStore, n: u8) -> Option<Identity> {
    Identity::fetch(store, &Bytes32([n; 32]), None).unwrap()
}

#[test]
fn repeated_sync_is_empty_once_applied() {
    let core = Arc::new(MemoryCoreChain::new());
    core.publish_masternode_list(1, masternodes(&[1, 2]));
    core.publish_masternode_list(5, masternodes(&[1, 2, 3]));
    let store = MemoryStore::in_memory();
    let mut synchronizer = MasternodeRegistrySynchronizer::new(core, None);

    let genesis = sync_and_apply(&mut synchronizer, &store, 0, 1);
    assert_eq!(genesis.created_entities.len(), 2);

    let first = sync_and_apply(&mut synchronizer, &store, 1, 5);
    assert_eq!(first.created_entities.len(), 1);
    let root = store.root_hash(None).unwrap();

    let again = synchronizer.synchronize(1, 5).unwrap();
    assert!(again.is_empty());
    assert_eq!((again.from_height, again.to_height), (5, 5));
    assert_eq!(store.root_hash(None).unwrap(), root);
}

#[test]
fn unapplied_diff_is_recomputed() {
    let core = Arc::new(MemoryCoreChain::new());
    core.publish_masternode_list(1, masternodes(&[1]));
    core.publish_masternode_list(2, masternodes(&[1, 2]));
    let store = MemoryStore::in_memory();
    let mut synchronizer = MasternodeRegistrySynchronizer::new(core, None);
    sync_and_apply(&mut synchronizer, &store, 0, 1);

    // Rolled back: the cursor stays where it was.
    let diff = synchronizer.synchronize(1, 2).unwrap();
    let tx = store.start_transaction().unwrap();
    synchronizer.apply(&diff, &store, Some(&tx), &BLOCK).unwrap();
    store.abort_transaction(tx).unwrap();

    assert_eq!(synchronizer.synced_height(), Some(1));
    assert_eq!(synchronizer.synchronize(1, 2).unwrap(), diff);
    assert!(identity(&store, 2).is_none());
}

#[test]
fn removed_then_relisted_masternode_is_reactivated() {
    let core = Arc::new(MemoryCoreChain::new());
    core.publish_masternode_list(1, masternodes(&[1, 2]));
    core.publish_masternode_list(2, masternodes(&[1]));
    core.publish_masternode_list(3, masternodes(&[1, 2]));
    let store = MemoryStore::in_memory();
    let mut synchronizer = MasternodeRegistrySynchronizer::new(core, None);

    sync_and_apply(&mut synchronizer, &store, 0, 1);
    let removal = sync_and_apply(&mut synchronizer, &store, 1, 2);
    assert_eq!(removal.removed_entities.len(), 1);
    let tombstone = identity(&store, 2).unwrap();
    assert_eq!(tombstone.status, IdentityStatus::Removed);

    let relist = sync_and_apply(&mut synchronizer, &store, 2, 3);
    assert_eq!(relist.created_entities.len(), 1);
    let restored = identity(&store, 2).unwrap();
    assert_eq!(restored.status, IdentityStatus::Active);
    assert!(restored.revision > tombstone.revision);
}

#[test]
fn changed_keys_and_bans_are_updates() {
    let core = Arc::new(MemoryCoreChain::new());
    core.publish_masternode_list(1, masternodes(&[1, 2]));
    let mut rekeyed = masternode(1);
    rekeyed.operator_public_key = vec![9; 48];
    let mut banned = masternode(2);
    banned.is_valid = false;
    core.publish_masternode_list(2, vec![rekeyed, banned]);
    let store = MemoryStore::in_memory();
    let mut synchronizer = MasternodeRegistrySynchronizer::new(core, None);

    sync_and_apply(&mut synchronizer, &store, 0, 1);
    let diff = sync_and_apply(&mut synchronizer, &store, 1, 2);
    assert_eq!(diff.updated_entities.len(), 2);
    assert!(diff.created_entities.is_empty());

    let first = identity(&store, 1).unwrap();
    assert_eq!(first.public_keys[0].data, vec![9; 48]);
    assert_eq!(first.revision, 1);
    assert_eq!(identity(&store, 2).unwrap().status, IdentityStatus::Banned);
}

#[test]
fn missing_snapshot_reads_as_an_empty_list() {
    let core = Arc::new(MemoryCoreChain::new());
    let synchronizer = MasternodeRegistrySynchronizer::new(core, None);
    assert!(synchronizer.synchronize(0, 10).unwrap().is_empty());
}

#[test]
fn backwards_range_is_rejected() {
    let core = Arc::new(MemoryCoreChain::new());
    let synchronizer = MasternodeRegistrySynchronizer::new(core, Some(4));
    let err = synchronizer.synchronize(9, 3).unwrap_err();
    assert!(matches!(err, Error::InvalidSyncRange { from: 9, to: 3 }));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn registry_tracks_the_latest_list(
        lists in prop::collection::vec(prop::collection::btree_set(1u8..12, 0..8), 1..6)
    ) {
        let core = Arc::new(MemoryCoreChain::new());
        for (i, ids) in lists.iter().enumerate() {
            let ids: Vec<u8> = ids.iter().copied().collect();
            core.publish_masternode_list(i as u64 + 1, masternodes(&ids));
        }
        let store = MemoryStore::in_memory();
        let mut synchronizer = MasternodeRegistrySynchronizer::new(core, None);

        let mut from = 0;
        for to in 1..=lists.len() as u64 {
            sync_and_apply(&mut synchronizer, &store, from, to);
            from = to;
        }

        let latest = lists.last().cloned().unwrap_or_default();
        let ever: BTreeSet<u8> = lists.iter().flatten().copied().collect();
        for n in ever {
            let stored = identity(&store, n).unwrap();
            let expected = if latest.contains(&n) {
                IdentityStatus::Active
            } else {
                IdentityStatus::Removed
            };
            prop_assert_eq!(stored.status, expected);
        }
    }
}
