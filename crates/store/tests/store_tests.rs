//! Transaction discipline, root hashing and proof tests for the state store.

use platform_store::*;
use proptest::prelude::*;

const IDENTITIES: &[u8] = b"identities";
const CONTRACTS: &[u8] = b"contracts";

fn identities() -> Vec<Vec<u8>> {
    vec![IDENTITIES.to_vec()]
}

#[test]
fn test_empty_store_has_zero_root() {
    let store = MemoryStore::in_memory();
    assert_eq!(store.root_hash(None).unwrap(), EMPTY_ROOT);
}

#[test]
fn test_single_open_transaction() {
    let store = MemoryStore::in_memory();
    let tx = store.start_transaction().unwrap();
    assert!(store.is_transaction_started());
    assert!(matches!(
        store.start_transaction(),
        Err(StoreError::TransactionAlreadyStarted)
    ));
    store.commit_transaction(tx).unwrap();
    assert!(!store.is_transaction_started());
}

#[test]
fn test_untransacted_write_rejected_while_open() {
    let store = MemoryStore::in_memory();
    let tx = store.start_transaction().unwrap();
    assert!(matches!(
        store.insert(&[IDENTITIES], b"a", vec![1], None),
        Err(StoreError::WriteOutsideTransaction)
    ));
    assert!(matches!(
        store.put_aux(b"state", vec![1], None),
        Err(StoreError::WriteOutsideTransaction)
    ));
    store.abort_transaction(tx).unwrap();
    store.insert(&[IDENTITIES], b"a", vec![1], None).unwrap();
}

#[test]
fn test_root_reflects_only_transaction_until_commit() {
    let store = MemoryStore::in_memory();
    let tx = store.start_transaction().unwrap();
    store.insert(&[IDENTITIES], b"a", vec![1], Some(&tx)).unwrap();

    let pending = store.root_hash(Some(&tx)).unwrap();
    assert_ne!(pending, EMPTY_ROOT);
    assert_eq!(store.root_hash(None).unwrap(), EMPTY_ROOT);

    store.commit_transaction(tx).unwrap();
    assert_eq!(store.root_hash(None).unwrap(), pending);
}

#[test]
fn test_rollback_keeps_transaction_open() {
    let store = MemoryStore::in_memory();
    let tx = store.start_transaction().unwrap();
    store.insert(&[IDENTITIES], b"a", vec![1], Some(&tx)).unwrap();
    store.rollback_transaction(&tx).unwrap();

    assert!(store.is_transaction_started());
    assert_eq!(store.get(&[IDENTITIES], b"a", Some(&tx)).unwrap(), None);
    assert_eq!(store.root_hash(Some(&tx)).unwrap(), EMPTY_ROOT);
    store.commit_transaction(tx).unwrap();
    assert_eq!(store.root_hash(None).unwrap(), EMPTY_ROOT);
}

#[test]
fn test_abort_open_transaction_recovers() {
    let store = MemoryStore::in_memory();
    let tx = store.start_transaction().unwrap();
    store.insert(&[IDENTITIES], b"a", vec![1], Some(&tx)).unwrap();
    drop(tx);

    assert!(store.abort_open_transaction());
    assert!(!store.abort_open_transaction());
    assert_eq!(store.get(&[IDENTITIES], b"a", None).unwrap(), None);
    assert!(store.start_transaction().is_ok());
}

#[test]
fn test_aux_is_not_hashed() {
    let store = MemoryStore::in_memory();
    store.put_aux(b"platform_state", vec![9, 9], None).unwrap();
    assert_eq!(store.root_hash(None).unwrap(), EMPTY_ROOT);
    assert_eq!(store.get_aux(b"platform_state", None).unwrap(), Some(vec![9, 9]));
    store.delete_aux(b"platform_state", None).unwrap();
    assert_eq!(store.get_aux(b"platform_state", None).unwrap(), None);
}

#[test]
fn test_insert_if_not_exists_and_delete_report_presence() {
    let store = MemoryStore::in_memory();
    let tx = store.start_transaction().unwrap();
    assert!(store.insert_if_not_exists(&[CONTRACTS], b"c", vec![1], Some(&tx)).unwrap());
    assert!(!store.insert_if_not_exists(&[CONTRACTS], b"c", vec![2], Some(&tx)).unwrap());
    assert_eq!(store.get(&[CONTRACTS], b"c", Some(&tx)).unwrap(), Some(vec![1]));
    assert!(store.delete(&[CONTRACTS], b"c", Some(&tx)).unwrap());
    assert!(!store.delete(&[CONTRACTS], b"c", Some(&tx)).unwrap());
    store.commit_transaction(tx).unwrap();
}

#[test]
fn test_insertion_order_does_not_change_root() {
    let a = MemoryStore::in_memory();
    let b = MemoryStore::in_memory();
    for key in [b"x", b"y", b"z"] {
        a.insert(&[IDENTITIES], key, key.to_vec(), None).unwrap();
    }
    for key in [b"z", b"x", b"y"] {
        b.insert(&[IDENTITIES], key, key.to_vec(), None).unwrap();
    }
    assert_eq!(a.root_hash(None).unwrap(), b.root_hash(None).unwrap());
}

#[test]
fn test_query_sees_transaction_overlay() {
    let store = MemoryStore::in_memory();
    for i in 0u8..4 {
        store.insert(&[IDENTITIES], &[i], vec![i], None).unwrap();
    }
    store.insert(&[CONTRACTS], &[0], vec![0], None).unwrap();

    let tx = store.start_transaction().unwrap();
    store.delete(&[IDENTITIES], &[1], Some(&tx)).unwrap();
    store.insert(&[IDENTITIES], &[9], vec![9], Some(&tx)).unwrap();

    let mut query = Query::new();
    query.insert_all();
    let path_query = PathQuery::new(identities(), query);

    let keys: Vec<u8> = store
        .query(&path_query, Some(&tx))
        .unwrap()
        .into_iter()
        .map(|(k, _)| k[0])
        .collect();
    assert_eq!(keys, vec![0, 2, 3, 9]);

    let committed: Vec<u8> = store
        .query(&path_query, None)
        .unwrap()
        .into_iter()
        .map(|(k, _)| k[0])
        .collect();
    assert_eq!(committed, vec![0, 1, 2, 3]);
}

#[test]
fn test_proof_verifies_against_root() {
    let store = MemoryStore::in_memory();
    for i in 0u8..7 {
        store.insert(&[IDENTITIES], &[i], vec![i; 3], None).unwrap();
        store.insert(&[CONTRACTS], &[i], vec![i], None).unwrap();
    }

    let mut query = Query::new();
    query.insert_item(QueryItem::RangeAfterToInclusive(vec![1]..=vec![4]));
    let proof = store
        .prove_query(&PathQuery::new(identities(), query), None)
        .unwrap();

    assert_eq!(proof.entries.len(), 3);
    assert_eq!(proof.entries[0].key(), Some(vec![2]));
    assert!(proof.verify_against(&store.root_hash(None).unwrap()));

    let mut tampered = proof.clone();
    tampered.entries[1].value = vec![0xff];
    assert!(!tampered.verify());
}

#[cfg(feature = "sled")]
#[test]
fn test_sled_store_commit_is_durable() {
    let dir = tempfile::tempdir().unwrap();
    let root = {
        let store = SledStore::open(dir.path()).unwrap();
        let tx = store.start_transaction().unwrap();
        store.insert(&[IDENTITIES], b"a", vec![1], Some(&tx)).unwrap();
        store.put_aux(b"platform_state", vec![2], Some(&tx)).unwrap();
        let root = store.root_hash(Some(&tx)).unwrap();
        store.commit_transaction(tx).unwrap();
        root
    };

    let reopened = SledStore::open(dir.path()).unwrap();
    assert_eq!(reopened.root_hash(None).unwrap(), root);
    assert_eq!(reopened.get_aux(b"platform_state", None).unwrap(), Some(vec![2]));
}

proptest! {
    #[test]
    fn prop_every_entry_has_valid_proof(
        keys in proptest::collection::btree_set(proptest::collection::vec(any::<u8>(), 1..8), 1..40)
    ) {
        let store = MemoryStore::in_memory();
        for key in &keys {
            store.insert(&[IDENTITIES], key, key.clone(), None).unwrap();
        }
        let mut query = Query::new();
        query.insert_all();
        let proof = store.prove_query(&PathQuery::new(identities(), query), None).unwrap();

        prop_assert_eq!(proof.entries.len(), keys.len());
        prop_assert!(proof.verify_against(&store.root_hash(None).unwrap()));
    }
}
