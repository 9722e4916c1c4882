//! SQLite store tests against a real database file.

use garden_store::{
    Address, Amount, DataSource, EntityStore, EntityStoreExt, EventPosition, Member,
    MemberCommunity, MemoryStore, SourceKind, SqliteStore, Transaction,
};
use tempfile::TempDir;

fn addr(last: u8) -> Address {
    Address::parse(&format!("0x{:040x}", last)).unwrap()
}

fn stage(store: &dyn EntityStore, member: &Address, community: &Address, staked: u64) {
    let mut tx = Transaction::new(store);
    tx.save(&Member::new(member)).unwrap();
    let mut mc = MemberCommunity::new(member, community);
    mc.staked_tokens = Amount::from(staked);
    mc.is_registered = true;
    tx.save(&mc).unwrap();
    tx.register_source(DataSource {
        chain_id: 10,
        address: community.clone(),
        kind: SourceKind::Community,
        factory: addr(0xff),
    });
    let mut batch = tx.into_batch();
    batch.set_cursor(10, EventPosition { block_number: staked, transaction_index: 0, log_index: 0 });
    store.commit(batch).unwrap();
}

#[test]
fn test_state_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gardens.db");

    {
        let store = SqliteStore::open(&path).unwrap();
        stage(&store, &addr(1), &addr(2), 100);
    }

    let store = SqliteStore::open(&path).unwrap();
    let id = MemberCommunity::id_for(&addr(1), &addr(2));
    let mc: MemberCommunity = store.load(&id).unwrap().unwrap();
    assert_eq!(mc.staked_tokens, Amount::from(100));
    assert!(mc.is_registered);
    assert_eq!(store.cursor(10).unwrap().unwrap().block_number, 100);
    assert_eq!(store.data_sources().unwrap().len(), 1);
}

#[test]
fn test_backends_produce_identical_digests() {
    let dir = TempDir::new().unwrap();
    let sqlite = SqliteStore::open(&dir.path().join("digest.db")).unwrap();
    let memory = MemoryStore::new();

    for store in [&sqlite as &dyn EntityStore, &memory as &dyn EntityStore] {
        stage(store, &addr(3), &addr(2), 7);
        stage(store, &addr(1), &addr(2), 9);
    }

    assert_eq!(sqlite.digest().unwrap(), memory.digest().unwrap());
    assert_eq!(sqlite.list::<Member>().unwrap().len(), 2);
}
