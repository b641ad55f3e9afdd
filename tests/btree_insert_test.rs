use rand::prelude::*;
use small_index::{
    btree::page::PageCategory, utils::HandyRwLock, Transaction,
};

mod common;

#[test]
fn test_insert_and_get() {
    common::setup();
    let index = common::create_index("./insert_and_get.db");

    common::insert_keys(&index, &[42, 7, 19]);
    common::assert_keys_present(&index, &[42, 7, 19]);

    let tx = Transaction::new();
    assert_eq!(index.get_value(&tx, &100).unwrap(), None);
    assert!(index.get_buffer_pool().check_all_unpinned());

    index.check_integrity(true);
    common::cleanup(index);
}

#[test]
fn test_duplicate_insert_is_rejected() {
    common::setup();
    let index = common::create_index("./insert_duplicate.db");

    let tx = Transaction::new();
    assert!(index.insert(&tx, &1, &common::rid_for(1)).unwrap());

    // the second insert is refused and the first record survives
    let other = small_index::Rid::new(999, 999);
    assert!(!index.insert(&tx, &1, &other).unwrap());
    assert_eq!(index.get_value(&tx, &1).unwrap(), Some(common::rid_for(1)));

    assert_eq!(common::collect_keys(&index), vec![1]);
    index.check_integrity(true);
    common::cleanup(index);
}

// Inserting [1, 2, 3, 4] with max_size 3 splits the first leaf: the
// root becomes an internal page with separator 3 over leaves [1, 2]
// and [3, 4].
#[test]
fn test_split_on_leaf() {
    common::setup();
    let index = common::create_index("./insert_leaf_split.db");

    common::insert_keys(&index, &[1, 2, 3, 4]);

    let root_pid = index.get_root_pid().unwrap();
    assert_eq!(root_pid.category, PageCategory::Internal);

    let pool = index.get_buffer_pool();
    let root_pod = pool.fetch_internal_page(&root_pid).unwrap();
    let (left_pid, right_pid) = {
        let root = root_pod.rl();
        assert_eq!(root.get_size(), 2);
        assert_eq!(root.key_at(1), 3);
        (root.value_at(0), root.value_at(1))
    };
    pool.unpin_page(&root_pid, false).unwrap();

    let left_pod = pool.fetch_leaf_page(&left_pid).unwrap();
    {
        let left = left_pod.rl();
        assert_eq!(left.get_size(), 2);
        assert_eq!(left.key_at(0), 1);
        assert_eq!(left.key_at(1), 2);
        // the split spliced the sibling into the leaf chain
        assert_eq!(left.get_next_pid(), Some(right_pid));
    }
    pool.unpin_page(&left_pid, false).unwrap();

    let right_pod = pool.fetch_leaf_page(&right_pid).unwrap();
    {
        let right = right_pod.rl();
        assert_eq!(right.get_size(), 2);
        assert_eq!(right.key_at(0), 3);
        assert_eq!(right.key_at(1), 4);
        assert_eq!(right.get_next_pid(), None);
    }
    pool.unpin_page(&right_pid, false).unwrap();

    index.check_integrity(true);
    common::cleanup(index);
}

// Eight ascending keys overflow the root internal page as well: the
// tree grows to depth three.
#[test]
fn test_cascading_split() {
    common::setup();
    let index = common::create_index("./insert_cascading_split.db");

    let keys: Vec<i64> = (1..=8).collect();
    common::insert_keys(&index, &keys);
    common::assert_keys_present(&index, &keys);

    let root_pid = index.get_root_pid().unwrap();
    assert_eq!(root_pid.category, PageCategory::Internal);

    // the root's children are internal pages now
    let pool = index.get_buffer_pool();
    let root_pod = pool.fetch_internal_page(&root_pid).unwrap();
    let first_child = root_pod.rl().value_at(0);
    pool.unpin_page(&root_pid, false).unwrap();
    assert_eq!(first_child.category, PageCategory::Internal);

    assert_eq!(common::collect_keys(&index), keys);
    index.check_integrity(true);
    common::cleanup(index);
}

#[test]
fn test_sequential_inserts() {
    common::setup();
    let index = common::create_index("./insert_sequential.db");

    let keys: Vec<i64> = (0..200).collect();
    common::insert_keys(&index, &keys);

    common::assert_keys_present(&index, &keys);
    assert_eq!(common::collect_keys(&index), keys);
    assert!(index.get_buffer_pool().check_all_unpinned());
    index.check_integrity(true);
    common::cleanup(index);
}

#[test]
fn test_random_inserts() {
    common::setup();
    let index = common::create_index("./insert_random.db");

    let mut keys: Vec<i64> = (0..500).collect();
    keys.shuffle(&mut rand::thread_rng());
    common::insert_keys(&index, &keys);

    keys.sort();
    common::assert_keys_present(&index, &keys);
    assert_eq!(common::collect_keys(&index), keys);
    index.check_integrity(true);
    common::cleanup(index);
}

// The header page must reflect the live root after every structural
// root change.
#[test]
fn test_header_tracks_root_changes() {
    common::setup();
    let index = common::create_index("./insert_header_root.db");
    let pool = index.get_buffer_pool().clone();

    let header_root = |name: &str| {
        let header_pod = pool.fetch_header_page().unwrap();
        let record = header_pod.rl().get_record(name);
        pool.unpin_page(
            &small_index::btree::page::BTreePageID::header(),
            false,
        )
        .unwrap();
        record
    };

    // unregistered before the first insert
    assert_eq!(header_root("primary"), None);

    common::insert_keys(&index, &[1]);
    assert_eq!(header_root("primary"), Some(index.get_root_pid()));

    // a cascade of splits moves the root; the header follows
    common::insert_keys(&index, &(2..=16).collect::<Vec<i64>>());
    assert_eq!(header_root("primary"), Some(index.get_root_pid()));

    index.check_integrity(true);
    common::cleanup(index);
}
