use rand::prelude::*;
use small_index::{
    btree::page::PageCategory, utils::HandyRwLock, Transaction,
};

mod common;

#[test]
fn test_remove_missing_key_is_noop() {
    common::setup();
    let index = common::create_index("./delete_missing.db");

    common::insert_keys(&index, &[1, 2]);

    let tx = Transaction::new();
    index.remove(&tx, &5).unwrap();
    // removing the same absent key twice behaves like removing it once
    index.remove(&tx, &5).unwrap();

    common::assert_keys_present(&index, &[1, 2]);
    assert!(index.get_buffer_pool().check_all_unpinned());
    index.check_integrity(true);
    common::cleanup(index);
}

// With leaves [1, 2] and [3, 4, 5], removing 1 leaves the left leaf
// below the minimum; the combined size exceeds max_size, so a pair is
// borrowed from the right sibling and the separator becomes 4.
#[test]
fn test_redistribute_on_delete() {
    common::setup();
    let index = common::create_index("./delete_redistribute.db");

    common::insert_keys(&index, &[1, 2, 3, 4, 5]);

    let tx = Transaction::new();
    index.remove(&tx, &1).unwrap();

    let root_pid = index.get_root_pid().unwrap();
    assert_eq!(root_pid.category, PageCategory::Internal);

    let pool = index.get_buffer_pool();
    let root_pod = pool.fetch_internal_page(&root_pid).unwrap();
    let (separator, left_pid, right_pid) = {
        let root = root_pod.rl();
        assert_eq!(root.get_size(), 2);
        (root.key_at(1), root.value_at(0), root.value_at(1))
    };
    pool.unpin_page(&root_pid, false).unwrap();
    assert_eq!(separator, 4);

    let left_pod = pool.fetch_leaf_page(&left_pid).unwrap();
    {
        let left = left_pod.rl();
        assert_eq!(left.get_size(), 2);
        assert_eq!(left.key_at(0), 2);
        assert_eq!(left.key_at(1), 3);
    }
    pool.unpin_page(&left_pid, false).unwrap();

    let right_pod = pool.fetch_leaf_page(&right_pid).unwrap();
    {
        let right = right_pod.rl();
        assert_eq!(right.get_size(), 2);
        assert_eq!(right.key_at(0), 4);
        assert_eq!(right.key_at(1), 5);
    }
    pool.unpin_page(&right_pid, false).unwrap();

    index.check_integrity(true);
    common::cleanup(index);
}

// From leaves [1, 2] and [3, 4]: removing 1 merges the leaves (the
// combined size fits a single page) and the root collapses back into
// a leaf; removing 2 shrinks it to [3, 4].
#[test]
fn test_coalesce_collapses_root() {
    common::setup();
    let index = common::create_index("./delete_root_collapse.db");

    common::insert_keys(&index, &[1, 2, 3, 4]);
    assert_eq!(
        index.get_root_pid().unwrap().category,
        PageCategory::Internal
    );

    let tx = Transaction::new();
    index.remove(&tx, &1).unwrap();

    let root_pid = index.get_root_pid().unwrap();
    assert_eq!(root_pid.category, PageCategory::Leaf);
    assert_eq!(common::collect_keys(&index), vec![2, 3, 4]);

    index.remove(&tx, &2).unwrap();
    assert_eq!(common::collect_keys(&index), vec![3, 4]);

    assert!(index.get_buffer_pool().check_all_unpinned());
    index.check_integrity(true);
    common::cleanup(index);
}

#[test]
fn test_delete_until_empty() {
    common::setup();
    let index = common::create_index("./delete_until_empty.db");

    let keys: Vec<i64> = (0..50).collect();
    common::insert_keys(&index, &keys);

    let tx = Transaction::new();
    for (i, &key) in keys.iter().enumerate() {
        index.remove(&tx, &key).unwrap();
        assert_eq!(index.get_value(&tx, &key).unwrap(), None);

        if i % 10 == 9 {
            index.check_integrity(true);
        }
    }

    assert!(index.is_empty());
    assert_eq!(index.get_root_pid(), None);
    assert_eq!(common::collect_keys(&index), Vec::<i64>::new());
    assert!(index.get_buffer_pool().check_all_unpinned());

    // an emptied tree grows again from scratch
    common::insert_keys(&index, &[10, 20]);
    common::assert_keys_present(&index, &[10, 20]);
    index.check_integrity(true);
    common::cleanup(index);
}

#[test]
fn test_delete_descending_merges_internals() {
    common::setup();
    let index = common::create_index("./delete_descending.db");

    let keys: Vec<i64> = (0..100).collect();
    common::insert_keys(&index, &keys);

    // removing from the top forces merges on the rightmost path,
    // where pages pick their left sibling
    let tx = Transaction::new();
    for (i, key) in keys.iter().enumerate().rev() {
        index.remove(&tx, key).unwrap();

        if i % 10 == 0 {
            index.check_integrity(true);
        }
    }

    assert!(index.is_empty());
    common::cleanup(index);
}

#[test]
fn test_random_delete_and_reinsert() {
    common::setup();
    let index = common::create_index("./delete_random.db");

    let mut keys: Vec<i64> = (0..300).collect();
    let mut rng = rand::thread_rng();
    keys.shuffle(&mut rng);
    common::insert_keys(&index, &keys);

    // remove a random half
    keys.shuffle(&mut rng);
    let (removed, kept) = keys.split_at(150);
    let tx = Transaction::new();
    for key in removed {
        index.remove(&tx, key).unwrap();
    }
    index.check_integrity(true);

    let mut expected: Vec<i64> = kept.to_vec();
    expected.sort();
    assert_eq!(common::collect_keys(&index), expected);

    // the removed keys can come back
    common::insert_keys(&index, removed);
    let mut all: Vec<i64> = (0..300).collect();
    all.sort();
    assert_eq!(common::collect_keys(&index), all);
    index.check_integrity(true);
    common::cleanup(index);
}
