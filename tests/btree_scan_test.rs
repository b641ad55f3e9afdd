use rand::prelude::*;
use small_index::Transaction;

mod common;

#[test]
fn test_scan_empty_tree() {
    common::setup();
    let index = common::create_index("./scan_empty.db");

    let tx = Transaction::new();
    let mut it = index.iter(&tx).unwrap();
    assert!(it.is_end());
    assert_eq!(it.next(), None);

    drop(it);
    assert!(index.get_buffer_pool().check_all_unpinned());
    common::cleanup(index);
}

// Inserting [5, 2, 8, 1, 6]: a full scan yields the keys in order,
// a scan from 5 yields the upper part.
#[test]
fn test_scan_in_order() {
    common::setup();
    let index = common::create_index("./scan_in_order.db");

    common::insert_keys(&index, &[5, 2, 8, 1, 6]);

    assert_eq!(common::collect_keys(&index), vec![1, 2, 5, 6, 8]);

    let tx = Transaction::new();
    let keys: Vec<i64> =
        index.iter_from(&tx, &5).unwrap().map(|(k, _)| k).collect();
    assert_eq!(keys, vec![5, 6, 8]);

    // a scan from an absent key starts at the next larger one
    let keys: Vec<i64> =
        index.iter_from(&tx, &3).unwrap().map(|(k, _)| k).collect();
    assert_eq!(keys, vec![5, 6, 8]);

    // a scan from beyond the largest key is immediately done
    let keys: Vec<i64> =
        index.iter_from(&tx, &9).unwrap().map(|(k, _)| k).collect();
    assert_eq!(keys, Vec::<i64>::new());

    assert!(index.get_buffer_pool().check_all_unpinned());
    common::cleanup(index);
}

// The leaf chain visits every live key exactly once, in order, with
// the record that was stored under it.
#[test]
fn test_scan_large() {
    common::setup();
    let index = common::create_index("./scan_large.db");

    let mut keys: Vec<i64> = (0..500).collect();
    keys.shuffle(&mut rand::thread_rng());
    common::insert_keys(&index, &keys);

    let tx = Transaction::new();
    let mut expected = 0;
    for (key, rid) in index.iter(&tx).unwrap() {
        assert_eq!(key, expected);
        assert_eq!(rid, common::rid_for(key));
        expected += 1;
    }
    assert_eq!(expected, 500);

    assert!(index.get_buffer_pool().check_all_unpinned());
    common::cleanup(index);
}

// Dropping an iterator halfway releases its leaf latch and pin.
#[test]
fn test_scan_early_drop() {
    common::setup();
    let index = common::create_index("./scan_early_drop.db");

    let keys: Vec<i64> = (0..100).collect();
    common::insert_keys(&index, &keys);

    let tx = Transaction::new();
    {
        let mut it = index.iter(&tx).unwrap();
        assert_eq!(it.next().map(|(k, _)| k), Some(0));
        assert_eq!(it.next().map(|(k, _)| k), Some(1));
        assert_eq!(it.next().map(|(k, _)| k), Some(2));
    }
    assert!(index.get_buffer_pool().check_all_unpinned());

    // the tree is still fully usable
    let tx2 = Transaction::new();
    index.insert(&tx2, &1000, &common::rid_for(1000)).unwrap();
    assert_eq!(common::collect_keys(&index).len(), 101);
    index.check_integrity(true);
    common::cleanup(index);
}

#[test]
fn test_scan_after_deletes() {
    common::setup();
    let index = common::create_index("./scan_after_deletes.db");

    let keys: Vec<i64> = (0..100).collect();
    common::insert_keys(&index, &keys);

    let tx = Transaction::new();
    for key in keys.iter().filter(|k| *k % 2 == 1) {
        index.remove(&tx, key).unwrap();
    }

    let expected: Vec<i64> = (0..100).filter(|k| k % 2 == 0).collect();
    assert_eq!(common::collect_keys(&index), expected);
    index.check_integrity(true);
    common::cleanup(index);
}
