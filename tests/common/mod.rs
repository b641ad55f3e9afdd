use std::sync::Arc;

use small_index::{buffer, utils, BTreeIndex, BufferPool, Rid, Transaction};

/// A page size that gives both leaf and internal pages a max_size of
/// 3 with i64 keys, so a handful of inserts exercises every
/// structural path.
pub const SMALL_PAGE_SIZE: usize = 92;

pub const POOL_CAPACITY: usize = 256;

/// # Conduct the initialization
///
/// - Setting up log configurations.
/// - Shrink the page size so splits and merges happen early.
pub fn setup() {
    utils::init_log();
    buffer::set_page_size(SMALL_PAGE_SIZE);
}

/// Create an empty index backed by a fresh file. Each test uses its
/// own file so the suite can run in parallel.
pub fn create_index(db_path: &str) -> BTreeIndex<i64> {
    let pool = Arc::new(BufferPool::new(db_path, POOL_CAPACITY).unwrap());
    BTreeIndex::new("primary", pool).unwrap()
}

/// The record a test expects to find under `key`.
pub fn rid_for(key: i64) -> Rid {
    Rid::new(key as u32, (key % 7) as u32)
}

pub fn insert_keys(index: &BTreeIndex<i64>, keys: &[i64]) {
    let tx = Transaction::new();
    for &key in keys {
        assert!(
            index.insert(&tx, &key, &rid_for(key)).unwrap(),
            "key {} was reported as a duplicate",
            key
        );
    }
}

pub fn assert_keys_present(index: &BTreeIndex<i64>, keys: &[i64]) {
    let tx = Transaction::new();
    for &key in keys {
        assert_eq!(
            index.get_value(&tx, &key).unwrap(),
            Some(rid_for(key)),
            "key {} is missing or has the wrong record",
            key
        );
    }
}

pub fn collect_keys(index: &BTreeIndex<i64>) -> Vec<i64> {
    let tx = Transaction::new();
    index.iter(&tx).unwrap().map(|(k, _)| k).collect()
}

pub fn cleanup(index: BTreeIndex<i64>) {
    let path = index.get_buffer_pool().get_file_path().to_string();
    drop(index);
    let _ = std::fs::remove_file(path);
}
