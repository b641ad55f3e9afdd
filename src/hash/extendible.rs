use std::{
    collections::hash_map::DefaultHasher,
    collections::HashMap,
    hash::{Hash, Hasher},
    sync::{Arc, Mutex},
};

use log::debug;

pub const DEFAULT_BUCKET_SIZE: usize = 64;

struct BucketInner<K, V> {
    items: HashMap<K, V>,

    /// the number of low hash bits that uniquely identify this bucket
    local_depth: usize,
}

struct Bucket<K, V> {
    inner: Mutex<BucketInner<K, V>>,
}

impl<K, V> Bucket<K, V> {
    fn new(local_depth: usize) -> Self {
        Self {
            inner: Mutex::new(BucketInner {
                items: HashMap::new(),
                local_depth,
            }),
        }
    }
}

struct Directory<K, V> {
    /// bucket handles indexed by the low `global_depth` bits of the
    /// key hash; multiple slots may share one bucket
    buckets: Vec<Arc<Bucket<K, V>>>,

    global_depth: usize,
    bucket_count: usize,
}

/// A dynamically resizing hash table with a doubling directory.
///
/// The directory latch guards the slot array, the global depth and the
/// bucket count; each bucket carries its own latch. The only
/// cross-latch ordering is bucket then directory (taken by splits and
/// by the post-latch revalidation), so the two latch kinds cannot
/// form a cycle.
pub struct ExtendibleHashTable<K, V> {
    directory: Mutex<Directory<K, V>>,

    /// max entries per bucket
    bucket_size: usize,
}

impl<K: Hash + Eq + Clone, V: Clone> ExtendibleHashTable<K, V> {
    pub fn new() -> Self {
        Self::with_bucket_size(DEFAULT_BUCKET_SIZE)
    }

    pub fn with_bucket_size(bucket_size: usize) -> Self {
        assert!(bucket_size > 0);
        Self {
            directory: Mutex::new(Directory {
                buckets: vec![Arc::new(Bucket::new(0))],
                global_depth: 0,
                bucket_count: 1,
            }),
            bucket_size,
        }
    }

    fn hash_key(&self, key: &K) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish() as usize
    }

    /// The bucket currently responsible for `hash`. The directory
    /// index is computed under the directory latch; the caller takes
    /// the bucket latch after it is released, so a concurrent split
    /// may rewire the slot in between — revalidate with
    /// `mapping_is_current` once the bucket latch is held.
    fn bucket_of(&self, hash: usize) -> Arc<Bucket<K, V>> {
        let directory = self.directory.lock().unwrap();
        let index = hash & ((1 << directory.global_depth) - 1);
        Arc::clone(&directory.buckets[index])
    }

    fn mapping_is_current(
        &self,
        hash: usize,
        bucket: &Arc<Bucket<K, V>>,
    ) -> bool {
        let directory = self.directory.lock().unwrap();
        let index = hash & ((1 << directory.global_depth) - 1);
        Arc::ptr_eq(&directory.buckets[index], bucket)
    }

    pub fn find(&self, key: &K) -> Option<V> {
        let hash = self.hash_key(key);
        loop {
            let bucket = self.bucket_of(hash);
            let inner = bucket.inner.lock().unwrap();
            if !self.mapping_is_current(hash, &bucket) {
                continue;
            }
            return inner.items.get(key).cloned();
        }
    }

    /// Remove the entry of `key`, returning whether one was present.
    /// The directory never shrinks.
    pub fn remove(&self, key: &K) -> bool {
        let hash = self.hash_key(key);
        loop {
            let bucket = self.bucket_of(hash);
            let mut inner = bucket.inner.lock().unwrap();
            if !self.mapping_is_current(hash, &bucket) {
                continue;
            }
            return inner.items.remove(key).is_some();
        }
    }

    /// Insert or overwrite the entry of `key`.
    ///
    /// A full bucket is split: its local depth grows by one, the
    /// directory doubles when the new local depth exceeds the global
    /// depth, entries whose hash has the new bit set move to a fresh
    /// sibling, and every directory slot with that bit set is rewired.
    /// The insert then retries, since the key may now belong to the
    /// sibling (which may itself still be full).
    pub fn insert(&self, key: K, value: V) {
        let hash = self.hash_key(&key);

        loop {
            let bucket = self.bucket_of(hash);
            let mut inner = bucket.inner.lock().unwrap();
            if !self.mapping_is_current(hash, &bucket) {
                continue;
            }

            if inner.items.contains_key(&key)
                || inner.items.len() < self.bucket_size
            {
                inner.items.insert(key, value);
                return;
            }

            // the bucket is full: split it, holding the bucket latch
            // across the directory mutation so no insert can slip into
            // the stale bucket
            let mask = 1usize << inner.local_depth;
            inner.local_depth += 1;

            {
                let mut directory = self.directory.lock().unwrap();

                if inner.local_depth > directory.global_depth {
                    // double the directory: every old slot's twin
                    // points at the same bucket
                    let old_len = directory.buckets.len();
                    for i in 0..old_len {
                        let twin = Arc::clone(&directory.buckets[i]);
                        directory.buckets.push(twin);
                    }
                    directory.global_depth += 1;
                    debug!(
                        "directory doubled, global depth is now {}",
                        directory.global_depth
                    );
                }

                let sibling = Arc::new(Bucket::new(inner.local_depth));
                directory.bucket_count += 1;

                // rehash: entries whose hash has the split bit set move
                // to the sibling
                {
                    let mut sibling_inner = sibling.inner.lock().unwrap();
                    let moved: Vec<K> = inner
                        .items
                        .keys()
                        .filter(|key| self.hash_key(key) & mask != 0)
                        .cloned()
                        .collect();
                    for k in moved {
                        let v = inner.items.remove(&k).unwrap();
                        sibling_inner.items.insert(k, v);
                    }
                }

                // rewire every slot that referenced the split bucket and
                // has the split bit set
                for i in 0..directory.buckets.len() {
                    if Arc::ptr_eq(&directory.buckets[i], &bucket)
                        && (i & mask) != 0
                    {
                        directory.buckets[i] = Arc::clone(&sibling);
                    }
                }
            }

            drop(inner);
            // retry from the top
        }
    }

    /// The number of hash bits used to index the directory.
    pub fn get_global_depth(&self) -> usize {
        self.directory.lock().unwrap().global_depth
    }

    /// The number of distinct buckets.
    pub fn get_bucket_count(&self) -> usize {
        self.directory.lock().unwrap().bucket_count
    }

    pub fn get_directory_size(&self) -> usize {
        self.directory.lock().unwrap().buckets.len()
    }

    /// The number of stored entries. Walks every bucket; meant for
    /// tests and diagnostics.
    pub fn size(&self) -> usize {
        let buckets: Vec<Arc<Bucket<K, V>>> = {
            let directory = self.directory.lock().unwrap();
            directory.buckets.clone()
        };

        let mut seen: Vec<*const Bucket<K, V>> = Vec::new();
        let mut count = 0;
        for bucket in &buckets {
            let ptr = Arc::as_ptr(bucket);
            if seen.contains(&ptr) {
                continue;
            }
            seen.push(ptr);
            count += bucket.inner.lock().unwrap().items.len();
        }
        count
    }

    /// Verify the structural invariants: the directory length is
    /// `2^G`, every bucket's local depth is at most the global depth,
    /// every slot whose low local-depth bits match a bucket's
    /// signature references that bucket, and no bucket overflows.
    /// Panics on violation; meant for tests.
    pub fn check_integrity(&self) {
        // snapshot the directory, then release its latch before taking
        // any bucket latch (the bucket-then-directory ordering forbids
        // holding the directory latch here)
        let (buckets, global_depth) = {
            let directory = self.directory.lock().unwrap();
            (directory.buckets.clone(), directory.global_depth)
        };

        assert_eq!(
            buckets.len(),
            1 << global_depth,
            "directory length must be 2^G"
        );

        for (i, bucket) in buckets.iter().enumerate() {
            let inner = bucket.inner.lock().unwrap();
            assert!(
                inner.local_depth <= global_depth,
                "local depth {} exceeds global depth {}",
                inner.local_depth,
                global_depth
            );
            assert!(
                inner.items.len() <= self.bucket_size,
                "bucket holds {} entries, limit is {}",
                inner.items.len(),
                self.bucket_size
            );

            // all slots agreeing with this slot in the low local-depth
            // bits must reference the same bucket
            let local_mask = (1 << inner.local_depth) - 1;
            for (j, other) in buckets.iter().enumerate() {
                if i & local_mask == j & local_mask {
                    assert!(
                        Arc::ptr_eq(bucket, other),
                        "slots {} and {} agree in the low {} bits but \
                         reference different buckets",
                        i,
                        j,
                        inner.local_depth
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_insert_and_find() {
        let table: ExtendibleHashTable<i64, String> =
            ExtendibleHashTable::new();

        for i in 0..1000 {
            table.insert(i, format!("value_{}", i));
        }
        assert_eq!(table.size(), 1000);

        for i in 0..1000 {
            assert_eq!(table.find(&i), Some(format!("value_{}", i)));
        }
        assert_eq!(table.find(&1000), None);

        table.check_integrity();
    }

    #[test]
    fn test_insert_overwrites() {
        let table: ExtendibleHashTable<i64, i64> = ExtendibleHashTable::new();

        table.insert(1, 10);
        table.insert(1, 20);
        assert_eq!(table.find(&1), Some(20));
        assert_eq!(table.size(), 1);
    }

    #[test]
    fn test_remove() {
        let table: ExtendibleHashTable<i64, i64> = ExtendibleHashTable::new();

        for i in 0..100 {
            table.insert(i, i * 2);
        }
        for i in 0..100 {
            assert!(table.remove(&i));
            assert!(!table.remove(&i));
            assert_eq!(table.find(&i), None);
        }
        assert_eq!(table.size(), 0);

        // removing never shrinks the directory
        table.check_integrity();
    }

    #[test]
    fn test_split_grows_depth() {
        // tiny buckets force splits early
        let table: ExtendibleHashTable<i64, i64> =
            ExtendibleHashTable::with_bucket_size(2);
        assert_eq!(table.get_global_depth(), 0);
        assert_eq!(table.get_bucket_count(), 1);

        for i in 0..256 {
            table.insert(i, i);
            if i % 32 == 31 {
                table.check_integrity();
            }
        }

        assert!(table.get_global_depth() > 0);
        assert!(table.get_bucket_count() > 1);
        assert_eq!(table.get_directory_size(), 1 << table.get_global_depth());

        for i in 0..256 {
            assert_eq!(table.find(&i), Some(i));
        }
    }

    #[test]
    fn test_concurrent_insert_and_find() {
        let table: Arc<ExtendibleHashTable<i64, i64>> =
            Arc::new(ExtendibleHashTable::with_bucket_size(4));

        let threads: i64 = 4;
        let keys_per_thread: i64 = 500;
        crossbeam::thread::scope(|scope| {
            for t in 0..threads {
                let table = Arc::clone(&table);
                scope.spawn(move |_| {
                    let start = t * keys_per_thread;
                    for i in start..start + keys_per_thread {
                        table.insert(i, i + 1);
                        assert_eq!(table.find(&i), Some(i + 1));
                    }
                });
            }
        })
        .unwrap();

        assert_eq!(table.size(), (threads * keys_per_thread) as usize);
        for i in 0..threads * keys_per_thread {
            assert_eq!(table.find(&i), Some(i + 1));
        }
        table.check_integrity();
    }
}
