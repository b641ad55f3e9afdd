use small_index::Transaction;

mod common;

const THREADS: i64 = 4;
const KEYS_PER_THREAD: i64 = 100;

// Each thread inserts a disjoint key range; afterwards every key is
// present, the scan is sorted and the structure is intact.
#[test]
fn test_concurrent_inserts() {
    common::setup();
    let index = common::create_index("./concurrent_inserts.db");

    crossbeam::thread::scope(|scope| {
        for t in 0..THREADS {
            let index = &index;
            scope.spawn(move |_| {
                let tx = Transaction::new();
                let start = t * KEYS_PER_THREAD;
                for key in start..start + KEYS_PER_THREAD {
                    assert!(index
                        .insert(&tx, &key, &common::rid_for(key))
                        .unwrap());
                }
            });
        }
    })
    .unwrap();

    let all: Vec<i64> = (0..THREADS * KEYS_PER_THREAD).collect();
    common::assert_keys_present(&index, &all);
    assert_eq!(common::collect_keys(&index), all);
    assert!(index.get_buffer_pool().check_all_unpinned());
    index.check_integrity(true);
    common::cleanup(index);
}

// Readers hammer the already-inserted half while writers fill in the
// other half.
#[test]
fn test_concurrent_reads_and_writes() {
    common::setup();
    let index = common::create_index("./concurrent_mixed.db");

    let prefilled: Vec<i64> = (0..200).collect();
    common::insert_keys(&index, &prefilled);

    crossbeam::thread::scope(|scope| {
        // two writers, disjoint ranges above the prefilled keys
        for t in 0..2i64 {
            let index = &index;
            scope.spawn(move |_| {
                let tx = Transaction::new();
                let start = 200 + t * 100;
                for key in start..start + 100 {
                    assert!(index
                        .insert(&tx, &key, &common::rid_for(key))
                        .unwrap());
                }
            });
        }

        // two readers over the stable range
        for _ in 0..2 {
            let index = &index;
            scope.spawn(move |_| {
                let tx = Transaction::new();
                for round in 0..5 {
                    for key in (round % 2..200).step_by(2) {
                        let key = key as i64;
                        assert_eq!(
                            index.get_value(&tx, &key).unwrap(),
                            Some(common::rid_for(key))
                        );
                    }
                }
            });
        }
    })
    .unwrap();

    let all: Vec<i64> = (0..400).collect();
    common::assert_keys_present(&index, &all);
    assert!(index.get_buffer_pool().check_all_unpinned());
    index.check_integrity(true);
    common::cleanup(index);
}

// Concurrent removals of disjoint ranges leave exactly the untouched
// keys behind.
#[test]
fn test_concurrent_removes() {
    common::setup();
    let index = common::create_index("./concurrent_removes.db");

    let all: Vec<i64> = (0..THREADS * KEYS_PER_THREAD).collect();
    common::insert_keys(&index, &all);

    // every thread removes the odd keys of its range
    crossbeam::thread::scope(|scope| {
        for t in 0..THREADS {
            let index = &index;
            scope.spawn(move |_| {
                let tx = Transaction::new();
                let start = t * KEYS_PER_THREAD;
                for key in start..start + KEYS_PER_THREAD {
                    if key % 2 == 1 {
                        index.remove(&tx, &key).unwrap();
                    }
                }
            });
        }
    })
    .unwrap();

    let expected: Vec<i64> = all.iter().copied().filter(|k| k % 2 == 0).collect();
    assert_eq!(common::collect_keys(&index), expected);
    assert!(index.get_buffer_pool().check_all_unpinned());
    index.check_integrity(true);
    common::cleanup(index);
}
