use core::fmt;
use std::{
    collections::{HashSet, VecDeque},
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
};

use crate::btree::page::BTreePageID;

static TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// The context a single index operation runs under.
///
/// The page set records every page the operation has latched and
/// pinned, in descent order, so the pages can be released
/// first-in-first-out. The deleted set records pages scheduled for
/// deletion; the buffer pool deletes them after their last unpin.
pub struct Transaction {
    // increase monotonically by 1
    uuid: u64,

    page_set: Mutex<VecDeque<BTreePageID>>,
    deleted_page_set: Mutex<HashSet<BTreePageID>>,
}

impl Transaction {
    pub fn new() -> Self {
        Self {
            uuid: TRANSACTION_ID.fetch_add(1, Ordering::Relaxed),
            page_set: Mutex::new(VecDeque::new()),
            deleted_page_set: Mutex::new(HashSet::new()),
        }
    }

    pub fn get_id(&self) -> u64 {
        self.uuid
    }

    pub fn push_page(&self, pid: &BTreePageID) {
        self.page_set.lock().unwrap().push_back(*pid);
    }

    /// Remove and return the most recently latched page, handing its
    /// latch and pin over to the caller (used when an iterator takes
    /// ownership of the leaf it starts from).
    pub fn pop_newest_page(&self) -> Option<BTreePageID> {
        self.page_set.lock().unwrap().pop_back()
    }

    /// Empty the page set, oldest first.
    pub fn drain_page_set(&self) -> Vec<BTreePageID> {
        self.page_set.lock().unwrap().drain(..).collect()
    }

    pub fn add_deleted_page(&self, pid: &BTreePageID) {
        self.deleted_page_set.lock().unwrap().insert(*pid);
    }

    /// Remove `pid` from the deleted set, returning whether it was
    /// scheduled for deletion.
    pub fn take_deleted_page(&self, pid: &BTreePageID) -> bool {
        self.deleted_page_set.lock().unwrap().remove(pid)
    }

    pub fn deleted_pages_done(&self) -> bool {
        self.deleted_page_set.lock().unwrap().is_empty()
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "tx_{}", self.uuid)
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        return write!(f, "{}", self);
    }
}
