use std::{
    cell::Cell,
    sync::{Arc, RwLock},
};

use log::debug;

use crate::{
    buffer::BufferPool,
    error::IndexError,
    key::IndexKey,
    latch::{Latch, LatchManager, TreeLatch},
    rid::Rid,
    transaction::Transaction,
    types::{IndexResult, Pod},
    utils::HandyRwLock,
};

use self::page::{
    BTreeInternalPage, BTreeLeafPage, BTreePage, BTreePageID, PageCategory,
};

mod check;
mod delete;
mod insert;
mod iterator;
pub mod page;

pub use iterator::BTreeIndexIterator;

thread_local! {
    // the number of times the running operation has acquired the tree
    // latch on this thread; release must pair exactly with acquisition
    static TREE_LATCH_HELD: Cell<usize> = Cell::new(0);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum OpType {
    Read,
    Insert,
    Delete,
}

impl OpType {
    fn is_exclusive(&self) -> bool {
        !matches!(self, OpType::Read)
    }

    fn to_latch(&self) -> Latch {
        if self.is_exclusive() {
            Latch::Exclusive
        } else {
            Latch::Shared
        }
    }
}

#[derive(Clone, Copy)]
pub(crate) enum SearchFor<'a, K> {
    Key(&'a K),
    LeftMost,
}

/// A latched tree page of either kind.
pub(crate) enum TreeNode<K: IndexKey> {
    Internal(Pod<BTreeInternalPage<K>>),
    Leaf(Pod<BTreeLeafPage<K>>),
}

impl<K: IndexKey> TreeNode<K> {
    pub(crate) fn get_pid(&self) -> BTreePageID {
        match self {
            TreeNode::Internal(pod) => pod.rl().get_pid(),
            TreeNode::Leaf(pod) => pod.rl().get_pid(),
        }
    }

    pub(crate) fn get_parent_pid(&self) -> Option<BTreePageID> {
        match self {
            TreeNode::Internal(pod) => pod.rl().get_parent_pid(),
            TreeNode::Leaf(pod) => pod.rl().get_parent_pid(),
        }
    }

    /// A page is safe when the pending operation on the subtree below
    /// it cannot propagate a structural change above it: an insert
    /// will not split it, a delete will not underflow it, a read
    /// never changes it.
    fn is_safe(&self, op: OpType) -> bool {
        match op {
            OpType::Read => true,
            OpType::Insert => match self {
                TreeNode::Internal(pod) => {
                    let page = pod.rl();
                    page.get_size() < page.get_max_size()
                }
                TreeNode::Leaf(pod) => {
                    let page = pod.rl();
                    page.get_size() < page.get_max_size()
                }
            },
            OpType::Delete => match self {
                TreeNode::Internal(pod) => {
                    let page = pod.rl();
                    page.get_size() > page.get_min_size()
                }
                TreeNode::Leaf(pod) => {
                    let page = pod.rl();
                    page.get_size() > page.get_min_size()
                }
            },
        }
    }
}

/// A concurrent B+ tree index over a pinned buffer pool.
///
/// Multi-threaded correctness comes from latch crabbing: an operation
/// latches pages along its descent path and releases every ancestor
/// (and the tree latch) as soon as the page it just latched is safe.
/// The pages an operation holds are booked in its transaction's page
/// set and released first-in-first-out on every exit path.
pub struct BTreeIndex<K: IndexKey> {
    index_name: String,
    buffer_pool: Arc<BufferPool<K>>,

    latches: LatchManager,
    tree_latch: TreeLatch,

    // changed only while the tree latch is held exclusively
    root_pid: RwLock<Option<BTreePageID>>,
}

// init and root management
impl<K: IndexKey> BTreeIndex<K> {
    /// Open the index named `index_name`, picking up its root from
    /// the header page when it is already registered.
    pub fn new(
        index_name: &str,
        buffer_pool: Arc<BufferPool<K>>,
    ) -> Result<Self, IndexError> {
        let root_pid = {
            let header_pod = buffer_pool.fetch_header_page()?;
            let record = header_pod.rl().get_record(index_name);
            buffer_pool.unpin_page(&BTreePageID::header(), false)?;
            record.unwrap_or(None)
        };

        Ok(Self {
            index_name: index_name.to_string(),
            buffer_pool,
            latches: LatchManager::new(),
            tree_latch: TreeLatch::new(),
            root_pid: RwLock::new(root_pid),
        })
    }

    pub fn get_name(&self) -> &str {
        &self.index_name
    }

    pub fn get_buffer_pool(&self) -> &Arc<BufferPool<K>> {
        &self.buffer_pool
    }

    pub fn is_empty(&self) -> bool {
        self.root_pid.rl().is_none()
    }

    pub fn get_root_pid(&self) -> Option<BTreePageID> {
        *self.root_pid.rl()
    }

    pub(crate) fn set_root_pid(&self, pid: Option<BTreePageID>) {
        *self.root_pid.wl() = pid;
    }

    /// Write the current root through to the header page. Called on
    /// every root change, before the operation completes; the record
    /// is inserted on first root creation and updated afterwards.
    pub(crate) fn update_root_record(
        &self,
        insert_record: bool,
    ) -> IndexResult {
        let root_pid = self.get_root_pid();
        let header_pod = self.buffer_pool.fetch_header_page()?;
        {
            let mut header = header_pod.wl();
            if !insert_record || !header.insert_record(&self.index_name, root_pid)
            {
                header.update_record(&self.index_name, root_pid);
            }
        }
        self.buffer_pool.unpin_page(&BTreePageID::header(), true)
    }
}

// latch protocol
impl<K: IndexKey> BTreeIndex<K> {
    pub(crate) fn lock_tree(&self, exclusive: bool) {
        self.tree_latch.acquire(exclusive);
        TREE_LATCH_HELD.with(|held| held.set(held.get() + 1));
    }

    /// Release the tree latch when this thread still holds it; a
    /// no-op otherwise. The crabbing descent may have released it
    /// long before the operation finishes.
    pub(crate) fn try_unlock_tree(&self, exclusive: bool) {
        TREE_LATCH_HELD.with(|held| {
            if held.get() > 0 {
                self.tree_latch.release(exclusive);
                held.set(held.get() - 1);
            }
        });
    }

    /// Fetch and latch a page of the descent. When the page proves
    /// safe for the operation (or the operation only reads), every
    /// ancestor booked so far is released; the page itself is pinned,
    /// latched and pushed onto the transaction's page set.
    pub(crate) fn fetch_node(
        &self,
        tx: &Transaction,
        pid: &BTreePageID,
        op: OpType,
        has_ancestors: bool,
    ) -> Result<TreeNode<K>, IndexError> {
        self.latches.acquire(tx, op.to_latch(), pid)?;

        let node = match pid.category {
            PageCategory::Internal => {
                TreeNode::Internal(self.buffer_pool.fetch_internal_page(pid)?)
            }
            PageCategory::Leaf => {
                TreeNode::Leaf(self.buffer_pool.fetch_leaf_page(pid)?)
            }
            PageCategory::Header => {
                return Err(IndexError::new(
                    "the header page is not part of the tree",
                ));
            }
        };

        if has_ancestors && (!op.is_exclusive() || node.is_safe(op)) {
            self.free_pages(tx, op.is_exclusive())?;
        }
        tx.push_page(pid);

        Ok(node)
    }

    /// Release everything the transaction holds: the tree latch (when
    /// still held), then every booked page oldest-first — latch
    /// released, pin dropped (dirty when the operation wrote), and
    /// pages scheduled for deletion handed to the buffer pool once
    /// unpinned.
    pub(crate) fn free_pages(
        &self,
        tx: &Transaction,
        exclusive: bool,
    ) -> IndexResult {
        self.try_unlock_tree(exclusive);

        for pid in tx.drain_page_set() {
            self.latches.release(tx, &pid);
            self.buffer_pool.unpin_page(&pid, exclusive)?;

            if tx.take_deleted_page(&pid) {
                self.buffer_pool.delete_page(&pid)?;
            }
        }

        debug_assert!(tx.deleted_pages_done());
        Ok(())
    }

    /// Descend to the leaf responsible for the search target, running
    /// the crabbing protocol. Returns None when the tree is empty.
    pub(crate) fn find_leaf_page(
        &self,
        tx: &Transaction,
        op: OpType,
        search: SearchFor<'_, K>,
    ) -> Result<Option<Pod<BTreeLeafPage<K>>>, IndexError> {
        let exclusive = op.is_exclusive();
        self.lock_tree(exclusive);

        let root_pid = match self.get_root_pid() {
            Some(pid) => pid,
            None => {
                self.try_unlock_tree(exclusive);
                return Ok(None);
            }
        };

        let mut node = self.fetch_node(tx, &root_pid, op, false)?;
        loop {
            match node {
                TreeNode::Leaf(leaf_pod) => {
                    return Ok(Some(leaf_pod));
                }
                TreeNode::Internal(internal_pod) => {
                    let child_pid = {
                        let internal = internal_pod.rl();
                        match search {
                            SearchFor::Key(key) => internal.lookup(key),
                            SearchFor::LeftMost => internal.value_at(0),
                        }
                    };
                    node = self.fetch_node(tx, &child_pid, op, true)?;
                }
            }
        }
    }
}

// point lookup
impl<K: IndexKey> BTreeIndex<K> {
    /// The value stored under `key`, if any. Read-latched descent.
    pub fn get_value(
        &self,
        tx: &Transaction,
        key: &K,
    ) -> Result<Option<Rid>, IndexError> {
        let leaf_pod =
            match self.find_leaf_page(tx, OpType::Read, SearchFor::Key(key))? {
                Some(pod) => pod,
                None => return Ok(None),
            };

        let result = leaf_pod.rl().lookup(key);
        self.free_pages(tx, false)?;

        debug!(
            "get_value, index: {}, key: {:?}, found: {}",
            self.index_name,
            key,
            result.is_some()
        );
        Ok(result)
    }
}
