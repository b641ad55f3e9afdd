use log::debug;

use super::{BTreeIndex, OpType, SearchFor, TreeNode};
use crate::{
    btree::page::{BTreeInternalPage, BTreeLeafPage, BTreePage, BTreePageID},
    error::IndexError,
    key::IndexKey,
    latch::Latch,
    rid::Rid,
    transaction::Transaction,
    types::{IndexResult, Pod, ResultPod},
    utils::HandyRwLock,
};

impl<K: IndexKey> BTreeIndex<K> {
    /// Insert a key/record pair, keeping keys unique. Returns false
    /// (and leaves the tree unchanged) when the key already exists.
    pub fn insert(
        &self,
        tx: &Transaction,
        key: &K,
        rid: &Rid,
    ) -> Result<bool, IndexError> {
        loop {
            self.lock_tree(true);
            if self.is_empty() {
                let result = self.start_new_tree(key, rid);
                self.try_unlock_tree(true);
                result?;
                return Ok(true);
            }
            self.try_unlock_tree(true);

            match self.insert_into_leaf(tx, key, rid)? {
                Some(inserted) => return Ok(inserted),
                // the tree emptied out between the two latchings
                None => continue,
            }
        }
    }

    /// Grow a tree out of nothing: the new root is a single leaf
    /// holding the one pair. Runs under the exclusive tree latch.
    fn start_new_tree(&self, key: &K, rid: &Rid) -> IndexResult {
        let root_pod = self.buffer_pool.new_leaf_page()?;
        let root_pid = root_pod.rl().get_pid();

        self.set_root_pid(Some(root_pid));
        self.update_root_record(true)?;

        root_pod.wl().insert(key, rid);
        self.buffer_pool.unpin_page(&root_pid, true)?;

        debug!(
            "started new tree, index: {}, root: {}",
            self.get_name(),
            root_pid
        );
        Ok(())
    }

    /// Write-latched descent and leaf insert; splits bubble up through
    /// `insert_into_parent`. Returns None when the tree is empty (the
    /// caller restarts), Some(false) on a duplicate key.
    fn insert_into_leaf(
        &self,
        tx: &Transaction,
        key: &K,
        rid: &Rid,
    ) -> Result<Option<bool>, IndexError> {
        let leaf_pod = match self.find_leaf_page(
            tx,
            OpType::Insert,
            SearchFor::Key(key),
        )? {
            Some(pod) => pod,
            None => return Ok(None),
        };

        if leaf_pod.rl().lookup(key).is_some() {
            self.free_pages(tx, true)?;
            return Ok(Some(false));
        }

        leaf_pod.wl().insert(key, rid);

        let overflow = {
            let leaf = leaf_pod.rl();
            leaf.get_size() > leaf.get_max_size()
        };
        if overflow {
            let sibling_pod = self.split_leaf(tx, &leaf_pod)?;
            let promoted_key = sibling_pod.rl().key_at(0);
            self.insert_into_parent(
                tx,
                TreeNode::Leaf(leaf_pod),
                &promoted_key,
                TreeNode::Leaf(sibling_pod),
            )?;
        }

        self.free_pages(tx, true)?;
        Ok(Some(true))
    }

    /// Split the overflowing leaf: allocate a right sibling, move the
    /// upper half of the entries over and splice the sibling into the
    /// leaf chain. The new page is latched and booked like any other
    /// page of the descent.
    fn split_leaf(
        &self,
        tx: &Transaction,
        page_pod: &Pod<BTreeLeafPage<K>>,
    ) -> ResultPod<BTreeLeafPage<K>> {
        let sibling_pod = self.buffer_pool.new_leaf_page()?;
        let sibling_pid = sibling_pod.rl().get_pid();
        self.latches.acquire(tx, Latch::Exclusive, &sibling_pid)?;
        tx.push_page(&sibling_pid);

        // hold the page and its new sibling
        {
            let mut page = page_pod.wl();
            let mut sibling = sibling_pod.wl();
            if let Some(parent_pid) = page.get_parent_pid() {
                sibling.set_parent_pid(&parent_pid);
            }
            page.move_half_to(&mut sibling);
        }
        // release the page and its new sibling

        Ok(sibling_pod)
    }

    /// Split the overflowing internal page. The middle key lands in
    /// the sibling's slot 0, where the caller picks it up for
    /// promotion; the moved children are re-parented on the way.
    fn split_internal(
        &self,
        tx: &Transaction,
        page_pod: &Pod<BTreeInternalPage<K>>,
    ) -> ResultPod<BTreeInternalPage<K>> {
        let sibling_pod = self.buffer_pool.new_internal_page()?;
        let sibling_pid = sibling_pod.rl().get_pid();
        self.latches.acquire(tx, Latch::Exclusive, &sibling_pid)?;
        tx.push_page(&sibling_pid);

        // hold the page and its new sibling
        {
            let mut page = page_pod.wl();
            let mut sibling = sibling_pod.wl();
            if let Some(parent_pid) = page.get_parent_pid() {
                sibling.set_parent_pid(&parent_pid);
            }
            page.move_half_to(&mut sibling, &self.buffer_pool)?;
        }
        // release the page and its new sibling

        Ok(sibling_pod)
    }

    /// Hook the freshly split-off `right` page into the tree above
    /// `left`, recursing when the parent overflows in turn. When
    /// `left` was the root, a new root is allocated and the root
    /// change is written through the header page.
    fn insert_into_parent(
        &self,
        tx: &Transaction,
        left: TreeNode<K>,
        key: &K,
        right: TreeNode<K>,
    ) -> IndexResult {
        match left.get_parent_pid() {
            None => {
                // the split page was the root: grow the tree by one
                // level
                let new_root_pod = self.buffer_pool.new_internal_page()?;
                let new_root_pid = new_root_pod.rl().get_pid();

                new_root_pod.wl().populate_new_root(
                    &left.get_pid(),
                    key,
                    &right.get_pid(),
                );
                self.set_node_parent(&left, &new_root_pid);
                self.set_node_parent(&right, &new_root_pid);

                self.set_root_pid(Some(new_root_pid));
                self.update_root_record(false)?;

                self.buffer_pool.unpin_page(&new_root_pid, true)?;

                debug!(
                    "root split, index: {}, new root: {}",
                    self.get_name(),
                    new_root_pid
                );
                Ok(())
            }
            Some(parent_pid) => {
                // the parent is still write-latched by the descent
                debug_assert!(self.latches.holds(tx, &parent_pid));
                let parent_pod =
                    self.buffer_pool.fetch_internal_page(&parent_pid)?;

                parent_pod.wl().insert_node_after(
                    &left.get_pid(),
                    key,
                    &right.get_pid(),
                );
                self.set_node_parent(&right, &parent_pid);

                let overflow = {
                    let parent = parent_pod.rl();
                    parent.get_size() > parent.get_max_size()
                };
                if overflow {
                    let parent_sibling_pod =
                        self.split_internal(tx, &parent_pod)?;
                    let promoted_key = parent_sibling_pod.rl().key_at(0);
                    self.insert_into_parent(
                        tx,
                        TreeNode::Internal(parent_pod.clone()),
                        &promoted_key,
                        TreeNode::Internal(parent_sibling_pod),
                    )?;
                }

                self.buffer_pool.unpin_page(&parent_pid, true)
            }
        }
    }

    fn set_node_parent(&self, node: &TreeNode<K>, parent_pid: &BTreePageID) {
        match node {
            TreeNode::Leaf(pod) => pod.wl().set_parent_pid(parent_pid),
            TreeNode::Internal(pod) => pod.wl().set_parent_pid(parent_pid),
        }
    }
}
