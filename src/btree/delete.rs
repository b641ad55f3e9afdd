use log::debug;

use super::{BTreeIndex, OpType, SearchFor, TreeNode};
use crate::{
    btree::page::{
        BTreeInternalPage, BTreeLeafPage, BTreePage, BTreePageID, PageCategory,
    },
    error::IndexError,
    key::IndexKey,
    latch::Latch,
    transaction::Transaction,
    types::{IndexResult, Pod},
    utils::HandyRwLock,
};

impl<K: IndexKey> BTreeIndex<K> {
    /// Delete the entry of `key`. A missing key is a silent no-op;
    /// an underflowing leaf is refilled from a sibling or merged
    /// away, cascading up to the root when needed.
    pub fn remove(&self, tx: &Transaction, key: &K) -> IndexResult {
        let leaf_pod = match self.find_leaf_page(
            tx,
            OpType::Delete,
            SearchFor::Key(key),
        )? {
            Some(pod) => pod,
            None => return Ok(()),
        };

        leaf_pod.wl().remove_and_delete_record(key);

        if self.leaf_underflows(&leaf_pod) {
            self.coalesce_or_redistribute_leaf(tx, leaf_pod)?;
        }

        self.free_pages(tx, true)
    }

    /// A non-root leaf underflows below the minimum occupancy; the
    /// root leaf only when it runs out of entries entirely.
    fn leaf_underflows(&self, leaf_pod: &Pod<BTreeLeafPage<K>>) -> bool {
        let leaf = leaf_pod.rl();
        if leaf.is_root() {
            leaf.get_size() == 0
        } else {
            leaf.get_size() < leaf.get_min_size()
        }
    }

    /// A non-root internal page underflows below the minimum
    /// occupancy; the root when a single child remains.
    fn internal_underflows(
        &self,
        page_pod: &Pod<BTreeInternalPage<K>>,
    ) -> bool {
        let page = page_pod.rl();
        if page.is_root() {
            page.get_size() < 2
        } else {
            page.get_size() < page.get_min_size()
        }
    }

    /// Latch and book the sibling of an underflowing page. Taken
    /// under the parent's latch, after the page itself, so the
    /// ordering stays acyclic. Prefers the left sibling; the leftmost
    /// child falls back to its right sibling.
    fn pick_sibling(
        &self,
        parent_pod: &Pod<BTreeInternalPage<K>>,
        node_pid: &BTreePageID,
    ) -> (BTreePageID, usize, usize, bool) {
        let parent = parent_pod.rl();
        let node_index = parent
            .value_index(node_pid)
            .expect("the page is not referenced by its parent");

        let (sibling_index, sibling_is_right) = if node_index == 0 {
            (1, true)
        } else {
            (node_index - 1, false)
        };
        let sibling_pid = parent.value_at(sibling_index);
        (sibling_pid, node_index, sibling_index, sibling_is_right)
    }

    fn coalesce_or_redistribute_leaf(
        &self,
        tx: &Transaction,
        node_pod: Pod<BTreeLeafPage<K>>,
    ) -> IndexResult {
        if node_pod.rl().is_root() {
            return self.adjust_root(tx, TreeNode::Leaf(node_pod));
        }

        let node_pid = node_pod.rl().get_pid();
        let parent_pid = node_pod
            .rl()
            .get_parent_pid()
            .expect("a non-root page has a parent");
        let parent_pod = self.buffer_pool.fetch_internal_page(&parent_pid)?;

        let (sibling_pid, node_index, sibling_index, sibling_is_right) =
            self.pick_sibling(&parent_pod, &node_pid);

        self.latches.acquire(tx, Latch::Exclusive, &sibling_pid)?;
        let sibling_pod = self.buffer_pool.fetch_leaf_page(&sibling_pid)?;
        tx.push_page(&sibling_pid);

        let node_size = node_pod.rl().get_size();
        let sibling_size = sibling_pod.rl().get_size();
        let max_size = node_pod.rl().get_max_size();

        if node_size + sibling_size <= max_size {
            // coalesce; the survivor is always the left page
            let (left_pod, right_pod) = if sibling_is_right {
                (node_pod, sibling_pod)
            } else {
                (sibling_pod, node_pod)
            };
            let right_pid = right_pod.rl().get_pid();
            let remove_index = parent_pod
                .rl()
                .value_index(&right_pid)
                .expect("the right page is not referenced by its parent");

            // hold the left and right page
            {
                let mut left = left_pod.wl();
                let mut right = right_pod.wl();
                right.move_all_to(&mut left);
            }
            // release the left and right page

            tx.add_deleted_page(&right_pid);
            parent_pod.wl().remove(remove_index);
            debug!(
                "leaf {} coalesced into its left sibling",
                right_pid
            );

            if self.internal_underflows(&parent_pod) {
                self.coalesce_or_redistribute_internal(
                    tx,
                    parent_pod.clone(),
                )?;
            }
        } else {
            // redistribute a single pair and refresh the separator
            if sibling_is_right {
                let new_separator = {
                    let mut sibling = sibling_pod.wl();
                    let mut node = node_pod.wl();
                    sibling.move_first_to_end_of(&mut node)
                };
                parent_pod.wl().set_key_at(sibling_index, &new_separator);
            } else {
                let new_separator = {
                    let mut sibling = sibling_pod.wl();
                    let mut node = node_pod.wl();
                    sibling.move_last_to_front_of(&mut node)
                };
                parent_pod.wl().set_key_at(node_index, &new_separator);
            }
        }

        self.buffer_pool.unpin_page(&parent_pid, true)
    }

    fn coalesce_or_redistribute_internal(
        &self,
        tx: &Transaction,
        node_pod: Pod<BTreeInternalPage<K>>,
    ) -> IndexResult {
        if node_pod.rl().is_root() {
            return self.adjust_root(tx, TreeNode::Internal(node_pod));
        }

        let node_pid = node_pod.rl().get_pid();
        let parent_pid = node_pod
            .rl()
            .get_parent_pid()
            .expect("a non-root page has a parent");
        let parent_pod = self.buffer_pool.fetch_internal_page(&parent_pid)?;

        let (sibling_pid, node_index, sibling_index, sibling_is_right) =
            self.pick_sibling(&parent_pod, &node_pid);

        self.latches.acquire(tx, Latch::Exclusive, &sibling_pid)?;
        let sibling_pod = self.buffer_pool.fetch_internal_page(&sibling_pid)?;
        tx.push_page(&sibling_pid);

        let node_size = node_pod.rl().get_size();
        let sibling_size = sibling_pod.rl().get_size();
        let max_size = node_pod.rl().get_max_size();

        if node_size + sibling_size <= max_size {
            // coalesce; the separator between the two pages is pulled
            // down as the key of the right page's first child
            let (left_pod, right_pod) = if sibling_is_right {
                (node_pod, sibling_pod)
            } else {
                (sibling_pod, node_pod)
            };
            let right_pid = right_pod.rl().get_pid();
            let remove_index = parent_pod
                .rl()
                .value_index(&right_pid)
                .expect("the right page is not referenced by its parent");
            let middle_key = parent_pod.rl().key_at(remove_index);

            // hold the left and right page
            {
                let mut left = left_pod.wl();
                let mut right = right_pod.wl();
                right.move_all_to(&mut left, &middle_key, &self.buffer_pool)?;
            }
            // release the left and right page

            tx.add_deleted_page(&right_pid);
            parent_pod.wl().remove(remove_index);
            debug!(
                "internal {} coalesced into its left sibling",
                right_pid
            );

            if self.internal_underflows(&parent_pod) {
                self.coalesce_or_redistribute_internal(
                    tx,
                    parent_pod.clone(),
                )?;
            }
        } else {
            // rotate one child through the parent separator
            if sibling_is_right {
                let separator = parent_pod.rl().key_at(sibling_index);
                let pushed_up = {
                    let mut sibling = sibling_pod.wl();
                    let mut node = node_pod.wl();
                    sibling.move_first_to_end_of(
                        &mut node,
                        &separator,
                        &self.buffer_pool,
                    )?
                };
                parent_pod.wl().set_key_at(sibling_index, &pushed_up);
            } else {
                let separator = parent_pod.rl().key_at(node_index);
                let pushed_up = {
                    let mut sibling = sibling_pod.wl();
                    let mut node = node_pod.wl();
                    sibling.move_last_to_front_of(
                        &mut node,
                        &separator,
                        &self.buffer_pool,
                    )?
                };
                parent_pod.wl().set_key_at(node_index, &pushed_up);
            }
        }

        self.buffer_pool.unpin_page(&parent_pid, true)
    }

    /// Handle an underflow of the root itself. An emptied root leaf
    /// unsets the tree; a root with a single child hands the root
    /// role down one level. Either way the header page records the
    /// change and the old root is scheduled for deletion.
    fn adjust_root(
        &self,
        tx: &Transaction,
        old_root: TreeNode<K>,
    ) -> IndexResult {
        match old_root {
            TreeNode::Leaf(pod) => {
                debug_assert_eq!(pod.rl().get_size(), 0);
                let old_pid = pod.rl().get_pid();

                self.set_root_pid(None);
                self.update_root_record(false)?;
                tx.add_deleted_page(&old_pid);

                debug!("index {} is empty again", self.get_name());
                Ok(())
            }
            TreeNode::Internal(pod) => {
                debug_assert_eq!(pod.rl().get_size(), 1);
                let old_pid = pod.rl().get_pid();
                let child_pid = pod.wl().remove_and_return_only_child();

                // the sole child becomes the new root
                match child_pid.category {
                    PageCategory::Leaf => {
                        let child =
                            self.buffer_pool.fetch_leaf_page(&child_pid)?;
                        child.wl().clear_parent_pid();
                    }
                    PageCategory::Internal => {
                        let child =
                            self.buffer_pool.fetch_internal_page(&child_pid)?;
                        child.wl().clear_parent_pid();
                    }
                    PageCategory::Header => {
                        return Err(IndexError::new(
                            "the header page cannot become the root",
                        ));
                    }
                }
                self.buffer_pool.unpin_page(&child_pid, true)?;

                self.set_root_pid(Some(child_pid));
                self.update_root_record(false)?;
                tx.add_deleted_page(&old_pid);

                debug!(
                    "root collapsed, index: {}, new root: {}",
                    self.get_name(),
                    child_pid
                );
                Ok(())
            }
        }
    }
}
