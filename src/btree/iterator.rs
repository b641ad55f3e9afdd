use log::error;

use super::{BTreeIndex, OpType, SearchFor};
use crate::{
    btree::page::{BTreeLeafPage, BTreePage, BTreePageID},
    error::IndexError,
    key::IndexKey,
    latch::Latch,
    rid::Rid,
    transaction::Transaction,
    types::Pod,
    utils::HandyRwLock,
};

/// Forward iterator over the leaf chain.
///
/// Holds at most one leaf read-latched (and pinned) at a time; moving
/// past the end of a leaf releases it before the next leaf is
/// latched, so an iterator can never participate in a latch cycle.
pub struct BTreeIndexIterator<'t, K: IndexKey> {
    index: &'t BTreeIndex<K>,
    tx: &'t Transaction,

    page_pod: Option<Pod<BTreeLeafPage<K>>>,
    cursor: usize,
}

impl<K: IndexKey> BTreeIndex<K> {
    /// An iterator positioned at the first key of the tree.
    pub fn iter<'t>(
        &'t self,
        tx: &'t Transaction,
    ) -> Result<BTreeIndexIterator<'t, K>, IndexError> {
        let page_pod =
            self.find_leaf_page(tx, OpType::Read, SearchFor::LeftMost)?;
        Ok(self.into_iterator(tx, page_pod, 0))
    }

    /// An iterator positioned at `key` (or the next larger key when
    /// it is absent).
    pub fn iter_from<'t>(
        &'t self,
        tx: &'t Transaction,
        key: &K,
    ) -> Result<BTreeIndexIterator<'t, K>, IndexError> {
        let page_pod =
            self.find_leaf_page(tx, OpType::Read, SearchFor::Key(key))?;
        let cursor = match &page_pod {
            Some(pod) => pod.rl().key_index(key),
            None => 0,
        };
        Ok(self.into_iterator(tx, page_pod, cursor))
    }

    fn into_iterator<'t>(
        &'t self,
        tx: &'t Transaction,
        page_pod: Option<Pod<BTreeLeafPage<K>>>,
        cursor: usize,
    ) -> BTreeIndexIterator<'t, K> {
        // the descent has freed every ancestor already; take over the
        // leaf's latch and pin from the transaction's page set
        if page_pod.is_some() {
            let handed_over = self.tx_pop_leaf(tx);
            debug_assert!(handed_over);
        }
        self.try_unlock_tree(false);

        BTreeIndexIterator {
            index: self,
            tx,
            page_pod,
            cursor,
        }
    }

    fn tx_pop_leaf(&self, tx: &Transaction) -> bool {
        tx.pop_newest_page().is_some()
    }
}

impl<'t, K: IndexKey> BTreeIndexIterator<'t, K> {
    pub fn is_end(&self) -> bool {
        self.page_pod.is_none()
    }

    fn release_current(&mut self) {
        if let Some(pod) = self.page_pod.take() {
            let pid = pod.rl().get_pid();
            self.index.latches.release(self.tx, &pid);
            if let Err(e) = self.index.buffer_pool.unpin_page(&pid, false) {
                error!("iterator failed to unpin leaf {}: {}", pid, e);
            }
        }
    }

    /// Latch and pin the next leaf. The current leaf must already be
    /// released; latching after releasing keeps the iterator out of
    /// any hold-and-wait cycle.
    fn advance_to(&mut self, pid: &BTreePageID) -> Result<(), IndexError> {
        self.index.latches.acquire(self.tx, Latch::Shared, pid)?;
        match self.index.buffer_pool.fetch_leaf_page(pid) {
            Ok(pod) => {
                self.page_pod = Some(pod);
                self.cursor = 0;
                Ok(())
            }
            Err(e) => {
                self.index.latches.release(self.tx, pid);
                Err(e)
            }
        }
    }
}

impl<'t, K: IndexKey> Iterator for BTreeIndexIterator<'t, K> {
    type Item = (K, Rid);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let pod = self.page_pod.as_ref()?;

            let (entry, next_pid) = {
                let page = pod.rl();
                if self.cursor < page.get_size() {
                    (Some(page.entry_at(self.cursor)), None)
                } else {
                    (None, page.get_next_pid())
                }
            };

            if let Some(entry) = entry {
                self.cursor += 1;
                return Some(entry);
            }

            self.release_current();
            match next_pid {
                Some(next_pid) => {
                    if let Err(e) = self.advance_to(&next_pid) {
                        error!(
                            "iterator failed to advance to {}: {}",
                            next_pid, e
                        );
                        return None;
                    }
                }
                None => return None,
            }
        }
    }
}

impl<'t, K: IndexKey> Drop for BTreeIndexIterator<'t, K> {
    fn drop(&mut self) {
        self.release_current();
    }
}
