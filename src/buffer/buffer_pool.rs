use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, RwLock},
};

use log::debug;

use super::{get_page_size, LruReplacer};
use crate::{
    btree::page::{
        BTreeHeaderPage, BTreeInternalPage, BTreeLeafPage, BTreePage,
        BTreePageID, PageCategory,
    },
    error::IndexError,
    hash::ExtendibleHashTable,
    key::IndexKey,
    storage::DiskManager,
    types::{IndexResult, Pod, ResultPod},
    utils::HandyRwLock,
};

struct FrameBook {
    // pin count of every buffered page; an entry exists exactly while
    // the page is buffered
    pin_counts: HashMap<BTreePageID, usize>,
    dirty: HashSet<BTreePageID>,
}

/// The pinning and caching layer all page access goes through.
///
/// Every `fetch_*`/`new_*` call pins the returned page and must be
/// balanced by exactly one `unpin_page`; unpinned pages become
/// eviction candidates and dirty victims are written back before
/// their frame is dropped. The page tables mapping page ids to
/// buffered pages are extendible hash tables.
pub struct BufferPool<K: IndexKey> {
    capacity: usize,
    disk_manager: DiskManager,

    leaf_buffer: ExtendibleHashTable<BTreePageID, Pod<BTreeLeafPage<K>>>,
    internal_buffer:
        ExtendibleHashTable<BTreePageID, Pod<BTreeInternalPage<K>>>,
    header_buffer: ExtendibleHashTable<BTreePageID, Pod<BTreeHeaderPage>>,

    replacer: LruReplacer<BTreePageID>,
    book: Mutex<FrameBook>,
}

impl<K: IndexKey> BufferPool<K> {
    pub fn new(file_path: &str, capacity: usize) -> Result<Self, IndexError> {
        assert!(capacity >= 2);

        let disk_manager = DiskManager::new(file_path, get_page_size())?;

        // the header page lives at index 0 and exists from the start
        let header_page = BTreeHeaderPage::new();
        disk_manager.write_page(
            BTreePageID::header().page_index,
            &header_page.to_image()?,
        )?;

        Ok(Self {
            capacity,
            disk_manager,
            leaf_buffer: ExtendibleHashTable::new(),
            internal_buffer: ExtendibleHashTable::new(),
            header_buffer: ExtendibleHashTable::new(),
            replacer: LruReplacer::new(),
            book: Mutex::new(FrameBook {
                pin_counts: HashMap::new(),
                dirty: HashSet::new(),
            }),
        })
    }

    pub fn get_file_path(&self) -> &str {
        self.disk_manager.get_file_path()
    }

    fn lock_book(&self) -> MutexGuard<'_, FrameBook> {
        self.book.lock().unwrap()
    }

    pub fn fetch_leaf_page(
        &self,
        pid: &BTreePageID,
    ) -> ResultPod<BTreeLeafPage<K>> {
        debug_assert_eq!(pid.category, PageCategory::Leaf);
        self.fetch_page(&self.leaf_buffer, pid)
    }

    pub fn fetch_internal_page(
        &self,
        pid: &BTreePageID,
    ) -> ResultPod<BTreeInternalPage<K>> {
        debug_assert_eq!(pid.category, PageCategory::Internal);
        self.fetch_page(&self.internal_buffer, pid)
    }

    pub fn fetch_header_page(&self) -> ResultPod<BTreeHeaderPage> {
        self.fetch_page(&self.header_buffer, &BTreePageID::header())
    }

    fn fetch_page<PAGE: BTreePage>(
        &self,
        buffer: &ExtendibleHashTable<BTreePageID, Pod<PAGE>>,
        pid: &BTreePageID,
    ) -> ResultPod<PAGE> {
        let mut book = self.lock_book();

        if let Some(count) = book.pin_counts.get_mut(pid) {
            if *count == 0 {
                self.replacer.erase(pid);
            }
            *count += 1;
            return buffer.find(pid).ok_or_else(|| {
                IndexError::new(&format!("page table lost page {}", pid))
            });
        }

        self.evict_one_round(&mut book)?;

        let image = self.disk_manager.read_page(pid.page_index)?;
        let page = PAGE::from_image(pid, &image)?;
        let pod: Pod<PAGE> = Arc::new(RwLock::new(page));
        buffer.insert(*pid, pod.clone());
        book.pin_counts.insert(*pid, 1);
        Ok(pod)
    }

    /// Allocate and pin a fresh leaf page. The page is dirty from
    /// birth; it reaches disk on eviction at the latest.
    pub fn new_leaf_page(&self) -> ResultPod<BTreeLeafPage<K>> {
        let mut book = self.lock_book();
        self.evict_one_round(&mut book)?;

        let index = self.disk_manager.allocate_page();
        let pid = BTreePageID::new(PageCategory::Leaf, index);
        let pod = Arc::new(RwLock::new(BTreeLeafPage::new(&pid)));
        self.leaf_buffer.insert(pid, pod.clone());
        book.pin_counts.insert(pid, 1);
        book.dirty.insert(pid);
        debug!("allocated leaf page {}", pid);
        Ok(pod)
    }

    /// Allocate and pin a fresh internal page.
    pub fn new_internal_page(&self) -> ResultPod<BTreeInternalPage<K>> {
        let mut book = self.lock_book();
        self.evict_one_round(&mut book)?;

        let index = self.disk_manager.allocate_page();
        let pid = BTreePageID::new(PageCategory::Internal, index);
        let pod = Arc::new(RwLock::new(BTreeInternalPage::new(&pid)));
        self.internal_buffer.insert(pid, pod.clone());
        book.pin_counts.insert(pid, 1);
        book.dirty.insert(pid);
        debug!("allocated internal page {}", pid);
        Ok(pod)
    }

    /// Make room for one more page, writing dirty victims back.
    fn evict_one_round(&self, book: &mut FrameBook) -> IndexResult {
        while book.pin_counts.len() >= self.capacity {
            let victim = self.replacer.victim().ok_or_else(|| {
                IndexError::new("out of memory: every buffered page is pinned")
            })?;

            if book.dirty.remove(&victim) {
                self.flush_page(&victim)?;
            }
            self.discard_page(&victim);
            book.pin_counts.remove(&victim);
            debug!("evicted page {}", victim);
        }
        Ok(())
    }

    /// Write the current image of a buffered page to disk.
    fn flush_page(&self, pid: &BTreePageID) -> IndexResult {
        let image = match pid.category {
            PageCategory::Leaf => {
                let pod = self.leaf_buffer.find(pid).ok_or_else(|| {
                    IndexError::new(&format!("flush of unbuffered page {}", pid))
                })?;
                let image = pod.rl().to_image()?;
                image
            }
            PageCategory::Internal => {
                let pod = self.internal_buffer.find(pid).ok_or_else(|| {
                    IndexError::new(&format!("flush of unbuffered page {}", pid))
                })?;
                let image = pod.rl().to_image()?;
                image
            }
            PageCategory::Header => {
                let pod = self.header_buffer.find(pid).ok_or_else(|| {
                    IndexError::new(&format!("flush of unbuffered page {}", pid))
                })?;
                let image = pod.rl().to_image()?;
                image
            }
        };
        self.disk_manager.write_page(pid.page_index, &image)
    }

    /// Remove the page from its typed buffer.
    fn discard_page(&self, pid: &BTreePageID) {
        match pid.category {
            PageCategory::Leaf => {
                self.leaf_buffer.remove(pid);
            }
            PageCategory::Internal => {
                self.internal_buffer.remove(pid);
            }
            PageCategory::Header => {
                self.header_buffer.remove(pid);
            }
        }
    }

    /// Drop one pin of the page; `dirty` records whether the caller
    /// modified it.
    pub fn unpin_page(&self, pid: &BTreePageID, dirty: bool) -> IndexResult {
        let mut book = self.lock_book();

        let count = book.pin_counts.get_mut(pid).ok_or_else(|| {
            IndexError::new(&format!("unpin of unbuffered page {}", pid))
        })?;
        if *count == 0 {
            return Err(IndexError::new(&format!(
                "unpin of unpinned page {}",
                pid
            )));
        }
        *count -= 1;
        let now_unpinned = *count == 0;

        if dirty {
            book.dirty.insert(*pid);
        }
        if now_unpinned {
            self.replacer.insert(pid);
        }
        Ok(())
    }

    /// Drop a page for good and free its index for reuse. Only legal
    /// once the page is unpinned.
    pub fn delete_page(&self, pid: &BTreePageID) -> IndexResult {
        let mut book = self.lock_book();

        if let Some(count) = book.pin_counts.get(pid) {
            if *count > 0 {
                return Err(IndexError::new(&format!(
                    "delete of pinned page {}",
                    pid
                )));
            }
        }

        book.pin_counts.remove(pid);
        book.dirty.remove(pid);
        self.replacer.erase(pid);
        self.discard_page(pid);
        self.disk_manager.deallocate_page(pid.page_index);
        debug!("deleted page {}", pid);
        Ok(())
    }

    /// Rewrite the parent pointer of a tree page. Used when splits and
    /// merges move child pointers between internal pages.
    pub fn set_parent_pid(
        &self,
        child_pid: &BTreePageID,
        parent_pid: &BTreePageID,
    ) -> IndexResult {
        match child_pid.category {
            PageCategory::Leaf => {
                let child = self.fetch_leaf_page(child_pid)?;
                child.wl().set_parent_pid(parent_pid);
            }
            PageCategory::Internal => {
                let child = self.fetch_internal_page(child_pid)?;
                child.wl().set_parent_pid(parent_pid);
            }
            PageCategory::Header => {
                return Err(IndexError::new(
                    "the header page cannot be a tree child",
                ));
            }
        }
        self.unpin_page(child_pid, true)
    }

    /// True when no buffered page is pinned. Holds between top-level
    /// index operations.
    pub fn check_all_unpinned(&self) -> bool {
        let book = self.lock_book();
        let mut clean = true;
        for (pid, count) in book.pin_counts.iter() {
            if *count > 0 {
                log::error!("page {} is still pinned ({} pins)", pid, count);
                clean = false;
            }
        }
        clean
    }

    pub fn get_pin_count(&self, pid: &BTreePageID) -> usize {
        self.lock_book().pin_counts.get(pid).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_path(name: &str) -> String {
        format!("./{}.db", name)
    }

    #[test]
    fn test_pin_accounting() {
        let pool: BufferPool<i64> =
            BufferPool::new(&test_path("buffer_pin"), 8).unwrap();

        let leaf = pool.new_leaf_page().unwrap();
        let pid = leaf.rl().get_pid();
        assert_eq!(pool.get_pin_count(&pid), 1);
        assert!(!pool.check_all_unpinned());

        // a second fetch stacks a second pin
        let again = pool.fetch_leaf_page(&pid).unwrap();
        assert!(Arc::ptr_eq(&leaf, &again));
        assert_eq!(pool.get_pin_count(&pid), 2);

        pool.unpin_page(&pid, true).unwrap();
        pool.unpin_page(&pid, false).unwrap();
        assert!(pool.check_all_unpinned());

        // a third unpin is a caller bug
        assert!(pool.unpin_page(&pid, false).is_err());

        std::fs::remove_file(pool.get_file_path()).unwrap();
    }

    #[test]
    fn test_eviction_round_trip() {
        let pool: BufferPool<i64> =
            BufferPool::new(&test_path("buffer_evict"), 2).unwrap();

        // fill the pool beyond capacity; unpinned pages get written
        // back and re-read transparently
        let mut pids = Vec::new();
        for i in 0..8i64 {
            let leaf = pool.new_leaf_page().unwrap();
            let pid = leaf.rl().get_pid();
            leaf.wl().insert(&i, &crate::rid::Rid::new(1, i as u32));
            pool.unpin_page(&pid, true).unwrap();
            pids.push((pid, i));
        }

        for (pid, i) in pids {
            let leaf = pool.fetch_leaf_page(&pid).unwrap();
            assert_eq!(
                leaf.rl().lookup(&i),
                Some(crate::rid::Rid::new(1, i as u32))
            );
            pool.unpin_page(&pid, false).unwrap();
        }

        std::fs::remove_file(pool.get_file_path()).unwrap();
    }

    #[test]
    fn test_all_pinned_is_fatal() {
        let pool: BufferPool<i64> =
            BufferPool::new(&test_path("buffer_full"), 2).unwrap();

        let a = pool.new_leaf_page().unwrap();
        let b = pool.new_leaf_page().unwrap();
        assert!(pool.new_leaf_page().is_err());

        let pid = a.rl().get_pid();
        pool.unpin_page(&pid, false).unwrap();
        assert!(pool.new_leaf_page().is_ok());

        drop(b);
        std::fs::remove_file(pool.get_file_path()).unwrap();
    }

    #[test]
    fn test_delete_page() {
        let pool: BufferPool<i64> =
            BufferPool::new(&test_path("buffer_delete"), 8).unwrap();

        let leaf = pool.new_leaf_page().unwrap();
        let pid = leaf.rl().get_pid();

        // deleting a pinned page is refused
        assert!(pool.delete_page(&pid).is_err());

        pool.unpin_page(&pid, false).unwrap();
        pool.delete_page(&pid).unwrap();

        // the freed index is handed out again
        let again = pool.new_leaf_page().unwrap();
        assert_eq!(again.rl().get_pid().page_index, pid.page_index);

        std::fs::remove_file(pool.get_file_path()).unwrap();
    }
}
