use bincode::{Decode, Encode};
use log::debug;

use super::{
    BTreeBasePage, BTreePage, BTreePageID, PageCategory, EMPTY_PAGE_INDEX,
};
use crate::{
    buffer::{self, BufferPool},
    error::IndexError,
    key::IndexKey,
    types::IndexResult,
    utils::{ceil_div, floor_div},
};

/// Fixed bytes of the encoded internal page outside the entry array:
/// the header (12) and the entry count (8).
const INTERNAL_HEADER_BYTES: usize = 20;

/// Encoded width of a child page id (category tag + index).
const PID_BYTES: usize = 8;

/// Header (12 bytes):
/// ---------------------------------------------------
/// | PAGE_INDEX (4) | PARENT_INDEX (4) | MAX_SIZE (4) |
/// ---------------------------------------------------
#[derive(Encode, Decode)]
struct InternalPageHeader {
    page_index: u32,
    parent_page_index: u32,
    max_size: u32,
}

/// An ordered separator-key page routing lookups to its children.
///
/// Slot 0's key is never read (the "minus infinity" separator): a page
/// with n children carries n - 1 meaningful keys. The subtree behind
/// child i holds exactly the keys k with key_at(i) <= k < key_at(i+1).
pub struct BTreeInternalPage<K: IndexKey> {
    base: BTreeBasePage,

    // (separator key, child); entry 0's key is unused
    entries: Vec<(K, BTreePageID)>,

    max_size: u32,
}

impl<K: IndexKey> std::ops::Deref for BTreeInternalPage<K> {
    type Target = BTreeBasePage;
    fn deref(&self) -> &Self::Target {
        &self.base
    }
}

impl<K: IndexKey> std::ops::DerefMut for BTreeInternalPage<K> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.base
    }
}

impl<K: IndexKey> BTreeInternalPage<K> {
    pub fn new(pid: &BTreePageID) -> Self {
        Self {
            base: BTreeBasePage::new(pid),
            entries: Vec::new(),
            max_size: Self::calculate_max_size() as u32,
        }
    }

    /// The maximum number of children an internal page may hold, with
    /// one slot of headroom for the transient overflow before a split.
    pub fn calculate_max_size() -> usize {
        let page_size = buffer::get_page_size();
        let entry_bytes = K::LEN + PID_BYTES;
        let slots = (page_size - INTERNAL_HEADER_BYTES) / entry_bytes;
        assert!(slots >= 3, "page size {} is too small", page_size);
        slots - 1
    }

    /// The number of children (one more than the number of meaningful
    /// separator keys).
    pub fn get_size(&self) -> usize {
        self.entries.len()
    }

    pub fn get_max_size(&self) -> usize {
        self.max_size as usize
    }

    pub fn get_min_size(&self) -> usize {
        ceil_div(self.max_size as usize, 2)
    }

    pub fn key_at(&self, index: usize) -> K {
        self.entries[index].0.clone()
    }

    pub fn set_key_at(&mut self, index: usize, key: &K) {
        debug_assert!(index >= 1 && index < self.entries.len());
        self.entries[index].0 = key.clone();
    }

    pub fn value_at(&self, index: usize) -> BTreePageID {
        self.entries[index].1
    }

    /// The first slot whose child equals `value`, or None.
    pub fn value_index(&self, value: &BTreePageID) -> Option<usize> {
        self.entries.iter().position(|(_, child)| child == value)
    }

    /// The child to descend into for `key`: binary search over the
    /// meaningful separators for the greatest one not exceeding the
    /// key, falling back to child 0.
    pub fn lookup(&self, key: &K) -> BTreePageID {
        assert!(self.get_size() > 1);

        let mut begin = 1;
        let mut end = self.get_size() - 1;
        while begin <= end {
            let mid = begin + (end - begin) / 2;
            if self.entries[mid].0 <= *key {
                begin = mid + 1;
            } else {
                end = mid - 1;
            }
        }
        self.entries[begin - 1].1
    }

    /// Initialize a fresh root with two children around one key.
    pub fn populate_new_root(
        &mut self,
        old_value: &BTreePageID,
        new_key: &K,
        new_value: &BTreePageID,
    ) {
        debug_assert!(self.entries.is_empty());
        self.entries.push((K::default(), *old_value));
        self.entries.push((new_key.clone(), *new_value));
    }

    /// Insert `new_key`/`new_value` right after the slot holding
    /// `old_value`. Returns the new size.
    pub fn insert_node_after(
        &mut self,
        old_value: &BTreePageID,
        new_key: &K,
        new_value: &BTreePageID,
    ) -> usize {
        let index = self
            .value_index(old_value)
            .expect("the split child is not referenced by its parent");
        self.entries
            .insert(index + 1, (new_key.clone(), *new_value));
        self.entries.len()
    }

    /// Remove the key and child at `index`, shifting the tail left.
    pub fn remove(&mut self, index: usize) {
        self.entries.remove(index);
    }

    /// Remove and return the only remaining child. Only called by the
    /// root adjustment.
    pub fn remove_and_return_only_child(&mut self) -> BTreePageID {
        assert_eq!(self.get_size(), 1);
        self.entries.pop().unwrap().1
    }

    /// Move the upper half of the entries to the fresh right sibling.
    /// The middle key travels into the sibling's slot 0, where the
    /// caller picks it up for promotion. Every moved child is
    /// re-parented through the buffer pool.
    pub fn move_half_to(
        &mut self,
        recipient: &mut Self,
        buffer_pool: &BufferPool<K>,
    ) -> IndexResult {
        let keep = floor_div(self.entries.len(), 2);
        recipient.entries = self.entries.split_off(keep);

        let recipient_pid = recipient.get_pid();
        for (_, child_pid) in recipient.entries.iter() {
            buffer_pool.set_parent_pid(child_pid, &recipient_pid)?;
        }

        debug!(
            "internal {} split, moved {} children to {}",
            self.get_pid(),
            recipient.entries.len(),
            recipient.get_pid()
        );
        Ok(())
    }

    /// Move every entry to the left sibling, pulling `middle_key` (the
    /// separator between the two pages) down as the key of the first
    /// moved child. Every moved child is re-parented.
    pub fn move_all_to(
        &mut self,
        recipient: &mut Self,
        middle_key: &K,
        buffer_pool: &BufferPool<K>,
    ) -> IndexResult {
        self.entries[0].0 = middle_key.clone();

        let recipient_pid = recipient.get_pid();
        for (_, child_pid) in self.entries.iter() {
            buffer_pool.set_parent_pid(child_pid, &recipient_pid)?;
        }
        recipient.entries.append(&mut self.entries);

        debug_assert!(recipient.get_size() <= recipient.get_max_size());
        Ok(())
    }

    /// Rotate the first child to the end of the left sibling:
    /// `separator` (the parent key between the two pages) is pulled
    /// down as the moved child's key, and this page's next separator
    /// is pushed up. Returns the pushed-up key.
    pub fn move_first_to_end_of(
        &mut self,
        recipient: &mut Self,
        separator: &K,
        buffer_pool: &BufferPool<K>,
    ) -> Result<K, IndexError> {
        let (_, moved_child) = self.entries.remove(0);
        let pushed_up = self.entries[0].0.clone();
        // the new slot-0 key is meaningless
        self.entries[0].0 = K::default();

        recipient
            .entries
            .push((separator.clone(), moved_child));
        buffer_pool.set_parent_pid(&moved_child, &recipient.get_pid())?;

        Ok(pushed_up)
    }

    /// Rotate the last child to the front of the right sibling:
    /// `separator` is pulled down as the key of the sibling's old
    /// first child, and the moved entry's key is pushed up. Returns
    /// the pushed-up key.
    pub fn move_last_to_front_of(
        &mut self,
        recipient: &mut Self,
        separator: &K,
        buffer_pool: &BufferPool<K>,
    ) -> Result<K, IndexError> {
        let (pushed_up, moved_child) =
            self.entries.pop().expect("internal page is empty");

        recipient.entries.insert(0, (K::default(), moved_child));
        recipient.entries[1].0 = separator.clone();
        buffer_pool.set_parent_pid(&moved_child, &recipient.get_pid())?;

        Ok(pushed_up)
    }

    /// Panic when the page violates its invariants. Test-only.
    pub fn check_integrity(
        &self,
        parent_pid: Option<&BTreePageID>,
        lower_bound: Option<&K>,
        upper_bound: Option<&K>,
        check_occupancy: bool,
    ) {
        assert_eq!(self.get_pid().category, PageCategory::Internal);
        assert_eq!(self.get_parent_pid().as_ref(), parent_pid);
        assert!(
            self.get_size() >= 2,
            "internal {} has fewer than two children",
            self.get_pid(),
        );
        assert!(self.entries.len() <= self.max_size as usize + 1);

        let mut previous: Option<&K> = lower_bound;
        for (k, _) in self.entries.iter().skip(1) {
            if let Some(previous) = previous {
                assert!(
                    previous < k,
                    "internal {} separators out of order: {:?} before {:?}",
                    self.get_pid(),
                    previous,
                    k,
                );
            }
            previous = Some(k);
        }

        if let (Some(upper), Some(last)) = (upper_bound, previous) {
            assert!(
                last <= upper,
                "internal {} last separator {:?} exceeds the bound {:?}",
                self.get_pid(),
                last,
                upper,
            );
        }

        if check_occupancy && !self.is_root() {
            assert!(
                self.get_size() >= self.get_min_size(),
                "internal {} below minimum occupancy: {}/{}",
                self.get_pid(),
                self.get_size(),
                self.get_min_size(),
            );
        }
    }
}

impl<K: IndexKey> BTreePage for BTreeInternalPage<K> {
    fn get_pid(&self) -> BTreePageID {
        self.base.get_pid()
    }

    fn get_parent_pid(&self) -> Option<BTreePageID> {
        self.base.get_parent_pid()
    }

    fn set_parent_pid(&mut self, pid: &BTreePageID) {
        self.base.set_parent_pid(pid)
    }

    fn clear_parent_pid(&mut self) {
        self.base.clear_parent_pid()
    }

    fn from_image(pid: &BTreePageID, bytes: &[u8]) -> Result<Self, IndexError> {
        let config = bincode::config::standard().with_fixed_int_encoding();

        let (header, used): (InternalPageHeader, usize) =
            bincode::decode_from_slice(bytes, config).map_err(|e| {
                IndexError::new(&format!("corrupt internal page {}: {}", pid, e))
            })?;
        let (entries, _): (Vec<(K, BTreePageID)>, usize) =
            bincode::decode_from_slice(&bytes[used..], config).map_err(|e| {
                IndexError::new(&format!("corrupt internal page {}: {}", pid, e))
            })?;

        if header.page_index != pid.page_index {
            return Err(IndexError::new(&format!(
                "page image of index {} read as {}",
                header.page_index, pid
            )));
        }

        let mut base = BTreeBasePage::new(pid);
        if header.parent_page_index != EMPTY_PAGE_INDEX {
            base.set_parent_pid(&BTreePageID::new(
                PageCategory::Internal,
                header.parent_page_index,
            ));
        }

        Ok(Self {
            base,
            entries,
            max_size: header.max_size,
        })
    }

    fn to_image(&self) -> Result<Vec<u8>, IndexError> {
        let config = bincode::config::standard().with_fixed_int_encoding();

        let header = InternalPageHeader {
            page_index: self.get_pid().page_index,
            parent_page_index: self
                .get_parent_pid()
                .map(|pid| pid.page_index)
                .unwrap_or(EMPTY_PAGE_INDEX),
            max_size: self.max_size,
        };

        let mut image = bincode::encode_to_vec(&header, config).map_err(|e| {
            IndexError::new(&format!("encode internal page: {}", e))
        })?;
        let body = bincode::encode_to_vec(&self.entries, config).map_err(
            |e| IndexError::new(&format!("encode internal page: {}", e)),
        )?;
        image.extend(body);
        Ok(image)
    }
}
