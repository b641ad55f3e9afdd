use bincode::{Decode, Encode};
use log::debug;

use super::{
    BTreeBasePage, BTreePage, BTreePageID, PageCategory, EMPTY_PAGE_INDEX,
};
use crate::{
    buffer,
    error::IndexError,
    key::IndexKey,
    rid::Rid,
    utils::{ceil_div, floor_div},
};

/// Fixed bytes of the encoded leaf page outside the entry array: the
/// header (16) and the entry count (8).
const LEAF_HEADER_BYTES: usize = 24;

/// Encoded width of a Rid.
const RID_BYTES: usize = 8;

/// Header (16 bytes):
/// ------------------------------------------------------------------
/// | PAGE_INDEX (4) | PARENT_INDEX (4) | NEXT_INDEX (4) | MAX_SIZE (4) |
/// ------------------------------------------------------------------
#[derive(Encode, Decode)]
struct LeafPageHeader {
    page_index: u32,
    parent_page_index: u32,
    next_page_index: u32,
    max_size: u32,
}

/// An ordered key/record page, linked to its right sibling for range
/// iteration.
pub struct BTreeLeafPage<K: IndexKey> {
    base: BTreeBasePage,

    // sorted by key, strictly increasing
    entries: Vec<(K, Rid)>,

    next_page_index: u32,

    max_size: u32,
}

impl<K: IndexKey> std::ops::Deref for BTreeLeafPage<K> {
    type Target = BTreeBasePage;
    fn deref(&self) -> &Self::Target {
        &self.base
    }
}

impl<K: IndexKey> std::ops::DerefMut for BTreeLeafPage<K> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.base
    }
}

impl<K: IndexKey> BTreeLeafPage<K> {
    pub fn new(pid: &BTreePageID) -> Self {
        Self {
            base: BTreeBasePage::new(pid),
            entries: Vec::new(),
            next_page_index: EMPTY_PAGE_INDEX,
            max_size: Self::calculate_max_size() as u32,
        }
    }

    /// The maximum number of entries a leaf page may hold. One entry
    /// of headroom is reserved so an insert can overflow transiently
    /// before the split.
    pub fn calculate_max_size() -> usize {
        let page_size = buffer::get_page_size();
        let entry_bytes = K::LEN + RID_BYTES;
        let slots = (page_size - LEAF_HEADER_BYTES) / entry_bytes;
        assert!(slots >= 2, "page size {} is too small", page_size);
        slots - 1
    }

    pub fn get_size(&self) -> usize {
        self.entries.len()
    }

    pub fn get_max_size(&self) -> usize {
        self.max_size as usize
    }

    pub fn get_min_size(&self) -> usize {
        ceil_div(self.max_size as usize, 2)
    }

    pub fn get_next_pid(&self) -> Option<BTreePageID> {
        if self.next_page_index == EMPTY_PAGE_INDEX {
            return None;
        }
        Some(BTreePageID::new(PageCategory::Leaf, self.next_page_index))
    }

    pub fn set_next_pid(&mut self, pid: Option<BTreePageID>) {
        match pid {
            Some(pid) => {
                self.next_page_index = pid.page_index;
            }
            None => {
                self.next_page_index = EMPTY_PAGE_INDEX;
            }
        }
    }

    pub fn key_at(&self, index: usize) -> K {
        self.entries[index].0.clone()
    }

    pub fn entry_at(&self, index: usize) -> (K, Rid) {
        self.entries[index].clone()
    }

    /// The first slot whose key is greater than or equal to `key`
    /// (`get_size()` when every key is smaller). Binary search.
    pub fn key_index(&self, key: &K) -> usize {
        match self.entries.binary_search_by(|(k, _)| k.cmp(key)) {
            Ok(index) => index,
            Err(index) => index,
        }
    }

    pub fn lookup(&self, key: &K) -> Option<Rid> {
        match self.entries.binary_search_by(|(k, _)| k.cmp(key)) {
            Ok(index) => Some(self.entries[index].1),
            Err(_) => None,
        }
    }

    /// Insert the pair in sorted position. The caller has ruled out
    /// duplicates.
    pub fn insert(&mut self, key: &K, rid: &Rid) {
        let index = match self.entries.binary_search_by(|(k, _)| k.cmp(key)) {
            Ok(_) => panic!("duplicate key inserted into leaf page"),
            Err(index) => index,
        };
        self.entries.insert(index, (key.clone(), *rid));
    }

    /// Remove the entry of `key` if present; the size is unchanged
    /// when the key is absent. Returns the resulting size.
    pub fn remove_and_delete_record(&mut self, key: &K) -> usize {
        if let Ok(index) = self.entries.binary_search_by(|(k, _)| k.cmp(key)) {
            self.entries.remove(index);
        }
        self.entries.len()
    }

    /// Move the upper half of the entries to the fresh right sibling
    /// and splice it into the leaf chain.
    pub fn move_half_to(&mut self, recipient: &mut Self) {
        let keep = floor_div(self.entries.len(), 2);
        recipient.entries = self.entries.split_off(keep);

        recipient.set_next_pid(self.get_next_pid());
        self.set_next_pid(Some(recipient.get_pid()));

        debug!(
            "leaf {} split, moved {} entries to {}",
            self.get_pid(),
            recipient.entries.len(),
            recipient.get_pid()
        );
    }

    /// Move every entry to the left sibling. The survivor inherits
    /// this page's next pointer, keeping the leaf chain intact before
    /// this page is scheduled for deletion.
    pub fn move_all_to(&mut self, recipient: &mut Self) {
        recipient.entries.append(&mut self.entries);
        recipient.set_next_pid(self.get_next_pid());
    }

    /// Move the first entry to the end of the left sibling. Returns
    /// this page's new first key, the separator the parent must take.
    pub fn move_first_to_end_of(&mut self, recipient: &mut Self) -> K {
        let pair = self.entries.remove(0);
        recipient.entries.push(pair);
        self.entries[0].0.clone()
    }

    /// Move the last entry to the front of the right sibling. Returns
    /// the sibling's new first key, the separator the parent must
    /// take.
    pub fn move_last_to_front_of(&mut self, recipient: &mut Self) -> K {
        let pair = self.entries.pop().expect("leaf page is empty");
        recipient.entries.insert(0, pair);
        recipient.entries[0].0.clone()
    }

    /// Panic when the page violates its invariants. Test-only.
    pub fn check_integrity(
        &self,
        parent_pid: Option<&BTreePageID>,
        lower_bound: Option<&K>,
        upper_bound: Option<&K>,
        check_occupancy: bool,
    ) {
        assert_eq!(self.get_pid().category, PageCategory::Leaf);
        assert_eq!(self.get_parent_pid().as_ref(), parent_pid);
        assert!(self.entries.len() <= self.max_size as usize + 1);

        let mut previous: Option<&K> = lower_bound;
        for (k, _) in self.entries.iter() {
            if let Some(previous) = previous {
                assert!(
                    previous <= k,
                    "leaf {} keys out of order: {:?} before {:?}",
                    self.get_pid(),
                    previous,
                    k,
                );
            }
            previous = Some(k);
        }

        if let (Some(upper), Some(last)) = (upper_bound, previous) {
            assert!(
                last < upper,
                "leaf {} last key {:?} reaches the upper bound {:?}",
                self.get_pid(),
                last,
                upper,
            );
        }

        if check_occupancy && !self.is_root() {
            assert!(
                self.get_size() >= self.get_min_size(),
                "leaf {} below minimum occupancy: {}/{}",
                self.get_pid(),
                self.get_size(),
                self.get_min_size(),
            );
        }
    }
}

impl<K: IndexKey> BTreePage for BTreeLeafPage<K> {
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

        let (header, used): (LeafPageHeader, usize) =
            bincode::decode_from_slice(bytes, config).map_err(|e| {
                IndexError::new(&format!("corrupt leaf page {}: {}", pid, e))
            })?;
        let (entries, _): (Vec<(K, Rid)>, usize) =
            bincode::decode_from_slice(&bytes[used..], config).map_err(|e| {
                IndexError::new(&format!("corrupt leaf page {}: {}", pid, e))
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
            next_page_index: header.next_page_index,
            max_size: header.max_size,
        })
    }

    fn to_image(&self) -> Result<Vec<u8>, IndexError> {
        let config = bincode::config::standard().with_fixed_int_encoding();

        let header = LeafPageHeader {
            page_index: self.get_pid().page_index,
            parent_page_index: self
                .get_parent_pid()
                .map(|pid| pid.page_index)
                .unwrap_or(EMPTY_PAGE_INDEX),
            next_page_index: self.next_page_index,
            max_size: self.max_size,
        };

        let mut image = bincode::encode_to_vec(&header, config)
            .map_err(|e| IndexError::new(&format!("encode leaf page: {}", e)))?;
        let body = bincode::encode_to_vec(&self.entries, config)
            .map_err(|e| IndexError::new(&format!("encode leaf page: {}", e)))?;
        image.extend(body);
        Ok(image)
    }
}
