use bincode::{Decode, Encode};

use super::{BTreeBasePage, BTreePage, BTreePageID};
use crate::error::IndexError;

/// The process-global page at index 0, persisting the mapping from
/// index name to root page id.
///
/// Every index inserts its record on first root creation and updates
/// it on every root change, so the root survives a restart. A record
/// holding None belongs to an index whose tree has become empty.
#[derive(Encode, Decode)]
pub struct BTreeHeaderPage {
    base: BTreeBasePage,

    records: Vec<(String, Option<BTreePageID>)>,
}

impl std::ops::Deref for BTreeHeaderPage {
    type Target = BTreeBasePage;
    fn deref(&self) -> &Self::Target {
        &self.base
    }
}

impl std::ops::DerefMut for BTreeHeaderPage {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.base
    }
}

impl BTreeHeaderPage {
    pub fn new() -> Self {
        Self {
            base: BTreeBasePage::new(&BTreePageID::header()),
            records: Vec::new(),
        }
    }

    /// Register a new index. Returns false when a record with this
    /// name already exists.
    pub fn insert_record(
        &mut self,
        name: &str,
        root_pid: Option<BTreePageID>,
    ) -> bool {
        if self.records.iter().any(|(n, _)| n == name) {
            return false;
        }
        self.records.push((name.to_string(), root_pid));
        true
    }

    /// Update the root of a registered index. Returns false when the
    /// name is unknown.
    pub fn update_record(
        &mut self,
        name: &str,
        root_pid: Option<BTreePageID>,
    ) -> bool {
        for (n, root) in self.records.iter_mut() {
            if n == name {
                *root = root_pid;
                return true;
            }
        }
        false
    }

    /// The recorded root of `name`: None when the index is not
    /// registered, Some(None) when its tree is empty.
    pub fn get_record(&self, name: &str) -> Option<Option<BTreePageID>> {
        self.records
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, root)| *root)
    }
}

impl BTreePage for BTreeHeaderPage {
    fn get_pid(&self) -> BTreePageID {
        self.base.get_pid()
    }

    fn get_parent_pid(&self) -> Option<BTreePageID> {
        None
    }

    fn set_parent_pid(&mut self, _pid: &BTreePageID) {
        panic!("the header page has no parent");
    }

    fn clear_parent_pid(&mut self) {}

    fn from_image(pid: &BTreePageID, bytes: &[u8]) -> Result<Self, IndexError> {
        let config = bincode::config::standard().with_fixed_int_encoding();
        let (page, _): (BTreeHeaderPage, usize) =
            bincode::decode_from_slice(bytes, config).map_err(|e| {
                IndexError::new(&format!("corrupt header page {}: {}", pid, e))
            })?;

        if page.base.get_pid() != *pid {
            return Err(IndexError::new(&format!(
                "page image of index {} read as {}",
                page.base.get_pid().page_index,
                pid
            )));
        }

        Ok(page)
    }

    fn to_image(&self) -> Result<Vec<u8>, IndexError> {
        let config = bincode::config::standard().with_fixed_int_encoding();
        bincode::encode_to_vec(self, config)
            .map_err(|e| IndexError::new(&format!("encode header page: {}", e)))
    }
}
