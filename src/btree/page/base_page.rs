use bincode::{Decode, Encode};

use super::{BTreePageID, PageCategory, EMPTY_PAGE_INDEX};

/// The state every tree page carries: its own id and the parent link.
///
/// The parent is stored as a bare page index (parents are always
/// internal pages); index 0 marks the root.
#[derive(Encode, Decode)]
pub struct BTreeBasePage {
    pid: BTreePageID,
    parent_page_index: u32,
}

impl BTreeBasePage {
    pub fn new(pid: &BTreePageID) -> BTreeBasePage {
        BTreeBasePage {
            pid: *pid,
            parent_page_index: EMPTY_PAGE_INDEX,
        }
    }

    pub fn get_pid(&self) -> BTreePageID {
        self.pid
    }

    pub fn get_parent_pid(&self) -> Option<BTreePageID> {
        if self.parent_page_index == EMPTY_PAGE_INDEX {
            return None;
        }
        Some(BTreePageID::new(
            PageCategory::Internal,
            self.parent_page_index,
        ))
    }

    pub fn set_parent_pid(&mut self, pid: &BTreePageID) {
        self.parent_page_index = pid.page_index;
    }

    pub fn clear_parent_pid(&mut self) {
        self.parent_page_index = EMPTY_PAGE_INDEX;
    }
}
