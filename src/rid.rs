use core::fmt;

use bincode::{Decode, Encode};

/// A record identifier: the position of a row inside a table file.
///
/// This is the value type stored in the leaf pages of the B+ tree.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Encode, Decode)]
pub struct Rid {
    pub page_index: u32,
    pub slot: u32,
}

impl Rid {
    pub fn new(page_index: u32, slot: u32) -> Self {
        Self { page_index, slot }
    }
}

impl fmt::Display for Rid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "rid_{}_{}", self.page_index, self.slot)
    }
}

impl fmt::Debug for Rid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}
