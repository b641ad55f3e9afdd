use std::fmt;

use bincode::{Decode, Encode};

/// The page index of pages that do not exist (an unset parent, the
/// end of the leaf chain, an empty tree).
pub const EMPTY_PAGE_INDEX: u32 = 0;

/// The page index of the process-global header page.
pub const HEADER_PAGE_INDEX: u32 = 0;

#[derive(PartialEq, Copy, Clone, Eq, Hash, Debug, Encode, Decode)]
pub enum PageCategory {
    Header,
    Internal,
    Leaf,
}

// PageID identifies a unique page, and contains the
// necessary metadata
#[derive(Copy, Clone, PartialEq, Eq, Hash, Encode, Decode)]
pub struct BTreePageID {
    /// category indicates the category of the page
    pub category: PageCategory,

    /// page_index represents the position of the page in
    /// the file, start from 0 (the header page)
    pub page_index: u32,
}

impl fmt::Display for BTreePageID {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}_{}", self.category, self.page_index)
    }
}

impl fmt::Debug for BTreePageID {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl BTreePageID {
    pub fn new(category: PageCategory, page_index: u32) -> Self {
        Self {
            category,
            page_index,
        }
    }

    pub fn header() -> Self {
        Self {
            category: PageCategory::Header,
            page_index: HEADER_PAGE_INDEX,
        }
    }

    pub fn get_short_repr(&self) -> String {
        format!("{:?}_{}", self.category, self.page_index)
    }
}
