use crate::{btree::page::BTreePageID, error::IndexError};

/// The contract every typed page fulfills towards the buffer pool:
/// identity, the parent link, and conversion to/from a fixed-size
/// page image.
pub trait BTreePage: Sized {
    fn get_pid(&self) -> BTreePageID;

    /// None for the root.
    fn get_parent_pid(&self) -> Option<BTreePageID>;

    fn set_parent_pid(&mut self, pid: &BTreePageID);

    fn clear_parent_pid(&mut self);

    fn is_root(&self) -> bool {
        self.get_parent_pid().is_none()
    }

    fn from_image(pid: &BTreePageID, bytes: &[u8]) -> Result<Self, IndexError>;

    fn to_image(&self) -> Result<Vec<u8>, IndexError>;
}
