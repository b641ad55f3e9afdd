pub mod btree;
pub mod buffer;
pub mod error;
pub mod hash;
pub mod key;
pub mod latch;
pub mod rid;
pub mod storage;
pub mod transaction;
pub mod types;
pub mod utils;

mod log;

pub use btree::{BTreeIndex, BTreeIndexIterator};
pub use buffer::BufferPool;
pub use error::IndexError;
pub use hash::ExtendibleHashTable;
pub use rid::Rid;
pub use transaction::Transaction;
