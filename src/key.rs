use std::fmt::Debug;

use bincode::{Decode, Encode};

/// An index key: totally ordered, fixed serialized width.
///
/// The width feeds the page capacity formulas, so the encoded form of
/// every key of a given type must occupy exactly `LEN` bytes (the page
/// codec uses fixed-length integer encoding).
pub trait IndexKey:
    Ord + Clone + Debug + Default + Encode + Decode + Send + Sync + 'static
{
    /// Serialized width in bytes.
    const LEN: usize;
}

impl IndexKey for i32 {
    const LEN: usize = 4;
}

impl IndexKey for i64 {
    const LEN: usize = 8;
}

impl IndexKey for u32 {
    const LEN: usize = 4;
}

impl IndexKey for u64 {
    const LEN: usize = 8;
}
