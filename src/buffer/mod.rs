use std::sync::atomic::{AtomicUsize, Ordering};

mod buffer_pool;
mod lru_replacer;

pub use buffer_pool::*;
pub use lru_replacer::*;

pub const DEFAULT_PAGE_SIZE: usize = 4096;

static PAGE_SIZE: AtomicUsize = AtomicUsize::new(DEFAULT_PAGE_SIZE);

/// Change the process-global page size. Only meaningful before any
/// pool or page exists; tests shrink it to force small fan-out.
pub fn set_page_size(page_size: usize) {
    PAGE_SIZE.store(page_size, Ordering::Relaxed);
}

pub fn get_page_size() -> usize {
    PAGE_SIZE.load(Ordering::Relaxed)
}
