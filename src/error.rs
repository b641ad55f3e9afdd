use std::{error::Error, fmt};

use backtrace::Backtrace;

/// The single error kind of the index layer.
///
/// Structural failures (out of memory in the buffer pool, I/O errors
/// behind a fetch, corrupt page images) all surface as this type.
/// Duplicate keys on insert and missing keys on remove are not errors.
pub struct IndexError {
    details: String,
    backtrace: Backtrace,
}

impl IndexError {
    pub fn new(msg: &str) -> IndexError {
        IndexError {
            details: msg.to_string(),
            backtrace: Backtrace::new_unresolved(),
        }
    }

    pub fn get_backtrace(&self) -> &Backtrace {
        &self.backtrace
    }
}

impl fmt::Display for IndexError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.details)
    }
}

impl fmt::Debug for IndexError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.details)
    }
}

impl Error for IndexError {}
