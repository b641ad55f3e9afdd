use std::{
    collections::BTreeSet,
    fs::{File, OpenOptions},
    io::{prelude::*, Seek, SeekFrom},
    sync::{
        atomic::{AtomicU32, Ordering},
        Mutex, MutexGuard,
    },
};

use log::debug;

use crate::error::IndexError;

/// Page-granular I/O over a single index file.
///
/// Page indices start at 1; index 0 is reserved for the header page.
/// Freed indices are kept in an in-memory free list and handed out
/// again before the file is grown.
pub struct DiskManager {
    file_path: String,
    file: Mutex<File>,

    page_size: usize,

    /// the next page index to hand out when the free list is empty
    next_page_index: AtomicU32,
    free_pages: Mutex<BTreeSet<u32>>,
}

impl DiskManager {
    pub fn new(file_path: &str, page_size: usize) -> Result<Self, IndexError> {
        File::create(file_path)
            .map_err(|e| IndexError::new(&format!("create file: {}", e)))?;

        let file = OpenOptions::new()
            .write(true)
            .read(true)
            .open(file_path)
            .map_err(|e| IndexError::new(&format!("open file: {}", e)))?;

        Ok(Self {
            file_path: file_path.to_string(),
            file: Mutex::new(file),
            page_size,
            next_page_index: AtomicU32::new(1),
            free_pages: Mutex::new(BTreeSet::new()),
        })
    }

    pub fn get_file_path(&self) -> &str {
        &self.file_path
    }

    fn get_file(&self) -> MutexGuard<'_, File> {
        self.file.lock().unwrap()
    }

    /// Hand out an unused page index, reusing freed pages first.
    pub fn allocate_page(&self) -> u32 {
        if let Some(index) = {
            let mut free_pages = self.free_pages.lock().unwrap();
            let candidate = free_pages.iter().next().copied();
            candidate.map(|i| {
                free_pages.remove(&i);
                i
            })
        } {
            debug!("reuse freed page index {}", index);
            return index;
        }

        self.next_page_index.fetch_add(1, Ordering::Relaxed)
    }

    /// Return a page index to the free list for reuse.
    pub fn deallocate_page(&self, page_index: u32) {
        self.free_pages.lock().unwrap().insert(page_index);
    }

    pub fn read_page(&self, page_index: u32) -> Result<Vec<u8>, IndexError> {
        let start_pos = page_index as usize * self.page_size;
        let mut file = self.get_file();
        file.seek(SeekFrom::Start(start_pos as u64))
            .map_err(|e| IndexError::new(&format!("seek: {}", e)))?;

        let mut buf: Vec<u8> = vec![0; self.page_size];
        file.read_exact(&mut buf)
            .map_err(|e| IndexError::new(&format!("read page: {}", e)))?;
        Ok(buf)
    }

    /// Write a page image, padding it to the page size.
    pub fn write_page(
        &self,
        page_index: u32,
        data: &[u8],
    ) -> Result<(), IndexError> {
        if data.len() > self.page_size {
            return Err(IndexError::new(&format!(
                "page image of {} bytes exceeds the page size {}",
                data.len(),
                self.page_size
            )));
        }

        let mut buf: Vec<u8> = vec![0; self.page_size];
        buf[..data.len()].copy_from_slice(data);

        let start_pos = page_index as usize * self.page_size;
        let mut file = self.get_file();
        file.seek(SeekFrom::Start(start_pos as u64))
            .map_err(|e| IndexError::new(&format!("seek: {}", e)))?;
        file.write_all(&buf)
            .map_err(|e| IndexError::new(&format!("write page: {}", e)))?;
        file.flush()
            .map_err(|e| IndexError::new(&format!("flush: {}", e)))?;
        Ok(())
    }
}
