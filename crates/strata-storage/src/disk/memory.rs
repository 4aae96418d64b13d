//! In-memory disk manager for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use strata_common::constants::PAGE_SIZE;
use strata_common::types::PageId;

use super::{DiskManager, DiskResult};

/// Disk manager that keeps pages in a map instead of a file.
///
/// Reads of pages that were never written (or were deallocated)
/// zero-fill, matching the file-backed behavior.
#[derive(Default)]
pub struct MemDiskManager {
    pages: Mutex<HashMap<PageId, Box<[u8]>>>,
    next_page_id: AtomicU32,
}

impl MemDiskManager {
    /// Creates an empty in-memory disk manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of pages currently stored.
    pub fn page_count(&self) -> usize {
        self.pages.lock().len()
    }
}

impl DiskManager for MemDiskManager {
    fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> DiskResult<()> {
        debug_assert_eq!(buf.len(), PAGE_SIZE);
        if !page_id.is_valid() {
            return Err(super::DiskError::InvalidPageId { page_id });
        }

        match self.pages.lock().get(&page_id) {
            Some(page) => buf.copy_from_slice(page),
            None => buf.fill(0),
        }
        Ok(())
    }

    fn write_page(&self, page_id: PageId, buf: &[u8]) -> DiskResult<()> {
        debug_assert_eq!(buf.len(), PAGE_SIZE);
        if !page_id.is_valid() {
            return Err(super::DiskError::InvalidPageId { page_id });
        }

        self.pages.lock().insert(page_id, buf.into());
        Ok(())
    }

    fn allocate_page(&self) -> PageId {
        PageId::new(self.next_page_id.fetch_add(1, Ordering::Relaxed))
    }

    fn deallocate_page(&self, page_id: PageId) {
        self.pages.lock().remove(&page_id);
    }
}

impl std::fmt::Debug for MemDiskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemDiskManager")
            .field("pages", &self.page_count())
            .finish()
    }
}
