//! File-backed disk manager.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use strata_common::constants::PAGE_SIZE;
use strata_common::types::PageId;

use super::{DiskManager, DiskResult};

/// Disk manager backed by a single database file.
///
/// Page `p` lives at byte offset `p * PAGE_SIZE`. Reads past the end
/// of the file zero-fill, so a freshly allocated page reads back as
/// zeroes before its first write.
pub struct FileDiskManager {
    /// The database file, serialized behind a mutex.
    file: Mutex<File>,
    /// Path to the database file.
    path: PathBuf,
    /// Next page identifier to hand out.
    next_page_id: AtomicU32,
}

impl FileDiskManager {
    /// Opens (creating if absent) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> DiskResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        // Hand out identifiers past any pages already in the file.
        let len = file.metadata()?.len();
        let next_page_id = len.div_ceil(PAGE_SIZE as u64) as u32;

        Ok(Self {
            file: Mutex::new(file),
            path,
            next_page_id: AtomicU32::new(next_page_id),
        })
    }

    /// Returns the path to the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn offset_of(page_id: PageId) -> u64 {
        page_id.as_u32() as u64 * PAGE_SIZE as u64
    }
}

impl DiskManager for FileDiskManager {
    fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> DiskResult<()> {
        debug_assert_eq!(buf.len(), PAGE_SIZE);
        if !page_id.is_valid() {
            return Err(super::DiskError::InvalidPageId { page_id });
        }

        let mut file = self.file.lock();
        let len = file.metadata()?.len();
        let offset = Self::offset_of(page_id);
        if offset >= len {
            buf.fill(0);
            return Ok(());
        }

        file.seek(SeekFrom::Start(offset))?;
        let mut filled = 0;
        while filled < buf.len() {
            let n = file.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        // Short read at the tail of the file: the rest of the page was
        // never written.
        buf[filled..].fill(0);
        Ok(())
    }

    fn write_page(&self, page_id: PageId, buf: &[u8]) -> DiskResult<()> {
        debug_assert_eq!(buf.len(), PAGE_SIZE);
        if !page_id.is_valid() {
            return Err(super::DiskError::InvalidPageId { page_id });
        }

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(Self::offset_of(page_id)))?;
        file.write_all(buf)?;
        file.sync_data()?;
        Ok(())
    }

    fn allocate_page(&self) -> PageId {
        PageId::new(self.next_page_id.fetch_add(1, Ordering::Relaxed))
    }

    fn deallocate_page(&self, page_id: PageId) {
        // Identifiers are not recycled; the slot simply goes cold.
        tracing::trace!(%page_id, "deallocated page");
    }
}

impl std::fmt::Debug for FileDiskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileDiskManager")
            .field("path", &self.path)
            .field("next_page_id", &self.next_page_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_then_read() {
        let dir = tempdir().unwrap();
        let disk = FileDiskManager::open(dir.path().join("test.db")).unwrap();

        let mut page = vec![0u8; PAGE_SIZE];
        page[0..4].copy_from_slice(&[1, 2, 3, 4]);
        disk.write_page(PageId::new(0), &page).unwrap();

        let mut out = vec![0xFFu8; PAGE_SIZE];
        disk.read_page(PageId::new(0), &mut out).unwrap();
        assert_eq!(out, page);
    }

    #[test]
    fn test_read_unwritten_page_is_zeroed() {
        let dir = tempdir().unwrap();
        let disk = FileDiskManager::open(dir.path().join("test.db")).unwrap();

        let mut out = vec![0xFFu8; PAGE_SIZE];
        disk.read_page(PageId::new(9), &mut out).unwrap();
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_sparse_offsets_do_not_collide() {
        let dir = tempdir().unwrap();
        let disk = FileDiskManager::open(dir.path().join("test.db")).unwrap();

        let a = vec![0xAAu8; PAGE_SIZE];
        let b = vec![0xBBu8; PAGE_SIZE];
        disk.write_page(PageId::new(3), &a).unwrap();
        disk.write_page(PageId::new(1), &b).unwrap();

        let mut out = vec![0u8; PAGE_SIZE];
        disk.read_page(PageId::new(3), &mut out).unwrap();
        assert_eq!(out, a);
        disk.read_page(PageId::new(1), &mut out).unwrap();
        assert_eq!(out, b);
        // Page 2 sits between the two writes and was never written.
        disk.read_page(PageId::new(2), &mut out).unwrap();
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_invalid_page_id_rejected() {
        let dir = tempdir().unwrap();
        let disk = FileDiskManager::open(dir.path().join("test.db")).unwrap();

        let mut buf = vec![0u8; PAGE_SIZE];
        assert!(disk.read_page(PageId::INVALID, &mut buf).is_err());
        assert!(disk.write_page(PageId::INVALID, &buf).is_err());
    }

    #[test]
    fn test_allocate_monotonic() {
        let dir = tempdir().unwrap();
        let disk = FileDiskManager::open(dir.path().join("test.db")).unwrap();

        let a = disk.allocate_page();
        let b = disk.allocate_page();
        assert_ne!(a, b);
        assert!(b.as_u32() > a.as_u32());
    }

    #[test]
    fn test_reopen_skips_existing_pages() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        {
            let disk = FileDiskManager::open(&path).unwrap();
            let page = vec![0xCCu8; PAGE_SIZE];
            disk.write_page(PageId::new(4), &page).unwrap();
        }

        let disk = FileDiskManager::open(&path).unwrap();
        assert!(disk.allocate_page().as_u32() >= 5);
    }
}
