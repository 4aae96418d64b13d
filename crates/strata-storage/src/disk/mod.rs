//! Disk managers: blocking page I/O against a backing store.
//!
//! A [`DiskManager`] reads and writes fixed-size pages addressed by
//! [`PageId`] and hands out fresh page identifiers. Two
//! implementations are provided:
//!
//! - [`FileDiskManager`] — pages stored in a single database file at
//!   `page_id * PAGE_SIZE` offsets
//! - [`MemDiskManager`] — pages held in a map, for tests

use std::io;

use strata_common::types::PageId;
use thiserror::Error;

mod file;
mod memory;

pub use file::FileDiskManager;
pub use memory::MemDiskManager;

/// Result type for disk operations.
pub type DiskResult<T> = Result<T, DiskError>;

/// Errors that can occur during disk operations.
#[derive(Debug, Error)]
pub enum DiskError {
    /// Operation addressed the invalid page sentinel.
    #[error("invalid page ID: {page_id}")]
    InvalidPageId {
        /// The offending identifier.
        page_id: PageId,
    },

    /// I/O error during page read/write.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying error.
        #[from]
        source: io::Error,
    },
}

/// Blocking block-device abstraction over fixed-size pages.
///
/// Implementations serialize their own `read_page`/`write_page` calls
/// against themselves on the same identifier; callers provide all
/// higher-level coordination.
pub trait DiskManager: Send + Sync {
    /// Reads the page into `buf` (exactly [`PAGE_SIZE`] bytes).
    ///
    /// A page that has never been written reads back as zeroes.
    ///
    /// [`PAGE_SIZE`]: strata_common::constants::PAGE_SIZE
    fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> DiskResult<()>;

    /// Writes the page from `buf`; durable on return.
    fn write_page(&self, page_id: PageId, buf: &[u8]) -> DiskResult<()>;

    /// Allocates a fresh page identifier on the backing store.
    fn allocate_page(&self) -> PageId;

    /// Releases a page identifier.
    ///
    /// Reclamation strategy is the backing store's business; the
    /// identifier must simply never be handed out to this caller
    /// again.
    fn deallocate_page(&self, page_id: PageId);
}
