//! Page handles: pinned-page guards with latched byte access.
//!
//! A [`PageHandle`] is the only way callers touch page bytes. It keeps
//! the frame pinned for its lifetime (so the page cannot be evicted
//! out from under the caller), hands out the frame latch in shared or
//! exclusive mode, and unpins with the accumulated dirty flag on drop.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use strata_common::types::PageId;

use super::frame::BufferFrame;
use super::pool::BufferPoolManager;

/// RAII guard over a pinned page.
///
/// Returned by `new_page`/`fetch_page`. Holding the handle holds the
/// pin; `data`/`data_mut` take the frame latch in the matching mode.
/// Dropping the handle unpins the page, reporting it dirty if any
/// mutable access (or an explicit [`mark_dirty`]) happened.
///
/// [`mark_dirty`]: PageHandle::mark_dirty
pub struct PageHandle<'a> {
    pool: &'a dyn BufferPoolManager,
    frame: Arc<BufferFrame>,
    page_id: PageId,
    dirty: bool,
}

impl<'a> PageHandle<'a> {
    pub(crate) fn new(
        pool: &'a dyn BufferPoolManager,
        frame: Arc<BufferFrame>,
        page_id: PageId,
    ) -> Self {
        Self {
            pool,
            frame,
            page_id,
            dirty: false,
        }
    }

    /// Returns the pinned page's identifier.
    #[inline]
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Takes the frame latch in shared mode and returns the page bytes.
    #[inline]
    pub fn data(&self) -> impl Deref<Target = [u8]> + '_ {
        PageDataRef {
            guard: self.frame.read_data(),
        }
    }

    /// Takes the frame latch in exclusive mode and returns the page
    /// bytes mutably. Marks the handle dirty.
    #[inline]
    pub fn data_mut(&mut self) -> impl DerefMut<Target = [u8]> + '_ {
        self.dirty = true;
        PageDataMut {
            guard: self.frame.write_data(),
        }
    }

    /// Marks the page dirty without touching the bytes.
    #[inline]
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Returns true if this handle will unpin the page as dirty.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

impl Drop for PageHandle<'_> {
    fn drop(&mut self) {
        self.pool.unpin_page(self.page_id, self.dirty);
    }
}

impl std::fmt::Debug for PageHandle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageHandle")
            .field("page_id", &self.page_id)
            .field("frame_id", &self.frame.frame_id())
            .field("dirty", &self.dirty)
            .finish()
    }
}

/// Helper struct to provide Deref for page data.
struct PageDataRef<'a> {
    guard: parking_lot::RwLockReadGuard<'a, Box<[u8]>>,
}

impl Deref for PageDataRef<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

/// Helper struct to provide DerefMut for page data.
struct PageDataMut<'a> {
    guard: parking_lot::RwLockWriteGuard<'a, Box<[u8]>>,
}

impl Deref for PageDataMut<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl DerefMut for PageDataMut<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}
