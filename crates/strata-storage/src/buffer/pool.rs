//! Buffer pool instance.
//!
//! A [`BufferPool`] owns a fixed array of frames, a free list, a page
//! table, and an LRU replacer, and serves pages from a disk manager.
//! Several instances compose into a [`ParallelBufferPool`] by striping
//! page identifiers.
//!
//! [`ParallelBufferPool`]: super::ParallelBufferPool

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use strata_common::types::{FrameId, PageId};

use super::config::BufferPoolConfig;
use super::error::{BufferError, BufferResult};
use super::frame::BufferFrame;
use super::latch::PageHandle;
use super::replacer::{LruReplacer, Replacer};
use super::BufferPoolStats;
use crate::disk::DiskManager;

/// Log-manager hook.
///
/// When configured, the pool calls [`force`] before writing a dirty
/// page back to disk, so redo information reaches durable storage
/// ahead of the data it describes.
///
/// [`force`]: LogForce::force
pub trait LogForce: Send + Sync {
    /// Blocks until the log is durable up to the current horizon.
    fn force(&self);
}

/// The public buffer pool contract consumed by everything above the
/// storage layer.
///
/// All operations are thread-safe. Expected failures (pool exhausted,
/// page not resident, pinned on delete) are reported through the
/// `Option`/`bool` returns.
pub trait BufferPoolManager: Send + Sync {
    /// Allocates a fresh page identifier and pins a zeroed frame for
    /// it. `None` iff every frame is pinned.
    fn new_page(&self) -> Option<PageHandle<'_>>;

    /// Pins the frame holding `page_id`, reading it from disk on a
    /// miss. `None` iff a miss requires eviction and every frame is
    /// pinned.
    fn fetch_page(&self, page_id: PageId) -> Option<PageHandle<'_>>;

    /// Decrements the pin count, ORing in the caller's dirty flag; a
    /// frame reaching pin count zero becomes evictable. `false` if
    /// `page_id` is not resident or its pin count was already zero.
    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool;

    /// Writes the page back if it is resident and dirty, clearing the
    /// dirty flag. Succeeds regardless of pin count; `false` if the
    /// page is not resident.
    fn flush_page(&self, page_id: PageId) -> bool;

    /// Flushes every resident dirty page. No point-in-time snapshot
    /// guarantee across pages.
    fn flush_all(&self);

    /// Drops the page from the pool and releases its identifier.
    /// `true` if the page was not resident or was dropped; `false` if
    /// it is still pinned.
    fn delete_page(&self, page_id: PageId) -> bool;
}

/// Bookkeeping guarded by the pool latch.
///
/// The latch covers exactly this struct (plus replacer handoffs) and
/// is released before any disk I/O.
struct PoolState {
    /// Maps each resident page to its frame.
    page_table: HashMap<PageId, FrameId>,
    /// Frames holding no page at all.
    free_list: VecDeque<FrameId>,
    /// Next page identifier on this instance's stripe.
    next_page_id: u32,
}

/// A single buffer pool instance.
pub struct BufferPool {
    config: BufferPoolConfig,
    frames: Vec<Arc<BufferFrame>>,
    state: Mutex<PoolState>,
    replacer: LruReplacer,
    disk: Arc<dyn DiskManager>,
    log: Option<Arc<dyn LogForce>>,
    fetches: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    flushes: AtomicU64,
}

impl BufferPool {
    /// Creates a buffer pool instance over the given disk manager.
    pub fn new(config: BufferPoolConfig, disk: Arc<dyn DiskManager>) -> BufferResult<Self> {
        config.validate().map_err(BufferError::config)?;

        let frames: Vec<Arc<BufferFrame>> = (0..config.pool_size)
            .map(|i| Arc::new(BufferFrame::new(FrameId::new(i))))
            .collect();

        let state = PoolState {
            page_table: HashMap::with_capacity(config.pool_size),
            free_list: (0..config.pool_size).map(FrameId::new).collect(),
            next_page_id: config.instance_index as u32,
        };

        Ok(Self {
            replacer: LruReplacer::new(config.pool_size),
            config,
            frames,
            state: Mutex::new(state),
            disk,
            log: None,
            fetches: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
        })
    }

    /// Configures the log-force hook consulted before dirty
    /// write-backs.
    pub fn with_log_force(mut self, log: Arc<dyn LogForce>) -> Self {
        self.log = Some(log);
        self
    }

    /// Returns the number of frames in this instance.
    pub fn pool_size(&self) -> usize {
        self.config.pool_size
    }

    /// Returns true if `page_id` is currently resident.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.state.lock().page_table.contains_key(&page_id)
    }

    /// Returns a snapshot of this instance's counters.
    pub fn stats(&self) -> BufferPoolStats {
        BufferPoolStats {
            fetches: self.fetches.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
        }
    }

    // -------------------------------------------------------------------------
    // Private helpers
    // -------------------------------------------------------------------------

    /// Every identifier this instance touches must sit on its stripe.
    fn check_ownership(&self, page_id: PageId) {
        assert!(page_id.is_valid(), "operation on the invalid page id");
        assert_eq!(
            page_id.stripe(self.config.num_instances),
            self.config.instance_index,
            "page {page_id} does not belong to instance {}",
            self.config.instance_index,
        );
    }

    /// Hands out the next identifier on this instance's stripe.
    fn allocate_page_id(&self, state: &mut PoolState) -> PageId {
        let page_id = PageId::new(state.next_page_id);
        state.next_page_id += self.config.num_instances as u32;
        self.check_ownership(page_id);
        page_id
    }

    /// Finds a frame to reuse: the free list first, then the LRU
    /// victim, writing the victim back if dirty. Returns with the pool
    /// latch held and the chosen frame detached from the page table;
    /// `None` iff no frame can be freed.
    fn reserve_frame(&self) -> Option<(MutexGuard<'_, PoolState>, FrameId)> {
        'search: loop {
            let mut state = self.state.lock();
            if let Some(frame_id) = state.free_list.pop_front() {
                return Some((state, frame_id));
            }

            let Some(frame_id) = self.replacer.victim() else {
                tracing::warn!(
                    instance = self.config.instance_index,
                    "buffer pool exhausted: every frame is pinned"
                );
                return None;
            };
            let frame = &self.frames[frame_id.index()];
            let old_page_id = frame.page_id();

            if !frame.is_dirty() {
                state.page_table.remove(&old_page_id);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(page_id = %old_page_id, frame = %frame_id, "evicted clean page");
                return Some((state, frame_id));
            }

            // Dirty victim. The write-back happens without the pool
            // latch, with the page still resident and pinned by us so
            // concurrent fetchers of it stay coherent; afterwards the
            // claim only goes through if nobody re-pinned or
            // re-dirtied the frame in the meantime.
            frame.pin();
            drop(state);
            loop {
                let flushed = self.flush_frame(old_page_id, frame);
                let mut state = self.state.lock();
                if frame.pin_count() > 1 {
                    frame.unpin();
                    continue 'search;
                }
                if !flushed {
                    // Write-back failed; the frame stays resident and
                    // evictable rather than spinning on a bad device.
                    frame.unpin();
                    self.replacer.unpin(frame_id);
                    return None;
                }
                if frame.is_dirty() {
                    continue;
                }
                frame.unpin();
                state.page_table.remove(&old_page_id);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(page_id = %old_page_id, frame = %frame_id, "evicted dirty page");
                return Some((state, frame_id));
            }
        }
    }

    /// Publishes `frame_id` as the home of `page_id`, pins it, and
    /// fills the bytes (zeroing a new page or reading a fetched one)
    /// under the frame latch. The frame latch is taken before the pool
    /// latch is released, so a concurrent fetcher that hits the new
    /// mapping blocks on the latch until the bytes are ready.
    fn install_frame(
        &self,
        mut state: MutexGuard<'_, PoolState>,
        frame_id: FrameId,
        page_id: PageId,
        load: bool,
    ) -> Arc<BufferFrame> {
        let frame = Arc::clone(&self.frames[frame_id.index()]);
        state.page_table.insert(page_id, frame_id);
        frame.set_page_id(page_id);
        frame.pin();
        self.replacer.pin(frame_id);

        let mut data = frame.write_data();
        drop(state);

        if load {
            if let Err(e) = self.disk.read_page(page_id, &mut data) {
                tracing::error!(%page_id, error = %e, "failed to read page from disk");
                data.fill(0);
            }
        } else {
            data.fill(0);
        }
        frame.set_dirty(false);
        drop(data);
        frame
    }

    /// Writes `page_id`'s bytes back if the frame still holds that
    /// page and it is dirty. Takes the frame latch shared; the dirty
    /// flag is cleared under the latch so a concurrent writer cannot
    /// be lost.
    fn flush_frame(&self, page_id: PageId, frame: &BufferFrame) -> bool {
        let data = frame.read_data();
        if frame.page_id() != page_id {
            // Evicted while we were unlatched; the eviction wrote the
            // bytes back already.
            return true;
        }
        if !frame.is_dirty() {
            return true;
        }
        if let Some(log) = &self.log {
            log.force();
        }
        if let Err(e) = self.disk.write_page(page_id, &data) {
            tracing::error!(%page_id, error = %e, "failed to write page back to disk");
            return false;
        }
        frame.set_dirty(false);
        self.flushes.fetch_add(1, Ordering::Relaxed);
        true
    }
}

impl BufferPoolManager for BufferPool {
    fn new_page(&self) -> Option<PageHandle<'_>> {
        let (mut state, frame_id) = self.reserve_frame()?;
        let page_id = self.allocate_page_id(&mut state);
        let frame = self.install_frame(state, frame_id, page_id, false);
        tracing::debug!(%page_id, frame = %frame_id, "allocated new page");
        Some(PageHandle::new(self, frame, page_id))
    }

    fn fetch_page(&self, page_id: PageId) -> Option<PageHandle<'_>> {
        self.check_ownership(page_id);
        self.fetches.fetch_add(1, Ordering::Relaxed);

        {
            let state = self.state.lock();
            if let Some(&frame_id) = state.page_table.get(&page_id) {
                let frame = Arc::clone(&self.frames[frame_id.index()]);
                frame.pin();
                self.replacer.pin(frame_id);
                drop(state);
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(PageHandle::new(self, frame, page_id));
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let (mut state, frame_id) = self.reserve_frame()?;
        if let Some(&resident) = state.page_table.get(&page_id) {
            // Another thread brought the page in while we were
            // reserving; keep its frame and return ours to the free
            // list.
            let frame = Arc::clone(&self.frames[resident.index()]);
            frame.pin();
            self.replacer.pin(resident);
            self.frames[frame_id.index()].reset();
            state.free_list.push_back(frame_id);
            drop(state);
            return Some(PageHandle::new(self, frame, page_id));
        }
        let frame = self.install_frame(state, frame_id, page_id, true);
        Some(PageHandle::new(self, frame, page_id))
    }

    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let state = self.state.lock();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return false;
        };
        let frame = &self.frames[frame_id.index()];
        if is_dirty {
            frame.set_dirty(true);
        }
        if frame.pin_count() == 0 {
            return false;
        }
        if frame.unpin() == 0 {
            self.replacer.unpin(frame_id);
        }
        true
    }

    fn flush_page(&self, page_id: PageId) -> bool {
        self.check_ownership(page_id);
        let frame = {
            let state = self.state.lock();
            match state.page_table.get(&page_id) {
                Some(&frame_id) => Arc::clone(&self.frames[frame_id.index()]),
                None => return false,
            }
        };
        self.flush_frame(page_id, &frame)
    }

    fn flush_all(&self) {
        for frame in &self.frames {
            let page_id = frame.page_id();
            if page_id.is_valid() && frame.is_dirty() {
                self.flush_frame(page_id, frame);
            }
        }
    }

    fn delete_page(&self, page_id: PageId) -> bool {
        self.check_ownership(page_id);
        let mut state = self.state.lock();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return true;
        };
        let frame = &self.frames[frame_id.index()];
        if frame.is_pinned() {
            return false;
        }
        state.page_table.remove(&page_id);
        self.replacer.pin(frame_id);
        frame.reset();
        state.free_list.push_back(frame_id);
        drop(state);

        self.disk.deallocate_page(page_id);
        tracing::debug!(%page_id, "deleted page");
        true
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("pool_size", &self.config.pool_size)
            .field("instance_index", &self.config.instance_index)
            .field("pages_cached", &self.state.lock().page_table.len())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::MemDiskManager;
    use std::sync::atomic::AtomicUsize;

    fn create_pool(pool_size: usize) -> BufferPool {
        BufferPool::new(
            BufferPoolConfig::new(pool_size),
            Arc::new(MemDiskManager::new()),
        )
        .unwrap()
    }

    /// Checks the frame-state invariant: every resident page maps to a
    /// frame that agrees on the id, and each frame is in exactly one
    /// of {pinned, evictable, free}.
    fn assert_consistent(pool: &BufferPool) {
        let state = pool.state.lock();
        let mut unpinned_resident = 0;
        for (&page_id, &frame_id) in &state.page_table {
            let frame = &pool.frames[frame_id.index()];
            assert_eq!(frame.page_id(), page_id);
            if !frame.is_pinned() {
                unpinned_resident += 1;
            }
        }
        assert_eq!(unpinned_resident, pool.replacer.size());
        for &frame_id in &state.free_list {
            let frame = &pool.frames[frame_id.index()];
            assert!(frame.is_empty());
            assert!(!frame.is_pinned());
        }
        assert_eq!(
            state.page_table.len() + state.free_list.len(),
            pool.frames.len()
        );
    }

    #[test]
    fn test_new_page_basics() {
        let pool = create_pool(4);
        let handle = pool.new_page().unwrap();
        assert_eq!(handle.page_id(), PageId::new(0));
        assert!(handle.data().iter().all(|&b| b == 0));
        drop(handle);
        assert_consistent(&pool);
    }

    #[test]
    fn test_new_page_striped_ids() {
        let disk: Arc<dyn DiskManager> = Arc::new(MemDiskManager::new());
        let pool = BufferPool::new(
            BufferPoolConfig::new(4).with_stripe(4, 1),
            Arc::clone(&disk),
        )
        .unwrap();

        let a = pool.new_page().unwrap().page_id();
        let b = pool.new_page().unwrap().page_id();
        let c = pool.new_page().unwrap().page_id();
        assert_eq!(a, PageId::new(1));
        assert_eq!(b, PageId::new(5));
        assert_eq!(c, PageId::new(9));
    }

    #[test]
    fn test_pool_exhausted() {
        let pool = create_pool(3);
        let _h1 = pool.new_page().unwrap();
        let _h2 = pool.new_page().unwrap();
        let h3 = pool.new_page().unwrap();

        assert!(pool.new_page().is_none());
        assert!(pool.fetch_page(PageId::new(99)).is_none());

        drop(h3);
        assert!(pool.new_page().is_some());
    }

    #[test]
    fn test_eviction_prefers_least_recently_unpinned() {
        let pool = create_pool(3);
        let h1 = pool.new_page().unwrap();
        let p1 = h1.page_id();
        let _h2 = pool.new_page().unwrap();
        let _h3 = pool.new_page().unwrap();

        drop(h1);
        let h4 = pool.new_page().unwrap();
        assert!(!pool.contains(p1));
        assert!(pool.contains(h4.page_id()));
        assert_eq!(pool.stats().evictions, 1);
    }

    #[test]
    fn test_free_list_priority_over_eviction() {
        let pool = create_pool(3);
        let h1 = pool.new_page().unwrap();
        let p1 = h1.page_id();
        let h2 = pool.new_page().unwrap();
        let p2 = h2.page_id();
        let h3 = pool.new_page().unwrap();
        let p3 = h3.page_id();

        // Two evictable frames plus one free frame.
        drop(h1);
        drop(h2);
        drop(h3);
        assert!(pool.delete_page(p3));

        let _h4 = pool.new_page().unwrap();
        assert_eq!(pool.stats().evictions, 0);
        assert!(pool.contains(p1));
        assert!(pool.contains(p2));
        assert_consistent(&pool);
    }

    #[test]
    fn test_flush_on_evict_round_trip() {
        let pool = create_pool(3);
        let mut h1 = pool.new_page().unwrap();
        let p1 = h1.page_id();
        h1.data_mut().fill(0xAB);
        drop(h1);

        let _h2 = pool.new_page().unwrap();
        let _h3 = pool.new_page().unwrap();
        // Evicts p1's frame, which must write the bytes back first.
        let h4 = pool.new_page().unwrap();
        assert!(!pool.contains(p1));
        drop(h4);

        let h = pool.fetch_page(p1).unwrap();
        assert!(h.data().iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn test_fetch_hit_does_not_touch_disk() {
        let pool = create_pool(4);
        let h = pool.new_page().unwrap();
        let p = h.page_id();
        drop(h);

        let _a = pool.fetch_page(p).unwrap();
        let _b = pool.fetch_page(p).unwrap();
        let stats = pool.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn test_unpin_edge_cases() {
        let pool = create_pool(4);
        assert!(!pool.unpin_page(PageId::new(7), false));

        let h = pool.new_page().unwrap();
        let p = h.page_id();
        drop(h);
        // Pin count is already zero.
        assert!(!pool.unpin_page(p, false));
        assert_consistent(&pool);
    }

    #[test]
    fn test_unpin_dirty_flag_is_sticky() {
        let disk = Arc::new(MemDiskManager::new());
        let pool = BufferPool::new(BufferPoolConfig::new(4), disk.clone()).unwrap();
        let h = pool.new_page().unwrap();
        let p = h.page_id();
        drop(h);

        let mut h = pool.fetch_page(p).unwrap();
        h.data_mut()[0] = 0x5A;
        drop(h); // unpins dirty

        let h = pool.fetch_page(p).unwrap();
        drop(h); // unpins clean; the dirty flag must survive the OR

        assert!(pool.flush_page(p));
        let mut buf = vec![0u8; strata_common::constants::PAGE_SIZE];
        disk.read_page(p, &mut buf).unwrap();
        assert_eq!(buf[0], 0x5A);
    }

    #[test]
    fn test_flush_page() {
        let disk = Arc::new(MemDiskManager::new());
        let pool = BufferPool::new(BufferPoolConfig::new(4), disk.clone()).unwrap();

        assert!(!pool.flush_page(PageId::new(0)));

        let mut h = pool.new_page().unwrap();
        let p = h.page_id();
        h.data_mut().fill(0xCD);
        // Flushing succeeds regardless of pin count.
        assert!(pool.flush_page(p));
        drop(h);

        let mut buf = vec![0u8; strata_common::constants::PAGE_SIZE];
        disk.read_page(p, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0xCD));
        assert_eq!(pool.stats().flushes, 1);

        // Clean page: flush_page succeeds without another write.
        assert!(pool.flush_page(p));
        assert_eq!(pool.stats().flushes, 1);
    }

    #[test]
    fn test_flush_all() {
        let disk = Arc::new(MemDiskManager::new());
        let pool = BufferPool::new(BufferPoolConfig::new(4), disk.clone()).unwrap();

        for i in 0..3u8 {
            let mut h = pool.new_page().unwrap();
            h.data_mut().fill(i + 1);
        }
        pool.flush_all();
        assert_eq!(pool.stats().flushes, 3);
        assert_eq!(disk.page_count(), 3);
    }

    #[test]
    fn test_delete_pinned_page() {
        let pool = create_pool(4);
        let h = pool.new_page().unwrap();
        let p = h.page_id();

        assert!(!pool.delete_page(p));
        drop(h);
        assert!(pool.delete_page(p));
        assert!(!pool.contains(p));
        // Deleting a page that is not resident succeeds.
        assert!(pool.delete_page(p));
        assert_consistent(&pool);
    }

    #[test]
    fn test_deleted_page_contents_not_resurrected() {
        let pool = create_pool(4);
        let mut h = pool.new_page().unwrap();
        let p = h.page_id();
        h.data_mut().fill(0xEE);
        drop(h);
        assert!(pool.delete_page(p));

        // The id was deallocated; a re-fetch must not surface the old
        // contents.
        let h = pool.fetch_page(p).unwrap();
        assert!(h.data().iter().all(|&b| b != 0xEE));
    }

    #[test]
    fn test_log_force_runs_before_dirty_writeback() {
        struct CountingLog(AtomicUsize);
        impl LogForce for CountingLog {
            fn force(&self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let log = Arc::new(CountingLog(AtomicUsize::new(0)));
        let pool = BufferPool::new(
            BufferPoolConfig::new(4),
            Arc::new(MemDiskManager::new()),
        )
        .unwrap()
        .with_log_force(log.clone());

        let mut h = pool.new_page().unwrap();
        let p = h.page_id();
        h.data_mut()[0] = 1;
        drop(h);

        assert!(pool.flush_page(p));
        assert_eq!(log.0.load(Ordering::SeqCst), 1);

        // Clean flush does not force the log again.
        assert!(pool.flush_page(p));
        assert_eq!(log.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_page_table_consistency_after_mixed_ops() {
        let pool = create_pool(4);
        let mut ids = Vec::new();
        for _ in 0..4 {
            let h = pool.new_page().unwrap();
            ids.push(h.page_id());
        }
        assert_consistent(&pool);

        // Cycle more pages through than the pool holds.
        for _ in 0..8 {
            let h = pool.new_page().unwrap();
            ids.push(h.page_id());
        }
        assert_consistent(&pool);

        for &id in &ids {
            if pool.contains(id) {
                let _h = pool.fetch_page(id).unwrap();
            }
        }
        assert_consistent(&pool);
    }

    #[test]
    #[should_panic(expected = "does not belong to instance")]
    fn test_fetch_off_stripe_page_panics() {
        let pool = BufferPool::new(
            BufferPoolConfig::new(2).with_stripe(4, 1),
            Arc::new(MemDiskManager::new()),
        )
        .unwrap();
        let _ = pool.fetch_page(PageId::new(2));
    }
}
