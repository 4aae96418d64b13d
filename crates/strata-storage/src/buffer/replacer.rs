//! LRU replacement policy for the buffer pool.
//!
//! The replacer tracks the set of *evictable* frames (resident and
//! unpinned) in strict recency order: the frame least recently handed
//! over via [`Replacer::unpin`] is the next eviction victim. It uses a
//! doubly-linked list for ordering and a frame-indexed side table for
//! lookups, giving O(1) for every operation.

use std::ptr::NonNull;

use parking_lot::Mutex;
use strata_common::types::FrameId;

/// Replacement policy contract.
///
/// All operations are thread-safe; none may suspend while holding the
/// replacer's internal lock.
pub trait Replacer: Send + Sync {
    /// Removes and returns the least recently unpinned frame, or
    /// `None` if no frame is evictable.
    fn victim(&self) -> Option<FrameId>;

    /// Removes the frame from the evictable set; no-op if absent.
    fn pin(&self, frame_id: FrameId);

    /// Inserts the frame as most recently used; no-op if present.
    fn unpin(&self, frame_id: FrameId);

    /// Returns the number of currently evictable frames.
    fn size(&self) -> usize;
}

/// A node in the recency list.
struct Node {
    frame_id: usize,
    prev: Option<NonNull<Node>>,
    next: Option<NonNull<Node>>,
}

/// Recency list plus the frame-indexed side table, guarded together by
/// the replacer's mutex.
struct LruList {
    /// Side table: frame index -> list node, sized to the pool.
    nodes: Vec<Option<NonNull<Node>>>,
    /// Head of the list (most recently unpinned).
    head: Option<NonNull<Node>>,
    /// Tail of the list (least recently unpinned).
    tail: Option<NonNull<Node>>,
    len: usize,
}

// Safety: the list owns its nodes exclusively and is only ever touched
// under the enclosing mutex.
unsafe impl Send for LruList {}

impl LruList {
    fn push_front(&mut self, node_ptr: NonNull<Node>) {
        unsafe {
            (*node_ptr.as_ptr()).prev = None;
            (*node_ptr.as_ptr()).next = self.head;

            if let Some(head) = self.head {
                (*head.as_ptr()).prev = Some(node_ptr);
            }

            self.head = Some(node_ptr);

            if self.tail.is_none() {
                self.tail = Some(node_ptr);
            }
        }
    }

    fn unlink(&mut self, node_ptr: NonNull<Node>) {
        unsafe {
            let prev = (*node_ptr.as_ptr()).prev;
            let next = (*node_ptr.as_ptr()).next;

            if let Some(prev) = prev {
                (*prev.as_ptr()).next = next;
            } else {
                self.head = next;
            }

            if let Some(next) = next {
                (*next.as_ptr()).prev = prev;
            } else {
                self.tail = prev;
            }
        }
    }
}

impl Drop for LruList {
    fn drop(&mut self) {
        let mut current = self.head;
        while let Some(node_ptr) = current {
            unsafe {
                current = (*node_ptr.as_ptr()).next;
                drop(Box::from_raw(node_ptr.as_ptr()));
            }
        }
    }
}

/// LRU replacer with O(1) victim/pin/unpin/size.
///
/// Frames enter at the head when unpinned and victims pop from the
/// tail, so ties on recency break by insertion order.
pub struct LruReplacer {
    inner: Mutex<LruList>,
}

impl LruReplacer {
    /// Creates a replacer able to track frames `0..pool_size`.
    pub fn new(pool_size: usize) -> Self {
        Self {
            inner: Mutex::new(LruList {
                nodes: vec![None; pool_size],
                head: None,
                tail: None,
                len: 0,
            }),
        }
    }
}

impl Replacer for LruReplacer {
    fn victim(&self) -> Option<FrameId> {
        let mut list = self.inner.lock();
        let tail = list.tail?;
        list.unlink(tail);
        // Safety: we just unlinked it, so we own the node.
        let node = unsafe { Box::from_raw(tail.as_ptr()) };
        list.nodes[node.frame_id] = None;
        list.len -= 1;
        Some(FrameId::new(node.frame_id))
    }

    fn pin(&self, frame_id: FrameId) {
        let mut list = self.inner.lock();
        if let Some(node_ptr) = list.nodes[frame_id.index()].take() {
            list.unlink(node_ptr);
            // Safety: removed from the side table above, so we own it.
            unsafe { drop(Box::from_raw(node_ptr.as_ptr())) };
            list.len -= 1;
        }
    }

    fn unpin(&self, frame_id: FrameId) {
        let mut list = self.inner.lock();
        let idx = frame_id.index();
        if list.nodes[idx].is_some() {
            return;
        }
        let node = Box::new(Node {
            frame_id: idx,
            prev: None,
            next: None,
        });
        let node_ptr = NonNull::from(Box::leak(node));
        list.push_front(node_ptr);
        list.nodes[idx] = Some(node_ptr);
        list.len += 1;
    }

    fn size(&self) -> usize {
        self.inner.lock().len
    }
}

impl std::fmt::Debug for LruReplacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LruReplacer")
            .field("size", &self.size())
            .finish()
    }
}
