//! Hash directory page.
//!
//! The directory maps the low bits of a key's hash to a bucket page.
//! Layout, front to back:
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//!    0      4   global_depth (LE u32)
//!    4    512   local_depth per slot (u8 each)
//!  516   2048   bucket_page_id per slot (LE u32 each)
//! ```
//!
//! `2^global_depth` slots are live; global depth is capped at 9, so
//! the directory never outgrows its 512 slots.

use std::collections::HashMap;

use strata_common::constants::{DIRECTORY_ARRAY_SIZE, DIRECTORY_MAX_DEPTH, PAGE_SIZE};
use strata_common::types::PageId;

const GLOBAL_DEPTH_OFFSET: usize = 0;
const LOCAL_DEPTHS_OFFSET: usize = 4;
const BUCKET_IDS_OFFSET: usize = LOCAL_DEPTHS_OFFSET + DIRECTORY_ARRAY_SIZE;
const DIRECTORY_BYTES: usize = BUCKET_IDS_OFFSET + 4 * DIRECTORY_ARRAY_SIZE;

/// Read-only view of a directory page.
pub struct DirectoryPageRef<'a> {
    data: &'a [u8],
}

impl<'a> DirectoryPageRef<'a> {
    /// Wraps a page buffer.
    pub fn new(data: &'a [u8]) -> Self {
        debug_assert!(data.len() >= DIRECTORY_BYTES && DIRECTORY_BYTES <= PAGE_SIZE);
        Self { data }
    }

    /// Number of low hash bits the directory discriminates on.
    #[inline]
    pub fn global_depth(&self) -> u32 {
        u32::from_le_bytes(
            self.data[GLOBAL_DEPTH_OFFSET..GLOBAL_DEPTH_OFFSET + 4]
                .try_into()
                .unwrap(),
        )
    }

    /// Number of live directory slots (`2^global_depth`).
    #[inline]
    pub fn size(&self) -> usize {
        1 << self.global_depth()
    }

    /// Mask selecting the low `global_depth` bits of a hash.
    #[inline]
    pub fn global_depth_mask(&self) -> u32 {
        (1u32 << self.global_depth()) - 1
    }

    /// Directory slot a hash lands in.
    #[inline]
    pub fn bucket_index(&self, hash: u32) -> usize {
        (hash & self.global_depth_mask()) as usize
    }

    /// Number of low hash bits the bucket at `slot` discriminates on.
    #[inline]
    pub fn local_depth(&self, slot: usize) -> u32 {
        self.data[LOCAL_DEPTHS_OFFSET + slot] as u32
    }

    /// Mask selecting the low `local_depth(slot)` bits of a hash.
    #[inline]
    pub fn local_depth_mask(&self, slot: usize) -> u32 {
        (1u32 << self.local_depth(slot)) - 1
    }

    /// The bit distinguishing the bucket at `slot` from its buddy.
    #[inline]
    pub fn local_high_bit(&self, slot: usize) -> u32 {
        1u32 << self.local_depth(slot)
    }

    /// The bucket page the slot points at.
    #[inline]
    pub fn bucket_page_id(&self, slot: usize) -> PageId {
        let off = BUCKET_IDS_OFFSET + slot * 4;
        PageId::from_le_bytes(self.data[off..off + 4].try_into().unwrap())
    }

    /// Returns true iff every live slot sits strictly below the global
    /// depth, i.e. halving the directory would lose nothing.
    pub fn can_shrink(&self) -> bool {
        if self.global_depth() == 0 {
            return false;
        }
        (0..self.size()).all(|slot| self.local_depth(slot) < self.global_depth())
    }

    /// Asserts the directory invariants.
    ///
    /// - every slot's local depth is at most the global depth
    /// - every slot points at a valid page
    /// - all slots sharing a page agree on its local depth
    /// - a bucket at depth `d` is referenced by exactly
    ///   `2^(global_depth - d)` slots
    ///
    /// Violations abort: a corrupt directory has no defined recovery.
    pub fn verify_integrity(&self) {
        let global_depth = self.global_depth();
        assert!(
            global_depth <= DIRECTORY_MAX_DEPTH,
            "global depth {global_depth} above the directory cap"
        );

        let mut ref_counts: HashMap<PageId, u32> = HashMap::new();
        let mut depths: HashMap<PageId, u32> = HashMap::new();

        for slot in 0..self.size() {
            let local_depth = self.local_depth(slot);
            assert!(
                local_depth <= global_depth,
                "slot {slot}: local depth {local_depth} above global depth {global_depth}"
            );

            let page_id = self.bucket_page_id(slot);
            assert!(page_id.is_valid(), "slot {slot} points at no bucket");

            *ref_counts.entry(page_id).or_default() += 1;
            match depths.get(&page_id) {
                Some(&depth) => assert_eq!(
                    depth, local_depth,
                    "bucket {page_id} seen at depths {depth} and {local_depth}"
                ),
                None => {
                    depths.insert(page_id, local_depth);
                }
            }
        }

        for (page_id, count) in ref_counts {
            let expected = 1u32 << (global_depth - depths[&page_id]);
            assert_eq!(
                count, expected,
                "bucket {page_id} referenced by {count} slots, expected {expected}"
            );
        }
    }
}

/// Mutable view of a directory page.
pub struct DirectoryPageMut<'a> {
    data: &'a mut [u8],
}

impl<'a> DirectoryPageMut<'a> {
    /// Wraps a page buffer.
    pub fn new(data: &'a mut [u8]) -> Self {
        debug_assert!(data.len() >= DIRECTORY_BYTES);
        Self { data }
    }

    /// Reborrows as a read-only view.
    pub fn as_ref(&self) -> DirectoryPageRef<'_> {
        DirectoryPageRef::new(self.data)
    }

    /// Initializes a fresh directory: depth zero, every slot pointing
    /// nowhere. The single live slot must be wired to its first bucket
    /// by the caller.
    pub fn init(&mut self) {
        self.set_global_depth(0);
        for slot in 0..DIRECTORY_ARRAY_SIZE {
            self.set_local_depth(slot, 0);
            self.set_bucket_page_id(slot, PageId::INVALID);
        }
    }

    fn set_global_depth(&mut self, depth: u32) {
        debug_assert!(depth <= DIRECTORY_MAX_DEPTH);
        self.data[GLOBAL_DEPTH_OFFSET..GLOBAL_DEPTH_OFFSET + 4]
            .copy_from_slice(&depth.to_le_bytes());
    }

    /// Increments the global depth, doubling the live slot count.
    pub fn incr_global_depth(&mut self) {
        let depth = self.as_ref().global_depth();
        assert!(
            depth < DIRECTORY_MAX_DEPTH,
            "directory cannot grow past {DIRECTORY_ARRAY_SIZE} slots"
        );
        self.set_global_depth(depth + 1);
    }

    /// Decrements the global depth, halving the live slot count.
    pub fn decr_global_depth(&mut self) {
        let depth = self.as_ref().global_depth();
        debug_assert!(depth > 0);
        self.set_global_depth(depth - 1);
    }

    /// Sets the local depth of `slot`.
    pub fn set_local_depth(&mut self, slot: usize, depth: u32) {
        debug_assert!(depth <= DIRECTORY_MAX_DEPTH);
        self.data[LOCAL_DEPTHS_OFFSET + slot] = depth as u8;
    }

    /// Increments the local depth of `slot`.
    pub fn incr_local_depth(&mut self, slot: usize) {
        let depth = self.as_ref().local_depth(slot);
        self.set_local_depth(slot, depth + 1);
    }

    /// Decrements the local depth of `slot`.
    pub fn decr_local_depth(&mut self, slot: usize) {
        let depth = self.as_ref().local_depth(slot);
        debug_assert!(depth > 0);
        self.set_local_depth(slot, depth - 1);
    }

    /// Points `slot` at `page_id`.
    pub fn set_bucket_page_id(&mut self, slot: usize, page_id: PageId) {
        let off = BUCKET_IDS_OFFSET + slot * 4;
        self.data[off..off + 4].copy_from_slice(&page_id.to_le_bytes());
    }
}
