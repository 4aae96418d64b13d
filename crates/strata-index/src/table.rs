//! Disk-backed extendible hash table.

use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::RwLock;
use strata_common::constants::DIRECTORY_ARRAY_SIZE;
use strata_common::types::PageId;
use strata_storage::buffer::BufferPoolManager;

use crate::bucket::{BucketPageMut, BucketPageRef};
use crate::codec::Storable;
use crate::directory::{DirectoryPageMut, DirectoryPageRef};
use crate::error::{IndexError, IndexResult};
use crate::hashing::KeyHasher;

/// A dynamic hash index whose directory and buckets are buffer-pool
/// pages.
///
/// Concurrency follows the standard two-level protocol: one
/// table-level reader/writer latch protects the directory's shape
/// (global depth and slot-to-bucket map); point operations take it
/// shared and latch the target bucket's frame in the matching mode,
/// while splits and merges take it exclusively. The fixed latch order
/// is table latch, then pool latch, then frame latch.
pub struct DiskExtendibleHashTable<K, V, H> {
    directory_page_id: PageId,
    pool: Arc<dyn BufferPoolManager>,
    table_latch: RwLock<()>,
    hasher: H,
    _marker: PhantomData<(K, V)>,
}

impl<K, V, H> DiskExtendibleHashTable<K, V, H>
where
    K: Storable,
    V: Storable,
    H: KeyHasher<K>,
{
    /// Creates an empty table: a depth-zero directory pointing at one
    /// empty bucket.
    pub fn new(pool: Arc<dyn BufferPoolManager>, hasher: H) -> IndexResult<Self> {
        let directory_page_id = {
            let mut directory = pool.new_page().ok_or(IndexError::PoolExhausted)?;
            let mut bucket = pool.new_page().ok_or(IndexError::PoolExhausted)?;
            let bucket_page_id = bucket.page_id();
            {
                let mut data = directory.data_mut();
                let mut dir = DirectoryPageMut::new(&mut data);
                dir.init();
                dir.set_bucket_page_id(0, bucket_page_id);
            }
            // A zeroed page is already a valid empty bucket; mark it so
            // the zeroes reach disk.
            bucket.mark_dirty();
            directory.page_id()
        };

        Ok(Self {
            directory_page_id,
            pool,
            table_latch: RwLock::new(()),
            hasher,
            _marker: PhantomData,
        })
    }

    /// Returns every value stored under `key`.
    pub fn get(&self, key: &K) -> Vec<V> {
        let _table = self.table_latch.read();
        let directory = self.fetch_directory();
        let bucket_page_id = {
            let data = directory.data();
            let dir = DirectoryPageRef::new(&data);
            dir.bucket_page_id(dir.bucket_index(self.hasher.hash32(key)))
        };
        let bucket = self.fetch_bucket(bucket_page_id);
        let data = bucket.data();
        BucketPageRef::<K, V>::new(&data).get(key)
    }

    /// Inserts `(key, value)`.
    ///
    /// Returns false on an exact duplicate, or when the index cannot
    /// grow any further (the directory is at its
    /// [`DIRECTORY_ARRAY_SIZE`]-slot cap and the target bucket is
    /// still full).
    pub fn insert(&self, key: &K, value: &V) -> bool {
        let (inserted, needs_split) = {
            let _table = self.table_latch.read();
            let directory = self.fetch_directory();
            let bucket_page_id = {
                let data = directory.data();
                let dir = DirectoryPageRef::new(&data);
                dir.bucket_page_id(dir.bucket_index(self.hasher.hash32(key)))
            };
            let mut bucket = self.fetch_bucket(bucket_page_id);
            let mut data = bucket.data_mut();
            let mut view = BucketPageMut::<K, V>::new(&mut data);
            let inserted = view.insert(key, value);
            let needs_split = !inserted && view.as_ref().is_full();
            (inserted, needs_split)
        };

        if needs_split {
            self.split_insert(key, value)
        } else {
            inserted
        }
    }

    /// Removes the entry equal to `(key, value)`; returns whether a
    /// removal occurred. An emptied bucket is merged with its buddy.
    pub fn remove(&self, key: &K, value: &V) -> bool {
        let (removed, emptied) = {
            let _table = self.table_latch.read();
            let directory = self.fetch_directory();
            let bucket_page_id = {
                let data = directory.data();
                let dir = DirectoryPageRef::new(&data);
                dir.bucket_page_id(dir.bucket_index(self.hasher.hash32(key)))
            };
            let mut bucket = self.fetch_bucket(bucket_page_id);
            let mut data = bucket.data_mut();
            let mut view = BucketPageMut::<K, V>::new(&mut data);
            let removed = view.remove(key, value);
            (removed, removed && view.as_ref().is_empty())
        };

        if emptied {
            self.merge(key);
        }
        removed
    }

    /// Returns the directory's current global depth.
    pub fn global_depth(&self) -> u32 {
        let _table = self.table_latch.read();
        let directory = self.fetch_directory();
        let data = directory.data();
        DirectoryPageRef::new(&data).global_depth()
    }

    /// Asserts the directory invariants; see
    /// [`DirectoryPageRef::verify_integrity`].
    pub fn verify_integrity(&self) {
        let _table = self.table_latch.read();
        let directory = self.fetch_directory();
        let data = directory.data();
        DirectoryPageRef::new(&data).verify_integrity();
    }

    // -------------------------------------------------------------------------
    // Structural operations
    // -------------------------------------------------------------------------

    /// Insert path for a full bucket: split under the exclusive table
    /// latch until the key fits.
    ///
    /// Each round re-selects the target from the directory (earlier
    /// rounds move entries) and retries the insert; a full target is
    /// split, doubling the directory first when its local depth has
    /// caught up with the global depth. The loop is bounded: every
    /// round deepens the target bucket or the directory, and the
    /// directory cannot grow past [`DIRECTORY_ARRAY_SIZE`] slots.
    fn split_insert(&self, key: &K, value: &V) -> bool {
        let _table = self.table_latch.write();
        let mut directory = self.fetch_directory();
        let hash = self.hasher.hash32(key);

        loop {
            let (index, bucket_page_id) = {
                let data = directory.data();
                let dir = DirectoryPageRef::new(&data);
                let index = dir.bucket_index(hash);
                (index, dir.bucket_page_id(index))
            };

            let mut bucket = self.fetch_bucket(bucket_page_id);
            {
                let mut data = bucket.data_mut();
                let mut view = BucketPageMut::<K, V>::new(&mut data);
                if view.insert(key, value) {
                    return true;
                }
                if !view.as_ref().is_full() {
                    // Duplicate, surfaced on the retry.
                    return false;
                }
            }

            let (local_depth, global_depth, size) = {
                let data = directory.data();
                let dir = DirectoryPageRef::new(&data);
                (dir.local_depth(index), dir.global_depth(), dir.size())
            };

            if local_depth == global_depth {
                if size >= DIRECTORY_ARRAY_SIZE {
                    tracing::warn!(
                        global_depth,
                        "directory is at its slot cap; insert fails"
                    );
                    return false;
                }
                let mut data = directory.data_mut();
                let mut dir = DirectoryPageMut::new(&mut data);
                dir.incr_global_depth();
                for slot in size..dir.as_ref().size() {
                    dir.set_local_depth(slot, dir.as_ref().local_depth(slot - size));
                    dir.set_bucket_page_id(slot, dir.as_ref().bucket_page_id(slot - size));
                }
                tracing::debug!(
                    global_depth = dir.as_ref().global_depth(),
                    "doubled hash directory"
                );
            }

            // The doubling may have moved the target slot.
            let (index, local_depth) = {
                let data = directory.data();
                let dir = DirectoryPageRef::new(&data);
                let index = dir.bucket_index(hash);
                (index, dir.local_depth(index))
            };

            let Some(mut new_bucket) = self.pool.new_page() else {
                tracing::warn!("buffer pool exhausted during bucket split; insert fails");
                return false;
            };
            let new_page_id = new_bucket.page_id();

            {
                // Redirect the buddy half of the group at the new page
                // and deepen every member.
                let mut data = directory.data_mut();
                let mut dir = DirectoryPageMut::new(&mut data);
                let stride = 1usize << local_depth;
                let mut slot = index & (stride - 1);
                while slot < dir.as_ref().size() {
                    if ((slot >> local_depth) & 1) != ((index >> local_depth) & 1) {
                        dir.set_bucket_page_id(slot, new_page_id);
                    }
                    dir.incr_local_depth(slot);
                    slot += stride;
                }
            }

            {
                // Rehash the live entries on the deepened mask; those
                // landing in the buddy half move to the new bucket.
                let mut old_data = bucket.data_mut();
                let mut old_view = BucketPageMut::<K, V>::new(&mut old_data);
                let mut new_data = new_bucket.data_mut();
                let mut new_view = BucketPageMut::<K, V>::new(&mut new_data);

                let new_mask = (1u32 << (local_depth + 1)) - 1;
                let new_half = (index as u32 ^ (1u32 << local_depth)) & new_mask;
                for slot in 0..BucketPageRef::<K, V>::CAPACITY {
                    if !old_view.as_ref().is_readable(slot) {
                        continue;
                    }
                    let slot_key = old_view.as_ref().key_at(slot);
                    if self.hasher.hash32(&slot_key) & new_mask == new_half {
                        let slot_value = old_view.as_ref().value_at(slot);
                        new_view.insert(&slot_key, &slot_value);
                        old_view.remove_at(slot);
                    }
                }
            }

            tracing::debug!(
                bucket = %bucket_page_id,
                new_bucket = %new_page_id,
                local_depth = local_depth + 1,
                "split hash bucket"
            );
        }
    }

    /// Merges the (now empty) bucket holding `key` into its buddy,
    /// cascading while the redirected target stays empty.
    fn merge(&self, key: &K) {
        let hash = self.hasher.hash32(key);
        loop {
            let _table = self.table_latch.write();
            let mut directory = self.fetch_directory();

            let (index, bucket_page_id) = {
                let data = directory.data();
                let dir = DirectoryPageRef::new(&data);
                let index = dir.bucket_index(hash);
                (index, dir.bucket_page_id(index))
            };

            let bucket = self.fetch_bucket(bucket_page_id);
            let empty = {
                let data = bucket.data();
                BucketPageRef::<K, V>::new(&data).is_empty()
            };
            if !empty {
                return;
            }

            let (local_depth, buddy_index, buddy_page_id) = {
                let data = directory.data();
                let dir = DirectoryPageRef::new(&data);
                let local_depth = dir.local_depth(index);
                if local_depth == 0 {
                    return;
                }
                let buddy_index = index ^ (1usize << (local_depth - 1));
                if dir.local_depth(buddy_index) != local_depth {
                    return;
                }
                (local_depth, buddy_index, dir.bucket_page_id(buddy_index))
            };
            if buddy_page_id == bucket_page_id {
                // Buddy slots already share a page: this merge happened
                // from the other direction.
                return;
            }

            {
                let mut data = directory.data_mut();
                let mut dir = DirectoryPageMut::new(&mut data);
                dir.decr_local_depth(index);
                dir.decr_local_depth(buddy_index);
                dir.set_bucket_page_id(index, buddy_page_id);

                let merged_depth = dir.as_ref().local_depth(index);
                for slot in 0..dir.as_ref().size() {
                    if slot == index || slot == buddy_index {
                        continue;
                    }
                    let id = dir.as_ref().bucket_page_id(slot);
                    if id == bucket_page_id || id == buddy_page_id {
                        dir.set_bucket_page_id(slot, buddy_page_id);
                        dir.set_local_depth(slot, merged_depth);
                    }
                }

                if dir.as_ref().can_shrink() {
                    dir.decr_global_depth();
                }
            }

            drop(bucket);
            self.pool.delete_page(bucket_page_id);
            tracing::debug!(
                bucket = %bucket_page_id,
                into = %buddy_page_id,
                local_depth = local_depth - 1,
                "merged empty hash bucket"
            );
            // The key's slot now points at the buddy, which may itself
            // be empty; take another pass.
        }
    }

    // -------------------------------------------------------------------------
    // Page plumbing
    // -------------------------------------------------------------------------

    fn fetch_directory(&self) -> strata_storage::buffer::PageHandle<'_> {
        self.pool
            .fetch_page(self.directory_page_id)
            .expect("buffer pool exhausted while pinning the hash directory")
    }

    fn fetch_bucket(&self, page_id: PageId) -> strata_storage::buffer::PageHandle<'_> {
        self.pool
            .fetch_page(page_id)
            .expect("buffer pool exhausted while pinning a hash bucket")
    }
}

impl<K, V, H> std::fmt::Debug for DiskExtendibleHashTable<K, V, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskExtendibleHashTable")
            .field("directory_page_id", &self.directory_page_id)
            .finish()
    }
}
