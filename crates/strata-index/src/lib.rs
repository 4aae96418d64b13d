//! # strata-index
//!
//! Extendible hash index for StrataDB.
//!
//! The index is a persistent dynamic hash table whose directory and
//! buckets live in buffer-pool pages:
//!
//! - [`DiskExtendibleHashTable`] — the table itself: `get`, `insert`,
//!   `remove`, with bucket splits and merges that grow and shrink the
//!   directory
//! - [`BucketPageRef`]/[`BucketPageMut`] — one bucket packed into one
//!   page as two bitmaps plus fixed-width key/value slots
//! - [`DirectoryPageRef`]/[`DirectoryPageMut`] — global depth, local
//!   depths, and the slot-to-bucket map
//! - [`KeyHasher`] — the hash function, passed at construction
//!
//! Point operations take the table-level latch shared and the target
//! bucket's frame latch in the matching mode; structural operations
//! (split, merge) take the table latch exclusively, so readers never
//! observe a half-split directory.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod bucket;
mod codec;
mod directory;
mod error;
mod hashing;
mod table;

pub use bucket::{bucket_capacity, BucketPageMut, BucketPageRef};
pub use codec::Storable;
pub use directory::{DirectoryPageMut, DirectoryPageRef};
pub use error::{IndexError, IndexResult};
pub use hashing::{IdentityHasher, KeyHasher, SipKeyHasher};
pub use table::DiskExtendibleHashTable;
