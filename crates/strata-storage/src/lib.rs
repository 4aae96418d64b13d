//! # strata-storage
//!
//! Disk manager and buffer pool for StrataDB.
//!
//! This crate implements the paged storage layer of the engine:
//!
//! - Blocking page I/O against a backing store ([`disk`])
//! - A fixed-size cache of page frames with pin counts, dirty
//!   tracking, LRU replacement, and a parallel multi-instance router
//!   ([`buffer`])

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Buffer pool management
pub mod buffer;

/// Disk managers and page I/O
pub mod disk;
