//! # strata-common
//!
//! Common types and constants for StrataDB.
//!
//! This crate provides the foundational types shared by the storage
//! engine components:
//!
//! - **Types**: Core identifiers (`PageId`, `FrameId`) and the record
//!   identifier (`Rid`)
//! - **Constants**: Page geometry and system-wide limits
//!
//! ## Example
//!
//! ```rust
//! use strata_common::types::{PageId, Rid};
//! use strata_common::constants::PAGE_SIZE;
//!
//! let page_id = PageId::new(42);
//! let rid = Rid::new(page_id, 7);
//! assert_eq!(rid.page_id(), page_id);
//! assert_eq!(PAGE_SIZE, 4096);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod constants;
pub mod types;

// Re-export commonly used items at the crate root
pub use constants::*;
pub use types::{FrameId, PageId, Rid};
