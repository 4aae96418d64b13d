//! Core types for StrataDB.

mod ids;
mod rid;

pub use ids::{FrameId, PageId};
pub use rid::Rid;
