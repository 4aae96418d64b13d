//! Record identifier.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::PageId;

/// Record identifier - names a tuple by the page that holds it and the
/// slot inside that page.
///
/// This is the canonical value type stored by the hash index: an index
/// entry maps a key to the `Rid` of the matching tuple.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Rid {
    page_id: PageId,
    slot: u32,
}

impl Rid {
    /// Creates a new record identifier.
    #[inline]
    #[must_use]
    pub const fn new(page_id: PageId, slot: u32) -> Self {
        Self { page_id, slot }
    }

    /// Returns the page holding the record.
    #[inline]
    #[must_use]
    pub const fn page_id(self) -> PageId {
        self.page_id
    }

    /// Returns the slot number within the page.
    #[inline]
    #[must_use]
    pub const fn slot(self) -> u32 {
        self.slot
    }
}

impl fmt::Debug for Rid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rid({}:{})", self.page_id, self.slot)
    }
}

impl fmt::Display for Rid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.page_id, self.slot)
    }
}
