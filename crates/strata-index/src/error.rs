//! Index errors.

use thiserror::Error;

/// Result type for index construction.
pub type IndexResult<T> = Result<T, IndexError>;

/// Errors raised while building an index.
///
/// The table operations themselves report expected conditions through
/// their `bool`/`Vec` returns; this type covers construction, where
/// the directory and first bucket must be materialized.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The buffer pool could not pin a page for the new index.
    #[error("buffer pool exhausted while creating the index")]
    PoolExhausted,
}
