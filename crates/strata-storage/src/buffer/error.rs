//! Buffer pool errors.

use thiserror::Error;

/// Result type for buffer pool operations.
pub type BufferResult<T> = Result<T, BufferError>;

/// Errors that can occur constructing a buffer pool.
///
/// The page operations themselves report expected conditions through
/// their `Option`/`bool` returns (pool exhausted, page not resident,
/// pinned on delete); disk failures on the eviction and flush paths
/// are logged and surfaced as operation failure rather than carried as
/// values.
#[derive(Debug, Error)]
pub enum BufferError {
    /// Configuration error.
    #[error("configuration error: {message}")]
    Config {
        /// What was wrong with the configuration.
        message: String,
    },
}

impl BufferError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
