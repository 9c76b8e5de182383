//! Storage layer error types.

use crate::storage::page::PageId;
use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Error, Debug)]
pub enum StorageError {
    /// All frames are pinned. The caller may retry after releasing guards.
    #[error("buffer pool exhausted: all {pool_size} frames are pinned")]
    FrameExhausted { pool_size: usize },

    /// A caller supplied the invalid page id.
    #[error("invalid page id supplied to {operation}")]
    InvalidPageId { operation: &'static str },

    /// Unpin of a page whose pin count is already zero.
    #[error("pin count underflow on {0}")]
    PinUnderflow(PageId),

    /// Disk read/write failed. Non-recoverable at this layer.
    #[error("I/O fault: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
