//! Engine configuration.
//!
//! The database root is passed in explicitly; tests instantiate per-case
//! temporary roots instead of sharing process-wide state.

use std::path::PathBuf;

pub const DEFAULT_POOL_SIZE: usize = 64;

#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Number of buffer pool frames.
    pub pool_size: usize,
    /// Filesystem directory holding the per-table page files.
    pub root: PathBuf,
}

impl DbConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            root: root.into(),
        }
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }
}
