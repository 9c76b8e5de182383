//! High-level database handle wiring disk manager, buffer pool and catalog.

use crate::catalog::{CATALOG_TABLE_ID, Catalog, Schema, TableInfo};
use crate::config::DbConfig;
use crate::storage::buffer::random::RandomReplacer;
use crate::storage::{BufferPool, DiskManager, PageId, TableId};
use anyhow::{Context, Result, bail};

pub struct Database {
    pool: BufferPool,
    catalog: Catalog,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

impl Database {
    /// Creates a new database under `config.root`.
    pub fn create(config: &DbConfig) -> Result<Self> {
        let disk = DiskManager::new(&config.root)
            .with_context(|| format!("failed to initialize database root {:?}", config.root))?;
        if disk.table_path(CATALOG_TABLE_ID).exists() {
            bail!("database already exists at {:?}", config.root);
        }

        let pool = BufferPool::new(config.pool_size, disk, Box::new(RandomReplacer::new()));
        let catalog = Catalog::bootstrap(pool.clone())?;

        Ok(Self { pool, catalog })
    }

    /// Opens an existing database under `config.root`.
    pub fn open(config: &DbConfig) -> Result<Self> {
        let disk = DiskManager::new(&config.root)
            .with_context(|| format!("failed to initialize database root {:?}", config.root))?;
        if !disk.table_path(CATALOG_TABLE_ID).exists() {
            bail!("no database at {:?}", config.root);
        }

        let pool = BufferPool::new(config.pool_size, disk, Box::new(RandomReplacer::new()));
        let catalog = Catalog::load(pool.clone())?;

        Ok(Self { pool, catalog })
    }

    /// Creates a table with the given schema and persists its descriptor.
    pub fn create_table(&mut self, name: &str, schema: Schema) -> Result<TableInfo> {
        self.catalog.create_table(name, schema)
    }

    /// Allocates a fresh page for a table, pinning and releasing it so the
    /// caller can fetch it at leisure.
    pub fn allocate_page(&mut self, table_id: TableId) -> Result<PageId> {
        let allocator = self
            .catalog
            .allocator_mut(table_id)
            .with_context(|| format!("no allocator for table {}", table_id))?;
        let page_id = {
            let guard = self.pool.new_page(allocator)?;
            guard.page_id()
        };
        // Persist the moved cursor so the number is never reissued.
        self.catalog.save()?;
        Ok(page_id)
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn buffer_pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Persists the catalog and flushes every resident page.
    pub fn flush(&mut self) -> Result<()> {
        self.catalog.save()?;
        self.pool.flush_all_pages()?;
        Ok(())
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        // Best effort flush on drop
        let _ = self.flush();
    }
}
