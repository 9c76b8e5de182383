//! Catalog persistence: table descriptors, column metadata and allocator
//! cursors, stored as property-tagged records on a well-known page.
//!
//! The catalog occupies page 0 of table 0. Its page layout is a `u32` record
//! count followed by length-prefixed records; the length prefix lets the
//! loader recover position and keep going when a single record fails to
//! decode. Every top-level record opens with a record-kind field (id 1) and
//! appends new fields with strictly increasing ids.

use crate::serial::deserializer::read_varlen_payload;
use crate::serial::serializer::write_varlen_payload;
use crate::serial::{
    BinaryDeserializer, BinarySerializer, Deserialize, MemoryStream, ReadStream, SerialError,
    SerialRead, SerialResult, SerialWrite, Serialize, Tag, WriteStream, from_bytes, to_bytes,
};
use crate::storage::{
    BufferPool, INVALID_PAGE_NUMBER, PAGE_SIZE, PageAllocator, PageId, PageNumber, TableId,
};
use crate::types::{TypeId, Value};
use anyhow::{Context, Result, bail};
use std::collections::HashMap;
use tracing::{debug, warn};

/// The catalog's own table id; its records live on page 0.
pub const CATALOG_TABLE_ID: TableId = 0;
pub const CATALOG_PAGE_NUMBER: PageNumber = 0;

/// Discriminates top-level catalog records. Field id 1 in every record.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Table = 1,
    Allocator = 2,
}

/// One column of a table schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub type_id: TypeId,
    /// Declared maximum length for VARCHAR columns; 0 for fixed-width types.
    pub length: u32,
    pub default_value: Option<Value>,
}

impl Column {
    pub fn new(name: &str, type_id: TypeId) -> Self {
        Self {
            name: name.to_string(),
            type_id,
            length: 0,
            default_value: None,
        }
    }

    pub fn with_length(name: &str, type_id: TypeId, length: u32) -> Self {
        Self {
            name: name.to_string(),
            type_id,
            length,
            default_value: None,
        }
    }
}

impl Serialize for Column {
    fn serialize(&self, serializer: &mut BinarySerializer<'_>) -> SerialResult<()> {
        serializer.write_property(1, "name", &self.name)?;
        serializer.write_property(2, "type", &(self.type_id as u8))?;
        serializer.write_property_with_default(3, "length", &self.length, &0)?;
        serializer.write_property_with_default(4, "default", &self.default_value, &None)
    }
}

impl Deserialize for Column {
    fn deserialize(deserializer: &mut BinaryDeserializer<'_>) -> SerialResult<Self> {
        let name = deserializer.read_property(1, "name")?;
        let type_byte: u8 = deserializer.read_property(2, "type")?;
        let length = deserializer.read_property_with_default(3, "length", 0)?;
        let default_value = deserializer.read_property_with_default(4, "default", None)?;
        let type_id =
            TypeId::from_u8(type_byte).map_err(|_| SerialError::Malformed("unknown column type"))?;
        Ok(Column {
            name,
            type_id,
            length,
            default_value,
        })
    }
}

impl SerialWrite for Column {
    const TAG: Tag = Tag::Varlen;
    fn write_payload(&self, stream: &mut dyn WriteStream) -> SerialResult<()> {
        write_varlen_payload(stream, &to_bytes(self)?)
    }
}

impl SerialRead for Column {
    const TAG: Tag = Tag::Varlen;
    fn read_payload(stream: &mut dyn ReadStream) -> SerialResult<Self> {
        let bytes = read_varlen_payload(stream)?;
        from_bytes(&bytes)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Schema {
    pub columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// A table descriptor as persisted in the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct TableInfo {
    pub table_id: TableId,
    pub name: String,
    pub first_page_number: PageNumber,
    pub schema: Schema,
}

impl TableInfo {
    fn write_fields(&self, serializer: &mut BinarySerializer<'_>) -> SerialResult<()> {
        serializer.write_property(2, "table_id", &self.table_id)?;
        serializer.write_property(3, "name", &self.name)?;
        serializer.write_property_with_default(
            4,
            "first_page",
            &self.first_page_number,
            &INVALID_PAGE_NUMBER,
        )?;
        serializer.write_property(5, "columns", &self.schema.columns)
    }

    fn read_fields(deserializer: &mut BinaryDeserializer<'_>) -> SerialResult<Self> {
        let table_id = deserializer.read_property(2, "table_id")?;
        let name = deserializer.read_property(3, "name")?;
        let first_page_number =
            deserializer.read_property_with_default(4, "first_page", INVALID_PAGE_NUMBER)?;
        let columns: Vec<Column> = deserializer.read_property(5, "columns")?;
        Ok(TableInfo {
            table_id,
            name,
            first_page_number,
            schema: Schema::new(columns),
        })
    }
}

/// A persisted allocator cursor.
#[derive(Debug, Clone, PartialEq)]
struct AllocatorState {
    table_id: TableId,
    cursor: PageNumber,
}

impl AllocatorState {
    fn write_fields(&self, serializer: &mut BinarySerializer<'_>) -> SerialResult<()> {
        serializer.write_property(2, "table_id", &self.table_id)?;
        serializer.write_property(3, "cursor", &self.cursor)
    }

    fn read_fields(deserializer: &mut BinaryDeserializer<'_>) -> SerialResult<Self> {
        let table_id = deserializer.read_property(2, "table_id")?;
        let cursor = deserializer.read_property(3, "cursor")?;
        Ok(AllocatorState { table_id, cursor })
    }
}

/// A top-level catalog record, dispatched on the record-kind field.
#[derive(Debug, Clone, PartialEq)]
enum CatalogRecord {
    Table(TableInfo),
    Allocator(AllocatorState),
}

impl Serialize for CatalogRecord {
    fn serialize(&self, serializer: &mut BinarySerializer<'_>) -> SerialResult<()> {
        match self {
            CatalogRecord::Table(info) => {
                serializer.write_property(1, "kind", &(RecordKind::Table as u8))?;
                info.write_fields(serializer)
            }
            CatalogRecord::Allocator(state) => {
                serializer.write_property(1, "kind", &(RecordKind::Allocator as u8))?;
                state.write_fields(serializer)
            }
        }
    }
}

impl Deserialize for CatalogRecord {
    fn deserialize(deserializer: &mut BinaryDeserializer<'_>) -> SerialResult<Self> {
        let kind: u8 = deserializer.read_property(1, "kind")?;
        match kind {
            1 => Ok(CatalogRecord::Table(TableInfo::read_fields(deserializer)?)),
            2 => Ok(CatalogRecord::Allocator(AllocatorState::read_fields(
                deserializer,
            )?)),
            _ => Err(SerialError::Malformed("unknown record kind")),
        }
    }
}

/// In-memory catalog backed by the catalog page.
pub struct Catalog {
    pool: BufferPool,
    tables: HashMap<String, TableInfo>,
    allocators: HashMap<TableId, PageAllocator>,
    next_table_id: TableId,
}

impl Catalog {
    /// Initializes the catalog for a fresh database and persists it.
    pub fn bootstrap(pool: BufferPool) -> Result<Self> {
        let mut allocators = HashMap::new();
        // Page 0 of the catalog table is the catalog page itself.
        allocators.insert(CATALOG_TABLE_ID, PageAllocator::from_cursor(CATALOG_TABLE_ID, 1));

        let catalog = Self {
            pool,
            tables: HashMap::new(),
            allocators,
            next_table_id: CATALOG_TABLE_ID + 1,
        };
        catalog.save()?;
        Ok(catalog)
    }

    /// Loads the catalog from the catalog page of an existing database.
    ///
    /// Records that fail to decode are skipped; the length prefix recovers
    /// the stream position so the remaining records still load.
    pub fn load(pool: BufferPool) -> Result<Self> {
        let mut tables = HashMap::new();
        let mut allocators = HashMap::new();
        let mut next_table_id = CATALOG_TABLE_ID + 1;

        {
            let page_id = PageId::new(CATALOG_TABLE_ID, CATALOG_PAGE_NUMBER);
            let guard = pool.fetch_page_read(page_id)?;
            let data: &[u8; PAGE_SIZE] = &guard;

            let count = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
            let mut offset = 4;
            for _ in 0..count {
                if offset + 4 > PAGE_SIZE {
                    bail!("catalog page truncated at record length");
                }
                let len = u32::from_le_bytes([
                    data[offset],
                    data[offset + 1],
                    data[offset + 2],
                    data[offset + 3],
                ]) as usize;
                offset += 4;
                if offset + len > PAGE_SIZE {
                    bail!("catalog page truncated at record body");
                }
                let bytes = &data[offset..offset + len];
                offset += len;

                match from_bytes::<CatalogRecord>(bytes) {
                    Ok(CatalogRecord::Table(info)) => {
                        if info.table_id >= next_table_id {
                            next_table_id = info.table_id + 1;
                        }
                        tables.insert(info.name.clone(), info);
                    }
                    Ok(CatalogRecord::Allocator(state)) => {
                        allocators.insert(
                            state.table_id,
                            PageAllocator::from_cursor(state.table_id, state.cursor),
                        );
                    }
                    Err(e) => {
                        warn!(error = %e, "skipping undecodable catalog record");
                    }
                }
            }
        }

        if !allocators.contains_key(&CATALOG_TABLE_ID) {
            bail!("catalog page carries no allocator record for the catalog table");
        }

        debug!(
            tables = tables.len(),
            allocators = allocators.len(),
            "catalog loaded"
        );
        Ok(Self {
            pool,
            tables,
            allocators,
            next_table_id,
        })
    }

    /// Writes all catalog records back to the catalog page and flushes it.
    pub fn save(&self) -> Result<()> {
        // The catalog must fit one page; a fixed stream enforces that.
        let mut stream = MemoryStream::fixed(PAGE_SIZE);
        stream.write_data(&[0u8; 4])?; // count, patched below

        let mut count = 0u32;
        let mut tables: Vec<&TableInfo> = self.tables.values().collect();
        tables.sort_by_key(|info| info.table_id);
        for info in tables {
            Self::append_record(&mut stream, &CatalogRecord::Table(info.clone()))?;
            count += 1;
        }

        let mut allocators: Vec<&PageAllocator> = self.allocators.values().collect();
        allocators.sort_by_key(|a| a.table_id());
        for allocator in allocators {
            let state = AllocatorState {
                table_id: allocator.table_id(),
                cursor: allocator.cursor(),
            };
            Self::append_record(&mut stream, &CatalogRecord::Allocator(state))?;
            count += 1;
        }

        let mut page = stream.release();
        page[0..4].copy_from_slice(&count.to_le_bytes());

        let page_id = PageId::new(CATALOG_TABLE_ID, CATALOG_PAGE_NUMBER);
        {
            let mut guard = self.pool.fetch_page_write(page_id)?;
            guard[..page.len()].copy_from_slice(&page);
            guard[page.len()..].fill(0);
        }
        self.pool.flush_page(page_id)?;
        Ok(())
    }

    fn append_record(stream: &mut MemoryStream, record: &CatalogRecord) -> Result<()> {
        let bytes = to_bytes(record).context("failed to encode catalog record")?;
        stream.write_data(&(bytes.len() as u32).to_le_bytes())?;
        stream.write_data(&bytes)?;
        Ok(())
    }

    /// Creates a table: assigns an id, allocates its first page and persists
    /// the new descriptor and allocator cursor.
    pub fn create_table(&mut self, name: &str, schema: Schema) -> Result<TableInfo> {
        if self.tables.contains_key(name) {
            bail!("table {:?} already exists", name);
        }

        let table_id = self.next_table_id;
        self.next_table_id += 1;

        let mut allocator = PageAllocator::new(table_id);
        let first_page_number = {
            let guard = self.pool.new_page(&mut allocator)?;
            guard.page_id().page_number
        };

        let info = TableInfo {
            table_id,
            name: name.to_string(),
            first_page_number,
            schema,
        };
        self.allocators.insert(table_id, allocator);
        self.tables.insert(info.name.clone(), info.clone());
        self.save()?;
        Ok(info)
    }

    pub fn table(&self, name: &str) -> Option<&TableInfo> {
        self.tables.get(name)
    }

    /// All table descriptors, ordered by table id.
    pub fn tables(&self) -> Vec<&TableInfo> {
        let mut tables: Vec<&TableInfo> = self.tables.values().collect();
        tables.sort_by_key(|info| info.table_id);
        tables
    }

    /// The persisted allocator for a table. Callers that allocate pages
    /// through it must `save` the catalog to persist the moved cursor.
    pub fn allocator_mut(&mut self, table_id: TableId) -> Option<&mut PageAllocator> {
        self.allocators.get_mut(&table_id)
    }
}
