//! End-to-end scenarios across disk manager, buffer pool, guards, the
//! serialization framework and the catalog.

use anyhow::Result;
use pagedb::catalog::{Column, Schema};
use pagedb::config::DbConfig;
use pagedb::database::Database;
use pagedb::serial::{
    BinaryDeserializer, BinarySerializer, Deserialize, SerialResult, Serialize, from_bytes,
    to_bytes,
};
use pagedb::storage::buffer::random::RandomReplacer;
use pagedb::storage::{BufferPool, DiskManager, PAGE_SIZE, PageAllocator, StorageError};
use pagedb::types::{TypeId, Value};
use tempfile::{TempDir, tempdir};

fn create_pool(pool_size: usize) -> Result<(TempDir, BufferPool)> {
    let dir = tempdir()?;
    let disk = DiskManager::new(dir.path())?;
    let pool = BufferPool::new(pool_size, disk, Box::new(RandomReplacer::new()));
    Ok((dir, pool))
}

#[test]
fn fetch_pin_unpin_cycle() -> Result<()> {
    let (_dir, pool) = create_pool(2)?;
    let mut allocator = PageAllocator::new(1);

    let g1 = pool.new_page(&mut allocator)?;
    let p1 = g1.page_id();
    let _g2 = pool.new_page(&mut allocator)?;

    // Both frames pinned: the third page cannot be placed
    let blocked = pool.new_page(&mut allocator);
    assert!(matches!(
        blocked,
        Err(StorageError::FrameExhausted { pool_size: 2 })
    ));

    // Releasing p1 makes a frame evictable; p1 is clean, so eviction
    // involves no write
    drop(g1);
    let g3 = pool.new_page(&mut allocator)?;
    assert_eq!(g3.page_id().page_number, 2);

    // p1 left the pool
    assert!(!pool.unpin_page(p1, false));
    Ok(())
}

#[test]
fn dirty_eviction_writes_through() -> Result<()> {
    let (dir, pool) = create_pool(1)?;
    let mut allocator = PageAllocator::new(7);

    let p = pool.new_page(&mut allocator)?.page_id();
    {
        let mut guard = pool.fetch_page_write(p)?;
        guard.fill(0xAB);
    }

    // Pool size 1: allocating the next page must evict p and write it back
    let _q = pool.new_page(&mut allocator)?;

    let file = std::fs::read(dir.path().join(format!("{}.page", p.table_id)))?;
    let offset = p.page_number as usize * PAGE_SIZE;
    assert!(file[offset..offset + PAGE_SIZE].iter().all(|&b| b == 0xAB));
    Ok(())
}

#[test]
fn pin_counts_compose() -> Result<()> {
    let (_dir, pool) = create_pool(2)?;
    let mut allocator = PageAllocator::new(1);

    let p = pool.new_page(&mut allocator)?.page_id();

    let g1 = pool.fetch_page_basic(p)?;
    let g2 = pool.fetch_page_basic(p)?;

    drop(g1);
    // One pin remains: the page is not evictable, so delete fails
    assert!(!pool.delete_page(p));

    drop(g2);
    // Pin count reached zero: now evictable and deletable
    assert!(pool.delete_page(p));
    Ok(())
}

#[test]
fn flush_delete_fetch_reads_back() -> Result<()> {
    let (dir, pool) = create_pool(2)?;
    let mut allocator = PageAllocator::new(3);

    let p = pool.new_page(&mut allocator)?.page_id();
    {
        let mut guard = pool.fetch_page_write(p)?;
        guard[0] = 0xB0;
        guard[PAGE_SIZE - 1] = 0xB1;
    }
    assert!(pool.flush_page(p)?);
    assert!(pool.delete_page(p));

    // Page numbers are not reissued, so the bytes are read back directly
    let mut disk = DiskManager::new(dir.path())?;
    let mut buf = [0u8; PAGE_SIZE];
    disk.read_page(p, &mut buf)?;
    assert_eq!(buf[0], 0xB0);
    assert_eq!(buf[PAGE_SIZE - 1], 0xB1);
    Ok(())
}

#[derive(Debug, PartialEq)]
struct Bar {
    b: u32,
    vec: Vec<String>,
}

impl Serialize for Bar {
    fn serialize(&self, serializer: &mut BinarySerializer<'_>) -> SerialResult<()> {
        serializer.write_property(1, "b", &self.b)?;
        serializer.write_property_with_default(2, "vec", &self.vec, &Vec::new())
    }
}

impl Deserialize for Bar {
    fn deserialize(deserializer: &mut BinaryDeserializer<'_>) -> SerialResult<Self> {
        let b = deserializer.read_property(1, "b")?;
        let vec = deserializer.read_property_with_default(2, "vec", Vec::new())?;
        Ok(Bar { b, vec })
    }
}

#[test]
fn serializer_default_suppression() -> Result<()> {
    let empty = Bar { b: 43, vec: vec![] };
    let full = Bar {
        b: 43,
        vec: vec!["a".to_string()],
    };

    let short = to_bytes(&empty)?;
    let long = to_bytes(&full)?;
    assert!(short.len() < long.len());

    assert_eq!(from_bytes::<Bar>(&short)?, empty);
    assert_eq!(from_bytes::<Bar>(&long)?, full);
    Ok(())
}

#[test]
fn serializer_forward_compatibility() -> Result<()> {
    // Writer with fields {1, 3}
    struct Sparse;
    impl Serialize for Sparse {
        fn serialize(&self, serializer: &mut BinarySerializer<'_>) -> SerialResult<()> {
            serializer.write_property(1, "b", &5u32)?;
            serializer.write_property(3, "tail", &"end".to_string())
        }
    }

    // Reader expecting {1, 2, 3}, field 2 with a default
    #[derive(Debug, PartialEq)]
    struct Dense {
        b: u32,
        middle: i64,
        tail: String,
    }
    impl Deserialize for Dense {
        fn deserialize(deserializer: &mut BinaryDeserializer<'_>) -> SerialResult<Self> {
            let b = deserializer.read_property(1, "b")?;
            let middle = deserializer.read_property_with_default(2, "middle", -7i64)?;
            let tail = deserializer.read_property(3, "tail")?;
            Ok(Dense { b, middle, tail })
        }
    }

    let out: Dense = from_bytes(&to_bytes(&Sparse)?)?;
    assert_eq!(
        out,
        Dense {
            b: 5,
            middle: -7,
            tail: "end".to_string(),
        }
    );
    Ok(())
}

#[test]
fn value_encoding_integer_minus_one() {
    let value = Value::Integer(-1);
    assert_eq!(value.to_bytes(), vec![0xFF, 0xFF, 0xFF, 0xFF]);
    assert_eq!(
        Value::from_bytes(TypeId::Integer, &value.to_bytes()).unwrap(),
        Value::Integer(-1)
    );
}

#[test]
fn values_roundtrip_through_a_page() -> Result<()> {
    let (_dir, pool) = create_pool(2)?;
    let mut allocator = PageAllocator::new(1);

    let values = vec![
        Value::Integer(-1),
        Value::Timestamp(1_234_567_890),
        Value::Varchar("on-page".to_string()),
        Value::Boolean(true),
    ];

    let p = pool.new_page(&mut allocator)?.page_id();
    {
        let mut guard = pool.fetch_page_write(p)?;
        let mut offset = 0;
        for value in &values {
            let bytes = value.to_bytes_with_type_info();
            guard[offset..offset + bytes.len()].copy_from_slice(&bytes);
            offset += bytes.len();
        }
    }

    let guard = pool.fetch_page_read(p)?;
    let mut offset = 0;
    for expected in &values {
        let decoded = Value::from_bytes_with_type_info(&guard[offset..])?;
        assert_eq!(&decoded, expected);
        offset += 1 + expected.storage_size();
    }
    Ok(())
}

#[test]
fn database_round_trip_with_restart() -> Result<()> {
    let dir = tempdir()?;
    let config = DbConfig::new(dir.path().join("db")).with_pool_size(4);

    let (table_id, data_page);
    {
        let mut db = Database::create(&config)?;
        let info = db.create_table(
            "events",
            Schema::new(vec![
                Column::new("id", TypeId::Integer),
                Column::new("at", TypeId::Timestamp),
                Column::with_length("tag", TypeId::Varchar, 64),
            ]),
        )?;
        table_id = info.table_id;

        data_page = db.allocate_page(table_id)?;
        {
            let mut guard = db.buffer_pool().fetch_page_write(data_page)?;
            guard[..4].copy_from_slice(&0xCAFE_F00Du32.to_le_bytes());
        }
        db.flush()?;
    }

    {
        let db = Database::open(&config)?;
        let info = db.catalog().table("events").expect("catalog persisted");
        assert_eq!(info.table_id, table_id);
        assert_eq!(info.schema.columns.len(), 3);

        let guard = db.buffer_pool().fetch_page_read(data_page)?;
        assert_eq!(&guard[..4], &0xCAFE_F00Du32.to_le_bytes());
    }
    Ok(())
}

#[test]
fn eviction_pressure_preserves_contents() -> Result<()> {
    // More pages than frames: every access pattern forces evictions, and
    // every page still reads back its own stamp.
    let (_dir, pool) = create_pool(4)?;
    let mut allocator = PageAllocator::new(9);

    let mut pages = Vec::new();
    for i in 0..16u8 {
        let p = pool.new_page(&mut allocator)?.page_id();
        {
            let mut guard = pool.fetch_page_write(p)?;
            guard.fill(i);
        }
        pages.push((p, i));
    }

    for (p, stamp) in pages {
        let guard = pool.fetch_page_read(p)?;
        assert!(guard.iter().all(|&b| b == stamp));
    }
    Ok(())
}
