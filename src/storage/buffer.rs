//! Buffer pool: a fixed set of in-memory frames caching disk pages.
//!
//! All access to page bytes goes through the pool. A single pool-wide mutex
//! protects the frame table, free list, per-frame metadata and the replacer;
//! page bytes are protected by a per-frame reader/writer latch that guards
//! acquire outside the pool mutex.
//!
//! Lock order: pool state mutex, then disk manager mutex. Per-frame latches
//! are never acquired while the state mutex is held. The pool imposes no
//! ordering on page latches; callers latching several pages at once should
//! acquire them in ascending `PageId` order to avoid deadlock.

pub mod lru;
pub mod random;
pub mod replacer;

use crate::storage::disk::{DiskManager, PAGE_SIZE, PageAllocator};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::PageId;
use parking_lot::Mutex;
use parking_lot::RawRwLock;
use parking_lot::lock_api::RawRwLock as _;
use replacer::{FrameId, Replacer};
use std::cell::UnsafeCell;
use std::collections::{HashMap, VecDeque};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tracing::{debug, error};

/// One frame: a page-sized buffer plus the latch guarding its bytes.
///
/// Pin counts and the dirty flag live in `FrameMeta` under the pool mutex,
/// not here; the latch only orders access to the bytes.
struct Frame {
    data: UnsafeCell<Box<[u8; PAGE_SIZE]>>,
    latch: RawRwLock,
}

impl Frame {
    fn new() -> Self {
        Self {
            data: UnsafeCell::new(Box::new([0u8; PAGE_SIZE])),
            latch: RawRwLock::INIT,
        }
    }
}

// SAFETY: access to `data` is ordered by the frame latch for latched guards,
// and by the pin-count protocol (pin_count == 0 under the pool mutex) for
// frame loads and eviction write-backs.
unsafe impl Send for Frame {}
unsafe impl Sync for Frame {}

/// Per-frame bookkeeping, protected by the pool mutex.
#[derive(Debug, Clone, Copy)]
struct FrameMeta {
    page_id: PageId,
    pin_count: u32,
    is_dirty: bool,
}

impl FrameMeta {
    fn new() -> Self {
        Self {
            page_id: PageId::invalid(),
            pin_count: 0,
            is_dirty: false,
        }
    }

    fn reset(&mut self) {
        self.page_id = PageId::invalid();
        self.pin_count = 0;
        self.is_dirty = false;
    }
}

/// Mutable pool state behind the single pool-wide mutex.
struct PoolState {
    /// Maps PageId -> FrameId for every resident page.
    page_table: HashMap<PageId, FrameId>,
    /// Metadata for each frame (indexed by FrameId).
    meta: Vec<FrameMeta>,
    /// Frames not currently holding any page.
    free_list: VecDeque<FrameId>,
    /// Replacement policy over evictable frames.
    replacer: Box<dyn Replacer>,
}

#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<BufferPoolInner>,
}

struct BufferPoolInner {
    frames: Vec<Frame>,
    state: Mutex<PoolState>,
    disk: Mutex<DiskManager>,
    pool_size: usize,
}

impl BufferPool {
    /// Creates a buffer pool with `pool_size` frames, all initially free.
    ///
    /// # Panics
    ///
    /// Panics if `pool_size` is 0.
    pub fn new(pool_size: usize, disk_manager: DiskManager, replacer: Box<dyn Replacer>) -> Self {
        assert!(pool_size > 0, "pool_size must be > 0");

        let frames: Vec<_> = (0..pool_size).map(|_| Frame::new()).collect();
        let meta: Vec<_> = (0..pool_size).map(|_| FrameMeta::new()).collect();
        let free_list: VecDeque<_> = (0..pool_size).collect();

        Self {
            inner: Arc::new(BufferPoolInner {
                frames,
                state: Mutex::new(PoolState {
                    page_table: HashMap::with_capacity(pool_size),
                    meta,
                    free_list,
                    replacer,
                }),
                disk: Mutex::new(disk_manager),
                pool_size,
            }),
        }
    }

    /// Allocates a fresh page from `allocator` and pins it in a frame.
    ///
    /// The page bytes start zeroed. The returned guard holds a pin only; to
    /// write the page contents, fetch it with `fetch_page_write`.
    pub fn new_page(&self, allocator: &mut PageAllocator) -> StorageResult<BasicPageGuard> {
        let mut state = self.inner.state.lock();

        let frame_id = self.inner.allocate_frame(&mut state)?;
        state.replacer.pin(frame_id);

        let stale = state.meta[frame_id].page_id;
        if stale.is_valid() {
            state.page_table.remove(&stale);
        }

        let page_id = allocator.allocate_page();
        state.page_table.insert(page_id, frame_id);

        let meta = &mut state.meta[frame_id];
        meta.page_id = page_id;
        meta.pin_count = 1;
        meta.is_dirty = false;

        self.inner.check_invariants(&state);
        drop(state);

        Ok(BasicPageGuard {
            inner: self.inner.clone(),
            frame_id,
            page_id,
        })
    }

    /// Fetches a page, pinning it without latching its bytes.
    pub fn fetch_page_basic(&self, page_id: PageId) -> StorageResult<BasicPageGuard> {
        let frame_id = self.inner.fetch_frame(page_id, "fetch_page_basic")?;
        Ok(BasicPageGuard {
            inner: self.inner.clone(),
            frame_id,
            page_id,
        })
    }

    /// Fetches a page and takes its shared latch.
    ///
    /// Blocks until no write guard holds the page.
    pub fn fetch_page_read(&self, page_id: PageId) -> StorageResult<PageReadGuard> {
        let frame_id = self.inner.fetch_frame(page_id, "fetch_page_read")?;
        // Latch acquisition happens outside the pool mutex.
        self.inner.frames[frame_id].latch.lock_shared();
        Ok(PageReadGuard {
            inner: self.inner.clone(),
            frame_id,
            page_id,
        })
    }

    /// Fetches a page and takes its exclusive latch.
    pub fn fetch_page_write(&self, page_id: PageId) -> StorageResult<PageWriteGuard> {
        let frame_id = self.inner.fetch_frame(page_id, "fetch_page_write")?;
        self.inner.frames[frame_id].latch.lock_exclusive();
        Ok(PageWriteGuard {
            inner: self.inner.clone(),
            frame_id,
            page_id,
            dirty: false,
        })
    }

    /// Decrements the pin count of a resident page.
    ///
    /// `is_dirty` is sticky: once set it is only cleared by a flush. Returns
    /// false if the page is not resident or its pin count is already zero.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let mut state = self.inner.state.lock();
        let frame_id = match state.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => {
                error!(%page_id, "unpin of a page not in the frame table");
                return false;
            }
        };

        let meta = &mut state.meta[frame_id];
        if is_dirty {
            meta.is_dirty = true;
        }
        if meta.pin_count == 0 {
            error!(%page_id, "pin count underflow");
            return false;
        }
        meta.pin_count -= 1;
        if meta.pin_count == 0 {
            state.replacer.unpin(frame_id);
        }
        self.inner.check_invariants(&state);
        true
    }

    /// Writes a resident page's bytes to disk and clears its dirty flag.
    ///
    /// Pinned pages may be flushed; the write is a snapshot of the current
    /// bytes and is not atomic with concurrent writers. Returns false if the
    /// page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> StorageResult<bool> {
        let mut state = self.inner.state.lock();
        let frame_id = match state.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return Ok(false),
        };

        // SAFETY: residency is stable while the state mutex is held. A
        // concurrent write guard may race on the bytes; the flush contract
        // is a point-in-time snapshot.
        let buf = unsafe { &**self.inner.frames[frame_id].data.get() };
        self.inner.disk.lock().write_page(page_id, buf)?;
        state.meta[frame_id].is_dirty = false;
        Ok(true)
    }

    /// Flushes every resident page. Idempotent when no writes intervene.
    pub fn flush_all_pages(&self) -> StorageResult<()> {
        let resident: Vec<PageId> = {
            let state = self.inner.state.lock();
            state
                .meta
                .iter()
                .filter(|meta| meta.page_id.is_valid())
                .map(|meta| meta.page_id)
                .collect()
        };

        // Per-page atomicity only; each flush re-takes the pool mutex.
        for page_id in resident {
            self.flush_page(page_id)?;
        }
        Ok(())
    }

    /// Drops a page from the pool, returning its frame to the free list.
    ///
    /// Succeeds trivially if the page is not resident. Returns false (and
    /// changes nothing) if the page is pinned. The page's disk blocks are
    /// not reclaimed; page numbers are never reissued.
    pub fn delete_page(&self, page_id: PageId) -> bool {
        let mut state = self.inner.state.lock();
        let frame_id = match state.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return true,
        };
        if state.meta[frame_id].pin_count > 0 {
            return false;
        }

        state.page_table.remove(&page_id);
        // The frame was evictable; it must leave the replacer's set before
        // joining the free list.
        state.replacer.pin(frame_id);
        state.meta[frame_id].reset();
        // SAFETY: pin count is zero and the page is no longer mapped, so no
        // guard references this frame.
        unsafe { (**self.inner.frames[frame_id].data.get()).fill(0) };
        state.free_list.push_back(frame_id);

        self.inner.check_invariants(&state);
        true
    }

    /// Returns the number of frames in the buffer pool.
    pub fn pool_size(&self) -> usize {
        self.inner.pool_size
    }

    /// Returns the number of pages currently resident.
    pub fn resident_count(&self) -> usize {
        self.inner.state.lock().page_table.len()
    }
}

impl BufferPoolInner {
    /// Looks up or loads `page_id`, returning its frame with the pin count
    /// already incremented.
    fn fetch_frame(&self, page_id: PageId, operation: &'static str) -> StorageResult<FrameId> {
        debug_assert!(page_id.is_valid(), "fetch of invalid page id");
        if !page_id.is_valid() {
            return Err(StorageError::InvalidPageId { operation });
        }

        let mut state = self.state.lock();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            state.meta[frame_id].pin_count += 1;
            state.replacer.pin(frame_id);
            return Ok(frame_id);
        }

        let frame_id = self.allocate_frame(&mut state)?;
        state.replacer.pin(frame_id);

        let stale = state.meta[frame_id].page_id;
        if stale.is_valid() {
            state.page_table.remove(&stale);
        }
        state.page_table.insert(page_id, frame_id);

        let meta = &mut state.meta[frame_id];
        meta.page_id = page_id;
        meta.pin_count = 1;
        meta.is_dirty = false;

        // SAFETY: the frame came off the free list or was evicted with a
        // zero pin count; no guard references it and the state mutex is held.
        let buf = unsafe { &mut **self.frames[frame_id].data.get() };
        if let Err(e) = self.disk.lock().read_page(page_id, buf) {
            // Roll back to the pre-call state: the mapping is undone and the
            // frame rejoins the free list zeroed.
            state.page_table.remove(&page_id);
            state.meta[frame_id].reset();
            buf.fill(0);
            state.free_list.push_back(frame_id);
            return Err(e);
        }

        self.check_invariants(&state);
        Ok(frame_id)
    }

    /// Pops a free frame, or evicts a victim (writing it back if dirty).
    /// The returned frame's buffer is zeroed and its metadata still carries
    /// the victim's page id; the caller fixes up the frame table.
    fn allocate_frame(&self, state: &mut PoolState) -> StorageResult<FrameId> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = state
            .replacer
            .evict()
            .ok_or(StorageError::FrameExhausted {
                pool_size: self.pool_size,
            })?;

        let victim = state.meta[frame_id];
        debug_assert_eq!(victim.pin_count, 0, "evicted a pinned frame");
        debug_assert!(victim.page_id.is_valid(), "evicted a non-resident frame");

        if victim.is_dirty {
            // SAFETY: pin count is zero, so no guard references the bytes.
            let buf = unsafe { &**self.frames[frame_id].data.get() };
            if let Err(e) = self.disk.lock().write_page(victim.page_id, buf) {
                // The victim stays resident and evictable.
                state.replacer.unpin(frame_id);
                return Err(e);
            }
        }
        debug!(victim = %victim.page_id, frame_id, "evicting frame");

        // SAFETY: as above.
        unsafe { (**self.frames[frame_id].data.get()).fill(0) };
        Ok(frame_id)
    }

    /// Unpin driven by guard release; `mark_dirty` is sticky.
    fn unpin_frame(&self, frame_id: FrameId, mark_dirty: bool) {
        let mut state = self.state.lock();
        let meta = &mut state.meta[frame_id];
        if mark_dirty {
            meta.is_dirty = true;
        }
        if meta.pin_count == 0 {
            error!(frame_id, "pin count underflow on guard release");
            return;
        }
        meta.pin_count -= 1;
        if meta.pin_count == 0 {
            state.replacer.unpin(frame_id);
        }
    }

    #[cfg(debug_assertions)]
    fn check_invariants(&self, state: &PoolState) {
        assert_eq!(
            state.free_list.len() + state.page_table.len(),
            self.pool_size,
            "free list and frame table must partition the frames"
        );
        for (&page_id, &frame_id) in &state.page_table {
            assert_eq!(state.meta[frame_id].page_id, page_id);
            assert!(!state.free_list.contains(&frame_id));
        }
        for &frame_id in &state.free_list {
            assert!(!state.meta[frame_id].page_id.is_valid());
            assert_eq!(state.meta[frame_id].pin_count, 0);
        }
        let evictable = state
            .meta
            .iter()
            .filter(|m| m.page_id.is_valid() && m.pin_count == 0)
            .count();
        assert_eq!(state.replacer.size(), evictable);
    }

    #[cfg(not(debug_assertions))]
    fn check_invariants(&self, _state: &PoolState) {}
}

/// Pin-only handle to a resident page. Dropping it releases the pin.
///
/// Holds no latch: the bytes it exposes may race with a concurrent write
/// guard. Callers that need isolation use the latched fetch variants.
/// Dropping the guard is the explicit early release; a moved-from guard
/// cannot be dropped twice.
pub struct BasicPageGuard {
    inner: Arc<BufferPoolInner>,
    frame_id: FrameId,
    page_id: PageId,
}

impl BasicPageGuard {
    pub fn page_id(&self) -> PageId {
        self.page_id
    }
}

impl Deref for BasicPageGuard {
    type Target = [u8; PAGE_SIZE];

    fn deref(&self) -> &Self::Target {
        unsafe { &**self.inner.frames[self.frame_id].data.get() }
    }
}

impl Drop for BasicPageGuard {
    fn drop(&mut self) {
        self.inner.unpin_frame(self.frame_id, false);
    }
}

unsafe impl Send for BasicPageGuard {}

/// Shared-latched handle: a pin plus the page's reader latch.
///
/// Drop order is latch, then pin.
pub struct PageReadGuard {
    inner: Arc<BufferPoolInner>,
    frame_id: FrameId,
    page_id: PageId,
}

impl PageReadGuard {
    pub fn page_id(&self) -> PageId {
        self.page_id
    }
}

impl Deref for PageReadGuard {
    type Target = [u8; PAGE_SIZE];

    fn deref(&self) -> &Self::Target {
        unsafe { &**self.inner.frames[self.frame_id].data.get() }
    }
}

impl Drop for PageReadGuard {
    fn drop(&mut self) {
        // SAFETY: this guard holds the shared latch it acquired at fetch.
        unsafe { self.inner.frames[self.frame_id].latch.unlock_shared() };
        self.inner.unpin_frame(self.frame_id, false);
    }
}

unsafe impl Send for PageReadGuard {}

/// Exclusive-latched handle: a pin plus the page's writer latch.
///
/// Mutable access marks the page dirty; the flag is applied at unpin.
pub struct PageWriteGuard {
    inner: Arc<BufferPoolInner>,
    frame_id: FrameId,
    page_id: PageId,
    dirty: bool,
}

impl PageWriteGuard {
    pub fn page_id(&self) -> PageId {
        self.page_id
    }
}

impl Deref for PageWriteGuard {
    type Target = [u8; PAGE_SIZE];

    fn deref(&self) -> &Self::Target {
        unsafe { &**self.inner.frames[self.frame_id].data.get() }
    }
}

impl DerefMut for PageWriteGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.dirty = true;
        unsafe { &mut **self.inner.frames[self.frame_id].data.get() }
    }
}

impl Drop for PageWriteGuard {
    fn drop(&mut self) {
        // SAFETY: this guard holds the exclusive latch it acquired at fetch.
        unsafe { self.inner.frames[self.frame_id].latch.unlock_exclusive() };
        self.inner.unpin_frame(self.frame_id, self.dirty);
    }
}

unsafe impl Send for PageWriteGuard {}
