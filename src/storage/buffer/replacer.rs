use std::fmt::Debug;

pub type FrameId = usize;

/// Eviction policy over the set of evictable frames.
///
/// A frame is evictable iff it is resident with a zero pin count. The buffer
/// pool keeps the set current: frames leave on `pin`, enter on `unpin`, and
/// are removed by a successful `evict`.
pub trait Replacer: Send + Debug {
    /// Select and remove a frame from the evictable set. Returns None if
    /// no frame can be evicted.
    fn evict(&mut self) -> Option<FrameId>;

    /// Mark a frame as pinned (not evictable). Idempotent.
    fn pin(&mut self, frame_id: FrameId);

    /// Mark a frame as unpinned (evictable). Idempotent.
    fn unpin(&mut self, frame_id: FrameId);

    /// Get the number of evictable frames.
    fn size(&self) -> usize;
}
