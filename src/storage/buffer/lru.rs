use super::replacer::{FrameId, Replacer};
use std::collections::{HashMap, VecDeque};

/// LRU replacement: evicts the frame that became evictable the longest ago.
/// Drop-in alternative to `RandomReplacer`; trivially deterministic.
#[derive(Debug)]
pub struct LruReplacer {
    /// Queue of evictable frames (least recently used at front)
    lru_list: VecDeque<FrameId>,
    /// Map to track position in LRU list for O(1) membership checks
    frame_map: HashMap<FrameId, usize>,
}

impl LruReplacer {
    pub fn new(capacity: usize) -> Self {
        Self {
            lru_list: VecDeque::with_capacity(capacity),
            frame_map: HashMap::with_capacity(capacity),
        }
    }

    fn update_indices(&mut self) {
        for (idx, &frame_id) in self.lru_list.iter().enumerate() {
            self.frame_map.insert(frame_id, idx);
        }
    }
}

impl Replacer for LruReplacer {
    fn evict(&mut self) -> Option<FrameId> {
        if let Some(frame_id) = self.lru_list.pop_front() {
            self.frame_map.remove(&frame_id);
            self.update_indices();
            Some(frame_id)
        } else {
            None
        }
    }

    fn pin(&mut self, frame_id: FrameId) {
        if let Some(&idx) = self.frame_map.get(&frame_id) {
            self.lru_list.remove(idx);
            self.frame_map.remove(&frame_id);
            self.update_indices();
        }
    }

    fn unpin(&mut self, frame_id: FrameId) {
        if !self.frame_map.contains_key(&frame_id) {
            self.lru_list.push_back(frame_id);
            self.frame_map.insert(frame_id, self.lru_list.len() - 1);
        }
    }

    fn size(&self) -> usize {
        self.lru_list.len()
    }
}
