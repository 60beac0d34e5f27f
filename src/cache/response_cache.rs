use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::common::{CacheKey, FrameId, Result, ServerError};

use super::{FramePool, FrameView, LruKReplacer};

/// Map and free-list bookkeeping, guarded by the cache's reader-writer lock
struct CacheState {
    /// Maps each cached key to the frame holding its response bytes
    table: HashMap<CacheKey, FrameId>,
    /// Frames that are neither mapped nor being filled
    free_list: Vec<FrameId>,
}

/// ResponseCache maps normalised request paths to frames holding fully
/// encoded responses. It owns a fixed pool of frames and uses the LRU-K
/// replacement policy to decide which entry to evict when the pool is
/// exhausted.
///
/// Lookups take the state lock shared; installs and invalidations take it
/// exclusive. Frame bytes are filled outside the state lock, so a frame in
/// flight is in neither the table nor the free list until it is published.
pub struct ResponseCache {
    /// All frames, allocated once
    frames: FramePool,
    /// Key table and free list
    state: RwLock<CacheState>,
    /// LRU-K replacement policy over mapped frames
    replacer: LruKReplacer,
}

impl ResponseCache {
    /// Creates a cache with `frame_count` frames and LRU-`k` replacement.
    pub fn new(frame_count: usize, k: usize) -> Self {
        let free_list = (0..frame_count)
            .map(|i| FrameId::new(i as u32))
            .collect();

        Self {
            frames: FramePool::new(frame_count),
            state: RwLock::new(CacheState {
                table: HashMap::new(),
                free_list,
            }),
            replacer: LruKReplacer::new(k, frame_count),
        }
    }

    /// Looks up a key, recording an access on hit. The returned view stays
    /// valid until dropped; a concurrent refill of the frame waits for it.
    pub fn lookup(&self, key: &CacheKey) -> Option<FrameView> {
        let state = self.state.read();
        let &frame_id = state.table.get(key)?;

        self.replacer.record_access(frame_id);

        let frame = Arc::clone(self.frames.get(frame_id));
        // Safety: the Arc keeps the frame alive for the view's lifetime.
        Some(unsafe { FrameView::new(frame) })
    }

    /// Associates `key` with a frame holding `bytes` (truncated to the
    /// frame size). If the key is already present the existing entry wins
    /// and the new bytes are discarded.
    ///
    /// Returns `ServerError::CacheFull` when no frame is free and nothing
    /// is evictable; the caller serves the response uncached.
    pub fn install(&self, key: &CacheKey, bytes: &[u8]) -> Result<()> {
        {
            let state = self.state.read();
            if state.table.contains_key(key) {
                return Ok(());
            }
        }

        let frame_id = self.acquire_frame()?;
        let frame = self.frames.get(frame_id);

        // The frame is invisible to other threads here: not mapped, not
        // free, not yet tracked by the replacer.
        frame.reset();
        frame.write(bytes);
        frame.set_key(Some(key.clone()));

        {
            let mut state = self.state.write();
            if state.table.contains_key(key) {
                // Lost a racing fill; first writer wins.
                debug!(key = %key, "discarding losing install");
                frame.reset();
                state.free_list.push(frame_id);
                return Ok(());
            }
            state.table.insert(key.clone(), frame_id);
        }

        self.replacer.record_access(frame_id);
        self.replacer.set_evictable(frame_id, true);

        Ok(())
    }

    /// Best-effort removal of a cached entry. The frame returns to the
    /// free list; its bytes are cleared on reuse.
    pub fn invalidate(&self, key: &CacheKey) {
        let frame_id = {
            let mut state = self.state.write();
            let Some(frame_id) = state.table.remove(key) else {
                return;
            };
            state.free_list.push(frame_id);
            frame_id
        };

        self.frames.get(frame_id).set_key(None);
        self.replacer.remove(frame_id);
    }

    /// Returns the number of cached entries.
    pub fn len(&self) -> usize {
        self.state.read().table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if `key` is currently cached.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.state.read().table.contains_key(key)
    }

    /// Returns the number of frames on the free list.
    pub fn free_frames(&self) -> usize {
        self.state.read().free_list.len()
    }

    /// Returns the total number of frames.
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Returns the number of evictable frames tracked by the replacer.
    pub fn evictable_frames(&self) -> usize {
        self.replacer.size()
    }

    /// Takes a frame off the free list, or evicts a victim and unmaps its
    /// key.
    fn acquire_frame(&self) -> Result<FrameId> {
        let mut state = self.state.write();

        if let Some(frame_id) = state.free_list.pop() {
            return Ok(frame_id);
        }

        let frame_id = self.replacer.evict().ok_or(ServerError::CacheFull)?;
        if let Some(old_key) = self.frames.get(frame_id).key() {
            debug!(key = %old_key, %frame_id, "evicting cache entry");
            state.table.remove(&old_key);
        }

        Ok(frame_id)
    }
}
