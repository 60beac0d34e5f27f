use std::sync::Arc;

use parking_lot::RwLock;

use crate::common::{CacheKey, FrameId, FRAME_SIZE};

/// Byte storage of a single frame: a fixed-capacity buffer plus the length
/// of valid bytes.
pub struct FrameData {
    buf: Box<[u8; FRAME_SIZE]>,
    len: usize,
}

impl FrameData {
    fn new() -> Self {
        Self {
            buf: Box::new([0u8; FRAME_SIZE]),
            len: 0,
        }
    }

    /// Returns the valid bytes of the frame.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Frame manages a single fixed-size buffer slot in the response cache.
/// It stores the cached bytes and the cache key currently mapped to it.
pub struct Frame {
    /// The frame ID (index in the frame pool)
    frame_id: FrameId,
    /// The cache key stored in this frame (None if empty)
    key: RwLock<Option<CacheKey>>,
    /// The cached response bytes (pub(crate) for frame view access)
    pub(crate) data: RwLock<FrameData>,
}

impl Frame {
    /// Creates a new empty Frame for the given frame ID.
    pub fn new(frame_id: FrameId) -> Self {
        Self {
            frame_id,
            key: RwLock::new(None),
            data: RwLock::new(FrameData::new()),
        }
    }

    /// Returns the frame ID.
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// Returns the cache key stored in this frame.
    pub fn key(&self) -> Option<CacheKey> {
        self.key.read().clone()
    }

    /// Sets the cache key stored in this frame.
    pub fn set_key(&self, key: Option<CacheKey>) {
        *self.key.write() = key;
    }

    /// Copies up to [`FRAME_SIZE`] bytes into the frame and records the
    /// written length. Longer inputs are truncated.
    pub fn write(&self, bytes: &[u8]) {
        let n = bytes.len().min(FRAME_SIZE);
        let mut guard = self.data.write();
        guard.buf[..n].copy_from_slice(&bytes[..n]);
        guard.len = n;
    }

    /// Returns the length of valid bytes in the frame.
    pub fn len(&self) -> usize {
        self.data.read().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resets the frame to its initial state: no key, zeroed buffer.
    pub fn reset(&self) {
        *self.key.write() = None;
        let mut guard = self.data.write();
        guard.buf.fill(0);
        guard.len = 0;
    }
}

/// FramePool owns every frame for the process lifetime. Frames are
/// allocated once at startup and addressed by [`FrameId`]; their buffers
/// are reused across cache keys but never reallocated.
pub struct FramePool {
    frames: Vec<Arc<Frame>>,
}

impl FramePool {
    /// Creates a pool of `count` zeroed frames.
    pub fn new(count: usize) -> Self {
        let frames = (0..count)
            .map(|i| Arc::new(Frame::new(FrameId::new(i as u32))))
            .collect();
        Self { frames }
    }

    /// Returns the frame for the given id.
    ///
    /// Panics if the id is out of range; ids are produced by this pool and
    /// the replacer, so an out-of-range id is a bookkeeping bug.
    pub fn get(&self, frame_id: FrameId) -> &Arc<Frame> {
        &self.frames[frame_id.as_usize()]
    }

    /// Returns the number of frames in the pool.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
