use std::ops::Deref;
use std::sync::Arc;

use parking_lot::RwLockReadGuard;

use super::frame::{Frame, FrameData};

/// Read-only view of a frame's cached bytes, returned by a cache lookup.
///
/// The view holds the frame's data read lock for its lifetime, so the bytes
/// cannot be rewritten underneath it: any refill of the frame must take the
/// data write lock and blocks until every view is dropped.
pub struct FrameView {
    /// Read lock on the frame data (declared first so it drops before the Arc)
    guard: RwLockReadGuard<'static, FrameData>,
    /// Reference to the frame (kept alive for the guard's lifetime)
    _frame: Arc<Frame>,
}

impl FrameView {
    /// Creates a new FrameView over the given frame.
    /// # Safety
    /// The guard's lifetime is transmuted to `'static`; the caller must pass
    /// an `Arc` so the frame outlives the guard, which this struct enforces
    /// by holding the `Arc` alongside it.
    pub(crate) unsafe fn new(frame: Arc<Frame>) -> Self {
        let guard = frame.data.read();
        let guard: RwLockReadGuard<'static, FrameData> = std::mem::transmute(guard);

        Self {
            guard,
            _frame: frame,
        }
    }

    /// Returns the cached bytes.
    pub fn bytes(&self) -> &[u8] {
        self.guard.as_slice()
    }

    /// Returns the number of cached bytes.
    pub fn len(&self) -> usize {
        self.guard.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard.is_empty()
    }
}

impl Deref for FrameView {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.bytes()
    }
}
