use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::common::{FrameId, Timestamp};

/// Tracks access history for a single frame
#[derive(Debug)]
struct LruKNode {
    /// History of access timestamps (most recent at back)
    history: VecDeque<Timestamp>,
    /// Whether this frame is currently evictable
    is_evictable: bool,
}

impl LruKNode {
    fn new() -> Self {
        Self {
            history: VecDeque::new(),
            is_evictable: false,
        }
    }

    /// Records an access at the given timestamp, keeping only the last k
    fn record_access(&mut self, timestamp: Timestamp, k: usize) {
        self.history.push_back(timestamp);
        while self.history.len() > k {
            self.history.pop_front();
        }
    }

    /// Returns the backward k-distance from the current timestamp.
    /// Returns None if this frame has fewer than k accesses (+inf distance).
    fn k_distance(&self, now: Timestamp, k: usize) -> Option<Timestamp> {
        if self.history.len() < k {
            None
        } else {
            Some(now - self.history.front().copied().unwrap_or(0))
        }
    }

    /// Returns the most recent access timestamp.
    fn last_access(&self) -> Option<Timestamp> {
        self.history.back().copied()
    }

    /// Returns the oldest retained access timestamp.
    fn oldest_access(&self) -> Option<Timestamp> {
        self.history.front().copied()
    }
}

/// State guarded by the replacer's single internal lock
struct ReplacerState {
    nodes: HashMap<FrameId, LruKNode>,
    now: Timestamp,
    evictable_count: usize,
}

/// LRU-K replacement policy
///
/// The replacer evicts the frame whose backward k-distance (the time since
/// its k-th most recent access) is the largest. Frames with fewer than k
/// recorded accesses have +inf backward k-distance and are always preferred
/// as victims; among those, plain LRU applies - the frame whose most recent
/// access is oldest goes first.
pub struct LruKReplacer {
    /// K value for the LRU-K algorithm
    k: usize,
    /// Maximum number of frames the replacer can track
    capacity: usize,
    /// All mutable state, serialised under one lock
    state: Mutex<ReplacerState>,
}

impl LruKReplacer {
    /// Creates a new LRU-K replacer with the given k value and capacity.
    pub fn new(k: usize, capacity: usize) -> Self {
        assert!(k >= 1, "LRU-K requires k >= 1");
        Self {
            k,
            capacity,
            state: Mutex::new(ReplacerState {
                nodes: HashMap::new(),
                now: 0,
                evictable_count: 0,
            }),
        }
    }

    /// Evicts the frame with the largest backward k-distance.
    /// Returns None if there are no evictable frames.
    pub fn evict(&self) -> Option<FrameId> {
        let mut state = self.state.lock();

        if state.evictable_count == 0 {
            return None;
        }

        let now = state.now;
        let mut victim: Option<FrameId> = None;
        let mut victim_last: Timestamp = Timestamp::MAX;
        let mut victim_dist: Timestamp = 0;
        let mut victim_oldest: Timestamp = Timestamp::MAX;
        let mut found_inf = false;

        for (&frame_id, node) in state.nodes.iter() {
            if !node.is_evictable {
                continue;
            }

            match node.k_distance(now, self.k) {
                // Under-sampled: +inf distance, LRU among themselves
                None => {
                    let last = node.last_access().unwrap_or(0);
                    if !found_inf || last < victim_last {
                        victim = Some(frame_id);
                        victim_last = last;
                        found_inf = true;
                    }
                }
                // Fully sampled: only considered when no +inf node exists
                Some(dist) => {
                    if found_inf {
                        continue;
                    }
                    let oldest = node.oldest_access().unwrap_or(0);
                    let better = match victim {
                        None => true,
                        Some(_) => {
                            dist > victim_dist || (dist == victim_dist && oldest < victim_oldest)
                        }
                    };
                    if better {
                        victim = Some(frame_id);
                        victim_dist = dist;
                        victim_oldest = oldest;
                    }
                }
            }
        }

        if let Some(frame_id) = victim {
            state.nodes.remove(&frame_id);
            state.evictable_count -= 1;
        }

        victim
    }

    /// Records that the given frame was accessed now.
    /// Creates the node on first touch; a node never stores more than k
    /// timestamps.
    pub fn record_access(&self, frame_id: FrameId) {
        if frame_id.as_usize() >= self.capacity {
            return;
        }

        let mut state = self.state.lock();
        state.now += 1;
        let now = state.now;
        let k = self.k;

        state
            .nodes
            .entry(frame_id)
            .or_insert_with(LruKNode::new)
            .record_access(now, k);
    }

    /// Sets whether a frame is evictable. Idempotent; a frame the replacer
    /// has never seen is left untouched.
    pub fn set_evictable(&self, frame_id: FrameId, is_evictable: bool) {
        let mut state = self.state.lock();

        let Some(node) = state.nodes.get_mut(&frame_id) else {
            return;
        };
        if node.is_evictable != is_evictable {
            node.is_evictable = is_evictable;
            if is_evictable {
                state.evictable_count += 1;
            } else {
                state.evictable_count -= 1;
            }
        }
    }

    /// Removes a frame from the replacer entirely. A no-op if the frame is
    /// not tracked.
    ///
    /// Panics if the frame is tracked but not evictable: eviction is the
    /// only sanctioned path out of the replacer, so removing a frame that
    /// could never be picked is a caller bug.
    pub fn remove(&self, frame_id: FrameId) {
        let mut state = self.state.lock();

        let Some(node) = state.nodes.get(&frame_id) else {
            return;
        };
        assert!(
            node.is_evictable,
            "remove called on non-evictable frame {frame_id}"
        );
        state.nodes.remove(&frame_id);
        state.evictable_count -= 1;
    }

    /// Returns the number of evictable frames.
    pub fn size(&self) -> usize {
        self.state.lock().evictable_count
    }

    /// Returns the k value of this replacer.
    pub fn k(&self) -> usize {
        self.k
    }
}
