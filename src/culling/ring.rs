//! Frame ring
//!
//! Per-frame data lines live in a fixed array of slots. The cursor advances
//! once per frame; the previous slot holds last frame's final visible set and
//! is only ever read, never written, by the current frame.

/// Ring depth for per-frame data lines
pub const RING_DEPTH: usize = 8;

/// Slot indices handed to the passes of one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSlots {
    /// Slot written by this frame
    pub current: usize,
    /// Slot holding last frame's visible set
    pub previous: usize,
    /// Non-zero stamp identifying this frame in the tracking buffer
    pub stamp: u32,
}

/// Modulo cursor over `N` slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingCursor<const N: usize> {
    current: usize,
    stamp: u32,
}

impl<const N: usize> Default for RingCursor<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> RingCursor<N> {
    pub const fn new() -> Self {
        Self {
            current: 0,
            stamp: 1,
        }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn previous(&self) -> usize {
        (self.current + N - 1) % N
    }

    pub fn slots(&self) -> FrameSlots {
        FrameSlots {
            current: self.current,
            previous: self.previous(),
            stamp: self.stamp,
        }
    }

    /// Move to the next slot; the stamp skips zero on wrap
    pub fn advance(&mut self) {
        self.current = (self.current + 1) % N;
        self.stamp = self.stamp.wrapping_add(1).max(1);
    }
}

/// Fixed array of per-frame slots indexed by a [`RingCursor`]
#[derive(Debug)]
pub struct FrameRing<T, const N: usize = RING_DEPTH> {
    slots: [T; N],
}

impl<T, const N: usize> FrameRing<T, N> {
    pub fn from_fn(f: impl FnMut(usize) -> T) -> Self {
        Self {
            slots: std::array::from_fn(f),
        }
    }

    pub fn slot(&self, index: usize) -> &T {
        &self.slots[index % N]
    }

    pub fn slot_mut(&mut self, index: usize) -> &mut T {
        &mut self.slots[index % N]
    }

    /// Mutable current slot together with the read-only previous slot
    pub fn split(&mut self, slots: FrameSlots) -> (&mut T, &T) {
        assert_ne!(slots.current, slots.previous, "ring depth must be at least 2");
        let (current, previous) = (slots.current % N, slots.previous % N);
        if current < previous {
            let (head, tail) = self.slots.split_at_mut(previous);
            (&mut head[current], &tail[0])
        } else {
            let (head, tail) = self.slots.split_at_mut(current);
            (&mut tail[0], &head[previous])
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.slots.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.slots.iter_mut()
    }

    pub const fn depth(&self) -> usize {
        N
    }
}
