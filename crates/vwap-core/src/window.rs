//! Fixed-capacity FIFO ring buffer.
//!
//! [`SlidingWindow`] keeps at most `capacity` items. Pushing into a full
//! window overwrites the oldest item; popping from an empty window is a
//! contract violation and panics.
//!
//! # Layout
//!
//! ```text
//!            start              start + len
//!              │                     │
//!   slots: [ · │ a │ b │ c │ d │ · ]  (indices wrap modulo capacity)
//! ```
//!
//! All methods take `&self`; the ring is guarded by an internal mutex so the
//! window can be shared, although its one real caller (the VWAP calculator)
//! already serializes access.

use parking_lot::Mutex;

struct Ring<T> {
    slots: Vec<Option<T>>,
    start: usize,
    len: usize,
}

impl<T> Ring<T> {
    #[inline]
    fn capacity(&self) -> usize {
        self.slots.len()
    }
}

/// A thread-safe bounded FIFO with overwrite-oldest semantics.
pub struct SlidingWindow<T> {
    ring: Mutex<Ring<T>>,
}

impl<T> SlidingWindow<T> {
    /// Create a window holding at most `capacity` items.
    ///
    /// # Panics
    ///
    /// If `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "sliding window capacity must be at least 1");
        let slots = std::iter::repeat_with(|| None).take(capacity).collect();
        Self { ring: Mutex::new(Ring { slots, start: 0, len: 0 }) }
    }

    /// Append `item` at the logical end, overwriting the oldest item when full.
    ///
    /// # Panics
    ///
    /// On an unallocated window (see [`Default`]).
    pub fn push_back(&self, item: T) {
        let mut ring = self.ring.lock();
        let cap = ring.capacity();
        assert!(cap > 0, "push_back on an unallocated sliding window");

        let end = (ring.start + ring.len) % cap;
        ring.slots[end] = Some(item);
        if ring.len == cap {
            ring.start = (ring.start + 1) % cap;
        } else {
            ring.len += 1;
        }
    }

    /// Remove and return the oldest item.
    ///
    /// # Panics
    ///
    /// If the window is empty. Callers must check [`len`](Self::len) first.
    pub fn pop_front(&self) -> T {
        let mut ring = self.ring.lock();
        if ring.len == 0 {
            panic!("pop_front called on an empty sliding window");
        }
        let start = ring.start;
        let item = match ring.slots[start].take() {
            Some(item) => item,
            None => unreachable!("occupied slot {start} is empty"),
        };
        ring.start = (start + 1) % ring.capacity();
        ring.len -= 1;
        item
    }

    /// Number of items currently held. Zero for an unallocated window.
    pub fn len(&self) -> usize {
        self.ring.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.ring.lock().capacity()
    }

    pub fn is_full(&self) -> bool {
        let ring = self.ring.lock();
        ring.capacity() > 0 && ring.len == ring.capacity()
    }
}

impl<T: Clone> SlidingWindow<T> {
    /// The oldest item, if any, without removing it.
    pub fn front(&self) -> Option<T> {
        let ring = self.ring.lock();
        if ring.len == 0 {
            return None;
        }
        ring.slots[ring.start].clone()
    }

    /// Copy of the contents in FIFO order (oldest first).
    #[cfg(test)]
    pub(crate) fn to_vec(&self) -> Vec<T> {
        let ring = self.ring.lock();
        let cap = ring.capacity();
        (0..ring.len)
            .filter_map(|i| ring.slots[(ring.start + i) % cap].clone())
            .collect()
    }
}

/// An unallocated window: capacity 0, length 0. Only useful as a placeholder;
/// pushing into it panics.
impl<T> Default for SlidingWindow<T> {
    fn default() -> Self {
        Self { ring: Mutex::new(Ring { slots: Vec::new(), start: 0, len: 0 }) }
    }
}

impl<T> std::fmt::Debug for SlidingWindow<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ring = self.ring.lock();
        f.debug_struct("SlidingWindow")
            .field("capacity", &ring.capacity())
            .field("len", &ring.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_up_to_capacity() {
        let w = SlidingWindow::new(3);
        for (i, v) in [1, 2, 3].into_iter().enumerate() {
            w.push_back(v);
            assert_eq!(w.len(), i + 1);
        }
        assert!(w.is_full());
        assert_eq!(w.to_vec(), vec![1, 2, 3]);
    }

    #[test]
    fn overflow_keeps_most_recent_in_fifo_order() {
        for cap in 1..=4 {
            let w = SlidingWindow::new(cap);
            for v in 1..=6 {
                w.push_back(v);
            }
            assert_eq!(w.len(), cap);
            let expected: Vec<i32> = (7 - cap as i32..=6).collect();
            let popped: Vec<i32> = (0..cap).map(|_| w.pop_front()).collect();
            assert_eq!(popped, expected, "capacity {cap}");
            assert!(w.is_empty());
        }
    }

    #[test]
    fn pop_then_push_wraps_indices() {
        let w = SlidingWindow::new(2);
        w.push_back("a");
        w.push_back("b");
        assert_eq!(w.pop_front(), "a");
        w.push_back("c");
        assert_eq!(w.front(), Some("b"));
        assert_eq!(w.to_vec(), vec!["b", "c"]);
        assert_eq!(w.pop_front(), "b");
        assert_eq!(w.pop_front(), "c");
        assert_eq!(w.front(), None);
    }

    #[test]
    #[should_panic(expected = "empty sliding window")]
    fn pop_front_on_empty_panics() {
        let w: SlidingWindow<u32> = SlidingWindow::new(4);
        w.pop_front();
    }

    #[test]
    #[should_panic(expected = "empty sliding window")]
    fn pop_front_after_draining_panics() {
        let w = SlidingWindow::new(1);
        w.push_back(7u8);
        w.pop_front();
        w.pop_front();
    }

    #[test]
    #[should_panic(expected = "capacity must be at least 1")]
    fn zero_capacity_is_rejected() {
        let _ = SlidingWindow::<u8>::new(0);
    }

    #[test]
    fn unallocated_window_reports_zero() {
        let w: SlidingWindow<String> = SlidingWindow::default();
        assert_eq!(w.len(), 0);
        assert_eq!(w.capacity(), 0);
        assert!(w.is_empty());
        assert!(!w.is_full());
        assert_eq!(w.front(), None);
    }

    #[test]
    fn concurrent_pushes_are_serialized() {
        use std::sync::Arc;

        let w = Arc::new(SlidingWindow::new(64));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let w = Arc::clone(&w);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        w.push_back(t * 1000 + i);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(w.len(), 64);
        assert_eq!(w.to_vec().len(), 64);
    }
}
