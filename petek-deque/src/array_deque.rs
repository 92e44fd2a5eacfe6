//! A bounded wait-free double-ended queue over a slot ring.
//!
//! Both ends are driven by independent monotonic counters reduced modulo the
//! (power-of-two) capacity: the front counter starts at zero and grows on
//! front-pushes, the back counter starts at `capacity - 1` and shrinks on
//! back-pushes. An admission counter bounds occupancy before any slot is
//! touched, so a full deque is rejected without scanning the ring.
//!
//! The counters are sequence numbers, not occupancy indices: a take steps
//! its counter even when the targeted slot turns out to be empty, and a
//! contended add can find its slot still occupied. Both cases are reported
//! to the caller as ordinary failures.

use std::sync::atomic::{AtomicIsize, Ordering};

use petek::bucket;
use petek::{Bucket, CacheAligned};

/// A fixed-capacity wait-free MPMC deque.
///
/// Capacity is rounded up to the next power of two. All operations do
/// bounded work; a failure (full or empty) is returned, never retried
/// internally.
pub struct ArrayDeque<T> {
    /// The slot ring backing both ends.
    entries: Bucket<T>,

    /// Monotonic front counter. Grows on `add_front`, shrinks on
    /// `try_take_front`.
    index_front: CacheAligned<AtomicIsize>,

    /// Monotonic back counter. Shrinks on `add_back`, grows on
    /// `try_take_back`.
    index_back: CacheAligned<AtomicIsize>,

    /// Admission counter: an upper bound on occupied slots, stepped before
    /// any slot insert is attempted.
    pre_count: CacheAligned<AtomicIsize>,

    /// A mask for ring positions.
    mask: isize,
}

impl<T: 'static> ArrayDeque<T> {
    /// Creates a new bounded deque with the given capacity.
    ///
    /// The capacity will be rounded up to the next power of two.
    pub fn new(capacity: usize) -> ArrayDeque<T> {
        let entries = Bucket::new(capacity);
        let capacity = entries.capacity() as isize;

        ArrayDeque {
            entries,
            index_front: CacheAligned::new(AtomicIsize::new(0)),
            index_back: CacheAligned::new(AtomicIsize::new(capacity - 1)),
            pre_count: CacheAligned::new(AtomicIsize::new(0)),
            mask: capacity - 1,
        }
    }

    /// Returns the capacity of the deque.
    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    /// Returns the number of stored values.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the deque holds no values.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reduces a monotonic counter to a ring position. Two's complement
    /// masking keeps negative counters in range.
    #[inline]
    fn position(&self, counter: isize) -> usize {
        (counter & self.mask) as usize
    }

    /// Claims admission for one value. The admission counter stays an upper
    /// bound on occupancy: a rejected claim is released immediately.
    fn admit(&self) -> bool {
        let admitted = self.pre_count.fetch_add(1, Ordering::SeqCst) + 1;
        if admitted > self.capacity() as isize {
            self.pre_count.fetch_sub(1, Ordering::SeqCst);
            return false;
        }
        true
    }

    /// Claims admission for `n` values up front, before the deque is shared.
    /// The claims are spent by [`ArrayDeque::add_front_reserved`].
    pub(crate) fn reserve(&self, n: usize) {
        self.pre_count.fetch_add(n as isize, Ordering::SeqCst);
    }

    /// Permanently rejects further admissions. Takes are unaffected.
    pub(crate) fn close(&self) {
        self.pre_count
            .fetch_add(self.capacity() as isize + 1, Ordering::SeqCst);
    }
}

impl<T: Clone + 'static> ArrayDeque<T> {
    /// Pushes a value onto the front of the deque.
    ///
    /// Hands the value back when the deque is full, or when the claimed ring
    /// position is still occupied by a contended older value.
    pub fn add_front(&self, value: T) -> Result<(), T> {
        if !self.admit() {
            return Err(value);
        }
        let index = self.index_front.fetch_add(1, Ordering::SeqCst);
        match self.entries.insert(self.position(index), value) {
            Ok(()) => Ok(()),
            Err(occupied) => {
                self.pre_count.fetch_sub(1, Ordering::SeqCst);
                Err(occupied.value)
            }
        }
    }

    /// Pushes a value onto the back of the deque.
    pub fn add_back(&self, value: T) -> Result<(), T> {
        if !self.admit() {
            return Err(value);
        }
        let index = self.index_back.fetch_sub(1, Ordering::SeqCst);
        match self.entries.insert(self.position(index), value) {
            Ok(()) => Ok(()),
            Err(occupied) => {
                self.pre_count.fetch_sub(1, Ordering::SeqCst);
                Err(occupied.value)
            }
        }
    }

    /// Pushes a value onto the front against an admission claimed earlier
    /// with [`ArrayDeque::reserve`]. A failed slot insert keeps the claim,
    /// so the caller can retry without re-admitting.
    pub(crate) fn add_front_reserved(&self, value: T) -> Result<(), T> {
        let index = self.index_front.fetch_add(1, Ordering::SeqCst);
        match self.entries.insert(self.position(index), value) {
            Ok(()) => Ok(()),
            Err(occupied) => Err(occupied.value),
        }
    }

    /// Pops a value from the front of the deque.
    ///
    /// The front counter is stepped even when the targeted slot is empty;
    /// the admission counter is only released on success.
    pub fn try_take_front(&self) -> Option<T> {
        let index = self.index_front.fetch_sub(1, Ordering::SeqCst) - 1;
        let value = self.entries.remove(self.position(index))?;
        self.pre_count.fetch_sub(1, Ordering::SeqCst);
        Some(value)
    }

    /// Pops a value from the back of the deque.
    pub fn try_take_back(&self) -> Option<T> {
        let index = self.index_back.fetch_add(1, Ordering::SeqCst) + 1;
        let value = self.entries.remove(self.position(index))?;
        self.pre_count.fetch_sub(1, Ordering::SeqCst);
        Some(value)
    }

    /// Returns a clone of the front value without removing it.
    pub fn try_peek_front(&self) -> Option<T> {
        let index = self.index_front.load(Ordering::Acquire) - 1;
        self.entries.try_get(self.position(index))
    }

    /// Returns a clone of the back value without removing it.
    pub fn try_peek_back(&self) -> Option<T> {
        let index = self.index_back.load(Ordering::Acquire) + 1;
        self.entries.try_get(self.position(index))
    }

    /// Returns a clone of the front value.
    ///
    /// # Panics
    ///
    /// Panics if the front slot is empty.
    pub fn peek_front(&self) -> T {
        match self.try_peek_front() {
            Some(value) => value,
            None => panic!("peek_front on an empty deque"),
        }
    }

    /// Returns a clone of the back value.
    ///
    /// # Panics
    ///
    /// Panics if the back slot is empty.
    pub fn peek_back(&self) -> T {
        match self.try_peek_back() {
            Some(value) => value,
            None => panic!("peek_back on an empty deque"),
        }
    }

    /// Returns a clone of the value at the given ring position, if any.
    pub fn try_get(&self, index: usize) -> Option<T> {
        self.entries.try_get(index)
    }

    /// Returns an iterator over occupied ring positions in index order.
    ///
    /// The iteration is snapshot-free and yields values in ring order, which
    /// is not the insertion order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            inner: self.entries.iter(),
        }
    }
}

/// Iterator over the values of an [`ArrayDeque`].
pub struct Iter<'a, T> {
    inner: bucket::Iter<'a, T>,
}

impl<'a, T: Clone + 'static> Iterator for Iter<'a, T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, value)| value)
    }
}

impl<'a, T: Clone + 'static> IntoIterator for &'a ArrayDeque<T> {
    type Item = T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_rounds_up() {
        assert_eq!(ArrayDeque::<u32>::new(5).capacity(), 8);
        assert_eq!(ArrayDeque::<u32>::new(2).capacity(), 2);
    }

    #[test]
    fn test_admission_releases_on_reject() {
        let deque = ArrayDeque::new(2);
        assert!(deque.add_front("x").is_ok());
        assert!(deque.add_back("y").is_ok());
        assert!(deque.add_front("z").is_err());
        // The rejected admission was released, so a take reopens the deque.
        assert_eq!(deque.try_take_front(), Some("x"));
        assert!(deque.add_front("z").is_ok());
    }

    #[test]
    fn test_take_from_both_ends() {
        let deque = ArrayDeque::new(2);
        deque.add_front("x").unwrap();
        deque.add_back("y").unwrap();
        assert_eq!(deque.try_take_front(), Some("x"));
        assert_eq!(deque.try_take_back(), Some("y"));
        assert_eq!(deque.try_take_front(), None);
    }

    #[test]
    fn test_peek_reads_its_own_end() {
        let deque = ArrayDeque::new(4);
        deque.add_front("a").unwrap();
        deque.add_back("b").unwrap();
        assert_eq!(deque.peek_front(), "a");
        assert_eq!(deque.peek_back(), "b");
        assert_eq!(deque.len(), 2);
    }

    #[test]
    #[should_panic(expected = "peek_back on an empty deque")]
    fn test_peek_back_panics_on_empty() {
        let deque = ArrayDeque::<u32>::new(4);
        deque.peek_back();
    }

    #[test]
    fn test_front_end_is_lifo_single_threaded() {
        let deque = ArrayDeque::new(8);
        for i in 0..4 {
            deque.add_front(i).unwrap();
        }
        for i in (0..4).rev() {
            assert_eq!(deque.try_take_front(), Some(i));
        }
    }
}
