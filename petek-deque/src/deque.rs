//! An unbounded lock-free deque with cooperative growth.
//!
//! The deque wraps a bounded [`ArrayDeque`] ring and doubles it when full.
//! Growth is a five-phase protocol driven by compare-and-swap on a single
//! status word; whichever threads observe a resize in flight help drive it
//! to completion instead of blocking. Entries are migrated from the old
//! ring to the new one by the helping threads while the structure stays
//! usable.
//!
//! Growth does not preserve ring positions or FIFO order across the resize
//! boundary. What it guarantees: every value added and not taken before the
//! resize began is present exactly once afterwards.

use std::sync::atomic::{AtomicIsize, AtomicUsize, Ordering};

use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use crossbeam_utils::Backoff;

use petek::CacheAligned;

use crate::array_deque::ArrayDeque;

/// No resize in flight; operations may complete directly.
pub(crate) const STATUS_STABLE: usize = 0;
/// A resize has been requested but has no owner yet.
pub(crate) const STATUS_RESIZE_REQUESTED: usize = 1;
/// A single thread is allocating the doubled ring and swapping buffers.
pub(crate) const STATUS_RESIZING: usize = 2;
/// Threads are draining the old ring into the new one.
pub(crate) const STATUS_COPYING: usize = 3;
/// Serialized release of the drained old ring.
pub(crate) const STATUS_CLEANUP: usize = 4;

/// Ring capacity used by [`Deque::default`].
const DEFAULT_CAPACITY: usize = 32;

/// Which end of the deque an operation targets.
#[derive(Clone, Copy)]
enum End {
    Front,
    Back,
}

/// An unbounded lock-free MPMC deque.
///
/// Adds never fail: a full ring triggers a cooperative resize that doubles
/// the capacity, driven by every thread that observes it. Takes and peeks
/// retry only while the structure is being reshaped underneath them.
pub struct Deque<T> {
    /// The active ring. Swapped for a doubled ring during growth.
    entries_new: Atomic<ArrayDeque<T>>,

    /// The previous ring being drained. Null outside growth.
    entries_old: Atomic<ArrayDeque<T>>,

    /// The growth state machine word.
    status: CacheAligned<AtomicUsize>,

    /// Bumped on every structural change; lets operations detect a reshape
    /// between attempt and confirmation.
    revision: CacheAligned<AtomicUsize>,

    /// Number of threads currently migrating entries.
    copying_threads: CacheAligned<AtomicUsize>,

    /// Values added minus values taken.
    count: CacheAligned<AtomicIsize>,
}

impl<T: 'static> Deque<T> {
    /// Creates a new deque with the given initial capacity.
    ///
    /// The capacity will be rounded up to the next power of two.
    pub fn new(capacity: usize) -> Deque<T> {
        Deque {
            entries_new: Atomic::new(ArrayDeque::new(capacity)),
            entries_old: Atomic::null(),
            status: CacheAligned::new(AtomicUsize::new(STATUS_STABLE)),
            revision: CacheAligned::new(AtomicUsize::new(0)),
            copying_threads: CacheAligned::new(AtomicUsize::new(0)),
            count: CacheAligned::new(AtomicIsize::new(0)),
        }
    }

    /// Returns the number of stored values.
    pub fn len(&self) -> usize {
        self.count.load(Ordering::Acquire).max(0) as usize
    }

    /// Returns `true` if the deque holds no values.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the current ring capacity.
    pub fn capacity(&self) -> usize {
        let guard = epoch::pin();
        let entries = self.entries_new.load(Ordering::Acquire, &guard);
        unsafe { entries.deref() }.capacity()
    }

    /// An operation may complete directly only while no resize phase is
    /// active and no thread is migrating.
    fn is_operation_safe(&self) -> bool {
        self.status.load(Ordering::Acquire) == STATUS_STABLE
            && self.copying_threads.load(Ordering::Acquire) == 0
    }

    /// Re-checks an attempt against the structure it was made on. An
    /// unconfirmed attempt may have landed in a ring that was swapped out
    /// underneath it.
    fn is_confirmed(
        &self,
        revision: usize,
        entries: Shared<'_, ArrayDeque<T>>,
        guard: &Guard,
    ) -> bool {
        self.revision.load(Ordering::Acquire) == revision
            && self.entries_new.load(Ordering::Acquire, guard) == entries
            && self.is_operation_safe()
    }

    /// Promotes the status word to request a resize. The single structural
    /// bump keeps in-flight operations from confirming against the old
    /// shape.
    fn request_resize(&self) {
        if self
            .status
            .compare_exchange(
                STATUS_STABLE,
                STATUS_RESIZE_REQUESTED,
                Ordering::SeqCst,
                Ordering::Relaxed,
            )
            .is_ok()
        {
            self.revision.fetch_add(1, Ordering::AcqRel);
        }
    }
}

impl<T: Clone + 'static> Deque<T> {
    /// Pushes a value onto the front of the deque. Never fails; a full ring
    /// is grown cooperatively.
    pub fn add_front(&self, value: T) {
        self.add(value, End::Front);
    }

    /// Pushes a value onto the back of the deque. Never fails.
    pub fn add_back(&self, value: T) {
        self.add(value, End::Back);
    }

    fn add(&self, value: T, end: End) {
        let guard = epoch::pin();
        let backoff = Backoff::new();

        loop {
            let revision = self.revision.load(Ordering::Acquire);
            if !self.is_operation_safe() {
                self.cooperative_grow(&guard);
                continue;
            }

            let shared = self.entries_new.load(Ordering::Acquire, &guard);
            let entries = unsafe { shared.deref() };
            // Clone per attempt: an unconfirmed success leaves the clone in
            // a ring that may already be draining, and the original is
            // needed for the retry.
            let outcome = match end {
                End::Front => entries.add_front(value.clone()),
                End::Back => entries.add_back(value.clone()),
            };

            match outcome {
                Ok(()) if self.is_confirmed(revision, shared, &guard) => {
                    self.count.fetch_add(1, Ordering::AcqRel);
                    return;
                }
                Ok(()) => {
                    // Unconfirmed: the ring moved under us and the entry may
                    // be reclaimed with it. Discard the attempt and retry.
                    backoff.snooze();
                }
                Err(_) => {
                    // Full, or the ring moved. Either way ask for room and
                    // help make it.
                    self.request_resize();
                    backoff.snooze();
                }
            }
        }
    }

    /// Pops a value from the front of the deque.
    pub fn try_take_front(&self) -> Option<T> {
        self.take(End::Front)
    }

    /// Pops a value from the back of the deque.
    pub fn try_take_back(&self) -> Option<T> {
        self.take(End::Back)
    }

    fn take(&self, end: End) -> Option<T> {
        let guard = epoch::pin();
        let backoff = Backoff::new();

        loop {
            let revision = self.revision.load(Ordering::Acquire);
            if !self.is_operation_safe() {
                self.cooperative_grow(&guard);
                continue;
            }

            let shared = self.entries_new.load(Ordering::Acquire, &guard);
            let entries = unsafe { shared.deref() };
            let taken = match end {
                End::Front => entries.try_take_front(),
                End::Back => entries.try_take_back(),
            };

            match taken {
                Some(value) => {
                    // The slot swap linearized the removal even if the ring
                    // was swapped out meanwhile; the value is ours.
                    self.count.fetch_sub(1, Ordering::AcqRel);
                    return Some(value);
                }
                None => {
                    if self.is_confirmed(revision, shared, &guard) {
                        return None;
                    }
                    // The ring moved; the value we missed may live in the
                    // other buffer. Retry once the reshape settles.
                    backoff.snooze();
                }
            }
        }
    }

    /// Returns a clone of the front value.
    ///
    /// # Panics
    ///
    /// Panics if the deque is empty.
    pub fn peek_front(&self) -> T {
        match self.peek(End::Front) {
            Some(value) => value,
            None => panic!("peek_front on an empty deque"),
        }
    }

    /// Returns a clone of the back value.
    ///
    /// # Panics
    ///
    /// Panics if the deque is empty.
    pub fn peek_back(&self) -> T {
        match self.peek(End::Back) {
            Some(value) => value,
            None => panic!("peek_back on an empty deque"),
        }
    }

    fn peek(&self, end: End) -> Option<T> {
        let guard = epoch::pin();
        let backoff = Backoff::new();

        loop {
            let revision = self.revision.load(Ordering::Acquire);
            if !self.is_operation_safe() {
                self.cooperative_grow(&guard);
                continue;
            }

            let shared = self.entries_new.load(Ordering::Acquire, &guard);
            let entries = unsafe { shared.deref() };
            let peeked = match end {
                End::Front => entries.try_peek_front(),
                End::Back => entries.try_peek_back(),
            };

            if self.is_confirmed(revision, shared, &guard) {
                return peeked;
            }
            backoff.snooze();
        }
    }

    /// Returns a clone of the value at the given ring position, if any.
    ///
    /// Ring positions are not stable across growth.
    pub fn try_get(&self, index: usize) -> Option<T> {
        let guard = epoch::pin();
        let backoff = Backoff::new();

        loop {
            let revision = self.revision.load(Ordering::Acquire);
            if !self.is_operation_safe() {
                self.cooperative_grow(&guard);
                continue;
            }

            let shared = self.entries_new.load(Ordering::Acquire, &guard);
            let got = unsafe { shared.deref() }.try_get(index);

            if self.is_confirmed(revision, shared, &guard) {
                return got;
            }
            backoff.snooze();
        }
    }

    /// Removes every value from the deque.
    pub fn clear(&self) {
        while self.try_take_back().is_some() {}
    }

    /// Returns a snapshot-free iterator over the active ring.
    ///
    /// The iterator observes the ring that was active when it was created;
    /// values added, taken, or migrated afterwards may or may not be seen.
    pub fn iter(&self) -> Iter<'_, T> {
        let guard = epoch::pin();
        let entries = self.entries_new.load(Ordering::Acquire, &guard).as_raw();
        Iter {
            _deque: self,
            entries,
            index: 0,
            _guard: guard,
        }
    }

    /// Drives one phase of the growth protocol, chosen by the status word.
    fn cooperative_grow(&self, guard: &Guard) {
        match self.status.load(Ordering::Acquire) {
            STATUS_RESIZE_REQUESTED => {
                if self
                    .status
                    .compare_exchange(
                        STATUS_RESIZE_REQUESTED,
                        STATUS_RESIZING,
                        Ordering::SeqCst,
                        Ordering::Relaxed,
                    )
                    .is_ok()
                {
                    // Single winner: close the full ring against stragglers,
                    // then publish it for draining and expose the doubled
                    // ring. Migration space is claimed up front so racing
                    // adds can never starve the drain of room.
                    let current = self.entries_new.load(Ordering::Acquire, guard);
                    let old = unsafe { current.deref() };
                    old.close();
                    let bigger = ArrayDeque::new(old.capacity() * 2);
                    bigger.reserve(old.capacity());
                    self.entries_old.store(current, Ordering::Release);
                    self.entries_new.store(Owned::new(bigger), Ordering::Release);
                    self.revision.fetch_add(1, Ordering::AcqRel);
                    let _ = self.status.compare_exchange(
                        STATUS_RESIZING,
                        STATUS_COPYING,
                        Ordering::SeqCst,
                        Ordering::Relaxed,
                    );
                }
            }
            STATUS_RESIZING => {
                // Another thread owns the buffer swap; give it room.
                let backoff = Backoff::new();
                while self.status.load(Ordering::Acquire) == STATUS_RESIZING
                    && !backoff.is_completed()
                {
                    backoff.snooze();
                }
            }
            STATUS_COPYING => {
                self.revision.fetch_add(1, Ordering::AcqRel);
                self.copying_threads.fetch_add(1, Ordering::SeqCst);
                if self.status.load(Ordering::Acquire) == STATUS_COPYING {
                    let old = self.entries_old.load(Ordering::Acquire, guard);
                    if let Some(old) = unsafe { old.as_ref() } {
                        while let Some(value) = old.try_take_front() {
                            self.migrate_front(value, guard);
                        }
                        let _ = self.status.compare_exchange(
                            STATUS_COPYING,
                            STATUS_CLEANUP,
                            Ordering::SeqCst,
                            Ordering::Relaxed,
                        );
                    }
                }
                self.copying_threads.fetch_sub(1, Ordering::SeqCst);
            }
            STATUS_CLEANUP => {
                if self
                    .status
                    .compare_exchange(
                        STATUS_CLEANUP,
                        STATUS_RESIZING,
                        Ordering::SeqCst,
                        Ordering::Relaxed,
                    )
                    .is_ok()
                {
                    // Serialized: late helpers may still be draining their
                    // last value into the new ring.
                    while self.copying_threads.load(Ordering::Acquire) != 0 {
                        core::hint::spin_loop();
                    }
                    let old = self.entries_old.swap(Shared::null(), Ordering::AcqRel, guard);
                    if !old.is_null() {
                        unsafe { guard.defer_destroy(old) };
                    }
                    self.revision.fetch_add(1, Ordering::AcqRel);
                    let _ = self.status.compare_exchange(
                        STATUS_RESIZING,
                        STATUS_STABLE,
                        Ordering::SeqCst,
                        Ordering::Relaxed,
                    );
                }
            }
            _ => {}
        }
    }

    /// Re-inserts a drained value at the front of the active ring.
    ///
    /// Goes straight to the ring rather than through [`Deque::add_front`]:
    /// the structure is mid-resize, so the user-facing path would loop back
    /// into the helper. The insert spends admission reserved when the ring
    /// was allocated, so it can only fail transiently on a contended
    /// position, never for lack of room.
    fn migrate_front(&self, value: T, guard: &Guard) {
        let backoff = Backoff::new();
        let mut value = value;

        loop {
            let entries = unsafe { self.entries_new.load(Ordering::Acquire, guard).deref() };
            match entries.add_front_reserved(value) {
                Ok(()) => return,
                Err(rejected) => {
                    value = rejected;
                    backoff.snooze();
                }
            }
        }
    }
}

impl<T: Clone + 'static> Default for Deque<T> {
    fn default() -> Self {
        Deque::new(DEFAULT_CAPACITY)
    }
}

impl<T> Drop for Deque<T> {
    fn drop(&mut self) {
        // &mut self gives exclusive access; no guard needed.
        unsafe {
            let guard = epoch::unprotected();
            let entries = self.entries_new.load(Ordering::Relaxed, guard);
            if !entries.is_null() {
                drop(entries.into_owned());
            }
            let old = self.entries_old.load(Ordering::Relaxed, guard);
            if !old.is_null() {
                drop(old.into_owned());
            }
        }
    }
}

/// Snapshot-free iterator over the values of a [`Deque`].
pub struct Iter<'a, T> {
    _deque: &'a Deque<T>,
    entries: *const ArrayDeque<T>,
    index: usize,
    // Keeps the observed ring alive even after a swap retires it.
    _guard: Guard,
}

impl<'a, T: Clone + 'static> Iterator for Iter<'a, T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        let entries = unsafe { &*self.entries };
        while self.index < entries.capacity() {
            let index = self.index;
            self.index += 1;
            if let Some(value) = entries.try_get(index) {
                return Some(value);
            }
        }
        None
    }
}

impl<'a, T: Clone + 'static> IntoIterator for &'a Deque<T> {
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
    fn test_status_encoding_is_pinned() {
        assert_eq!(STATUS_STABLE, 0);
        assert_eq!(STATUS_RESIZE_REQUESTED, 1);
        assert_eq!(STATUS_RESIZING, 2);
        assert_eq!(STATUS_COPYING, 3);
        assert_eq!(STATUS_CLEANUP, 4);
    }

    #[test]
    fn test_new_deque_is_stable_and_safe() {
        let deque = Deque::<u32>::new(4);
        assert!(deque.is_operation_safe());
        assert_eq!(deque.status.load(Ordering::Relaxed), STATUS_STABLE);
        assert!(deque.is_empty());
    }

    #[test]
    fn test_request_resize_bumps_revision_once() {
        let deque = Deque::<u32>::new(4);
        let before = deque.revision.load(Ordering::Relaxed);
        deque.request_resize();
        deque.request_resize();
        assert_eq!(deque.revision.load(Ordering::Relaxed), before + 1);
        assert_eq!(
            deque.status.load(Ordering::Relaxed),
            STATUS_RESIZE_REQUESTED
        );
        assert!(!deque.is_operation_safe());
    }

    #[test]
    fn test_growth_preserves_entries() {
        let deque = Deque::new(2);
        deque.add_back(1);
        deque.add_back(2);
        deque.add_back(3);
        assert_eq!(deque.len(), 3);
        assert_eq!(deque.capacity(), 4);
        assert_eq!(deque.status.load(Ordering::Relaxed), STATUS_STABLE);

        let mut values: Vec<_> = deque.iter().collect();
        values.sort_unstable();
        assert_eq!(values, vec![1, 2, 3]);
    }
}
