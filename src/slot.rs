//! A single concurrent cell: the building block under every container in
//! this family.
//!
//! A slot is either empty or holds one value. Emptiness is encoded as a null
//! pointer, occupancy as a heap-allocated value published with release
//! ordering and read with acquire ordering under an epoch guard. Every
//! transition is one compare-and-swap; a lost race is reported to the caller,
//! never retried here.

use std::sync::atomic::Ordering;

use crossbeam_epoch::{Atomic, Guard, Owned, Shared};

/// A cell holding either nothing or exactly one value.
///
/// All operations take an epoch [`Guard`]; references returned to occupants
/// stay valid for the guard's lifetime even if the occupant is concurrently
/// removed. `Slot` is a low-level primitive: it maintains no count and
/// enforces no protocol beyond single-CAS transitions. Use
/// [`Bucket`](crate::Bucket) unless slot-level control is required.
pub struct Slot<T> {
    cell: Atomic<T>,
}

impl<T: 'static> Slot<T> {
    /// Creates an empty slot.
    pub fn new() -> Slot<T> {
        Slot {
            cell: Atomic::null(),
        }
    }

    /// Returns a reference to the occupant, if any. Never mutates.
    pub fn get<'g>(&self, guard: &'g Guard) -> Option<&'g T> {
        let current = self.cell.load(Ordering::Acquire, guard);
        unsafe { current.as_ref() }
    }

    /// Attempts to publish `value` into an empty slot.
    ///
    /// Fails iff the slot is occupied, handing the value back together with
    /// a reference to the occupant that won.
    pub fn try_insert<'g>(&self, value: T, guard: &'g Guard) -> Result<(), (T, &'g T)> {
        match self.cell.compare_exchange(
            Shared::null(),
            Owned::new(value),
            Ordering::AcqRel,
            Ordering::Acquire,
            guard,
        ) {
            Ok(_) => Ok(()),
            // The expected value was null, so the observed occupant is not.
            Err(e) => Err((*e.new.into_box(), unsafe { e.current.deref() })),
        }
    }

    /// Unconditionally replaces the occupant with `value`.
    ///
    /// Returns `true` iff the slot was empty. A displaced occupant is
    /// retired through the guard.
    pub fn replace(&self, value: T, guard: &Guard) -> bool {
        let old = self.cell.swap(Owned::new(value), Ordering::AcqRel, guard);
        if old.is_null() {
            true
        } else {
            unsafe { guard.defer_destroy(old) };
            false
        }
    }

    /// Replaces the occupant with `value` if the slot is empty or the
    /// occupant satisfies `pred`.
    ///
    /// Returns `Ok(was_empty)` on success. Fails, handing `value` back, when
    /// the occupant does not match or the slot changed between observation
    /// and the swap. Single shot: a lost race is not retried.
    pub fn replace_if<F>(&self, value: T, pred: F, guard: &Guard) -> Result<bool, T>
    where
        F: FnOnce(&T) -> bool,
    {
        let current = self.cell.load(Ordering::Acquire, guard);
        if let Some(occupant) = unsafe { current.as_ref() } {
            if !pred(occupant) {
                return Err(value);
            }
        }
        match self.cell.compare_exchange(
            current,
            Owned::new(value),
            Ordering::AcqRel,
            Ordering::Acquire,
            guard,
        ) {
            Ok(_) => {
                if current.is_null() {
                    Ok(true)
                } else {
                    unsafe { guard.defer_destroy(current) };
                    Ok(false)
                }
            }
            Err(e) => Err(*e.new.into_box()),
        }
    }

    /// Removes and returns the occupant, if any.
    ///
    /// Single shot: if the slot content changed between observation and the
    /// swap, the removal is a no-op and `None` is returned.
    pub fn take(&self, guard: &Guard) -> Option<T>
    where
        T: Clone,
    {
        self.take_if(|_| true, guard)
    }

    /// Removes and returns the occupant if it satisfies `pred`.
    pub fn take_if<F>(&self, pred: F, guard: &Guard) -> Option<T>
    where
        T: Clone,
        F: FnOnce(&T) -> bool,
    {
        let current = self.cell.load(Ordering::Acquire, guard);
        let occupant = unsafe { current.as_ref() }?;
        if !pred(occupant) {
            return None;
        }
        match self.cell.compare_exchange(
            current,
            Shared::null(),
            Ordering::AcqRel,
            Ordering::Acquire,
            guard,
        ) {
            Ok(_) => {
                let value = occupant.clone();
                unsafe { guard.defer_destroy(current) };
                Some(value)
            }
            Err(_) => None,
        }
    }
}

impl<T: 'static> Default for Slot<T> {
    fn default() -> Self {
        Slot::new()
    }
}

impl<T> Drop for Slot<T> {
    fn drop(&mut self) {
        // &mut self gives exclusive access; no guard needed.
        unsafe {
            let current = self.cell.load(Ordering::Relaxed, crossbeam_epoch::unprotected());
            if !current.is_null() {
                drop(current.into_owned());
            }
        }
    }
}
