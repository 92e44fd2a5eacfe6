//! Open-addressed wait-free hash table with caller-driven probing.
//!
//! The table never scans: the caller chooses the probe offset, the table
//! resolves exactly one slot per call. That keeps every primitive wait-free
//! and pushes the retry policy (`offset + 1` on collision) to the layer
//! above.

use std::borrow::Borrow;
use std::fmt;
use std::hash::{BuildHasher, Hash};

use foldhash::fast::FixedState;
use petek::bucket;
use petek::{Bucket, Occupied};

/// A stored key/value pair.
#[derive(Clone)]
struct Entry<K, V> {
    key: K,
    value: V,
}

/// Error returned by [`HashBucket::add`] when the target slot is occupied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddError<K, V> {
    /// The key handed back to the caller.
    pub key: K,
    /// The value handed back to the caller.
    pub value: V,
    /// `true` when the slot holds a different key, so retrying at the next
    /// offset may succeed. `false` when the key is already present.
    pub collision: bool,
}

impl<K, V> fmt::Display for AddError<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.collision {
            write!(f, "slot occupied by a different key")
        } else {
            write!(f, "key already present")
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug> std::error::Error for AddError<K, V> {}

/// Outcome of a successful [`HashBucket::set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Set {
    /// The slot index that was written.
    pub index: usize,
    /// `true` when the write created a new entry rather than replacing one.
    pub is_new: bool,
}

/// A wait-free, fixed-capacity, open-addressed hash table.
///
/// Capacity is rounded up to the next power of two. The slot for a key is
/// `(hash(key) + offset) & (capacity - 1)` where `offset` is supplied by the
/// caller on every operation; the table holds at most one slot per key as
/// long as callers probe deterministically from offset zero.
pub struct HashBucket<K, V, S = FixedState> {
    entries: Bucket<Entry<K, V>>,
    mask: usize,
    hasher: S,
}

impl<K, V> HashBucket<K, V, FixedState>
where
    K: Hash + Eq + Clone + 'static,
    V: Clone + 'static,
{
    /// Creates a table with the given capacity and the default hasher.
    pub fn new(capacity: usize) -> Self {
        Self::with_hasher(capacity, FixedState::default())
    }
}

impl<K, V, S> HashBucket<K, V, S>
where
    K: Hash + Eq + Clone + 'static,
    V: Clone + 'static,
    S: BuildHasher,
{
    /// Creates a table with the given capacity and hasher.
    ///
    /// The capacity is rounded up to the next power of two.
    pub fn with_hasher(capacity: usize, hasher: S) -> Self {
        let entries = Bucket::new(capacity);
        let mask = entries.capacity() - 1;
        HashBucket {
            entries,
            mask,
            hasher,
        }
    }

    /// Returns the capacity of the table.
    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    /// Returns the number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the slot index for `key` at the given probe offset.
    pub fn index<Q>(&self, key: &Q, offset: usize) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + ?Sized,
    {
        (self.hasher.hash_one(key) as usize).wrapping_add(offset) & self.mask
    }

    /// Inserts a new entry at the slot for `(key, offset)`.
    ///
    /// Returns the slot index on success. Fails with `collision = true` when
    /// the slot holds a different key (the caller may retry at `offset + 1`)
    /// and `collision = false` when the key is already present. Under a
    /// same-key race exactly one caller succeeds.
    pub fn add(&self, key: K, value: V, offset: usize) -> Result<usize, AddError<K, V>> {
        let index = self.index(&key, offset);
        match self.entries.insert(index, Entry { key, value }) {
            Ok(()) => Ok(index),
            Err(Occupied { value: entry, current }) => Err(AddError {
                collision: current.key != entry.key,
                key: entry.key,
                value: entry.value,
            }),
        }
    }

    /// Returns the slot index of `key` if it is stored at the given offset.
    pub fn contains_key<Q>(&self, key: &Q, offset: usize) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let index = self.index(key, offset);
        match self.entries.read(index, |entry| entry.key.borrow() == key) {
            Some(true) => Some(index),
            _ => None,
        }
    }

    /// Returns a clone of the value stored for `key` at the given offset.
    pub fn get<Q>(&self, key: &Q, offset: usize) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let index = self.index(key, offset);
        self.entries
            .read(index, |entry| {
                if entry.key.borrow() == key {
                    Some(entry.value.clone())
                } else {
                    None
                }
            })
            .flatten()
    }

    /// Writes `value` for `key` if the slot for `(key, offset)` is empty or
    /// already holds `key`.
    ///
    /// Hands the pair back when the slot is held by a different key or the
    /// write raced with a concurrent change.
    pub fn set(&self, key: K, value: V, offset: usize) -> Result<Set, (K, V)> {
        let index = self.index(&key, offset);
        let probe = key.clone();
        match self
            .entries
            .set_if(index, Entry { key, value }, move |current| current.key == probe)
        {
            Ok(is_new) => Ok(Set { index, is_new }),
            Err(entry) => Err((entry.key, entry.value)),
        }
    }

    /// Removes the entry for `key` at the given offset.
    ///
    /// Returns the slot index and the removed value. The removal is a no-op
    /// if the slot content changed between observation and the swap.
    pub fn remove<Q>(&self, key: &Q, offset: usize) -> Option<(usize, V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let index = self.index(key, offset);
        let entry = self
            .entries
            .remove_if(index, |entry| entry.key.borrow() == key)?;
        Some((index, entry.value))
    }

    /// Returns the underlying hasher.
    pub fn hasher(&self) -> &S {
        &self.hasher
    }

    /// Returns an iterator over entries in slot order.
    ///
    /// Yields `(K, V)` clones with no consistency guarantee across slots.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            inner: self.entries.iter(),
        }
    }

    /// Returns an iterator over the stored keys.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { iter: self.iter() }
    }

    /// Returns an iterator over the stored values.
    pub fn values(&self) -> Values<'_, K, V> {
        Values { iter: self.iter() }
    }
}

/// Iterator over the entries of a [`HashBucket`].
pub struct Iter<'a, K, V> {
    inner: bucket::Iter<'a, Entry<K, V>>,
}

impl<'a, K: Clone + 'static, V: Clone + 'static> Iterator for Iter<'a, K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|(_, entry)| (entry.key, entry.value))
    }
}

/// Iterator over the keys of a [`HashBucket`].
pub struct Keys<'a, K, V> {
    iter: Iter<'a, K, V>,
}

impl<'a, K: Clone + 'static, V: Clone + 'static> Iterator for Keys<'a, K, V> {
    type Item = K;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next().map(|(k, _)| k)
    }
}

/// Iterator over the values of a [`HashBucket`].
pub struct Values<'a, K, V> {
    iter: Iter<'a, K, V>,
}

impl<'a, K: Clone + 'static, V: Clone + 'static> Iterator for Values<'a, K, V> {
    type Item = V;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next().map(|(_, v)| v)
    }
}

impl<'a, K, V, S> IntoIterator for &'a HashBucket<K, V, S>
where
    K: Hash + Eq + Clone + 'static,
    V: Clone + 'static,
    S: BuildHasher,
{
    type Item = (K, V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
