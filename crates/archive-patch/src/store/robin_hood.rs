//! Fixed-capacity Robin Hood hash table
//!
//! Open addressing with linear probing. On insert, an entry that has
//! travelled further from its home bucket than the resident entry takes the
//! slot and the resident continues probing. This keeps probe lengths tight,
//! which lets lookups stop early: once the resident of a slot sits closer to
//! its home than the number of probes made so far, the key cannot be further
//! along.
//!
//! Deletion uses backward shifting, so the table never needs tombstones.

use crate::hash::hash_key;

/// Occupied bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket<V> {
    /// `hash_key(key)`
    pub hash: u32,
    /// Key bytes
    pub key: Vec<u8>,
    /// Stored value
    pub value: V,
}

/// Robin Hood open-addressing table with a fixed number of buckets
#[derive(Debug, Clone)]
pub struct RobinHoodTable<V> {
    slots: Vec<Option<Bucket<V>>>,
    len: usize,
    max_probe: usize,
}

/// Distance of `slot` from the home bucket of `hash`
#[inline]
pub(crate) fn probe_distance(hash: u32, slot: usize, capacity: usize) -> usize {
    let home = hash as usize % capacity;
    (slot + capacity - home) % capacity
}

impl<V> RobinHoodTable<V> {
    /// Create an empty table with `capacity` buckets
    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            len: 0,
            max_probe: 0,
        }
    }

    /// Rebuild a table from buckets at fixed positions
    ///
    /// Returns `None` if the layout could not have been produced by
    /// [`RobinHoodTable::put`]: a bucket whose hash does not match its key,
    /// or a run in which an entry sits further from home than its successor
    /// allows.
    pub fn from_slots(slots: Vec<Option<Bucket<V>>>) -> Option<Self> {
        let capacity = slots.len();
        let mut len = 0;
        let mut max_probe = 0;

        for (slot, bucket) in slots.iter().enumerate() {
            let Some(bucket) = bucket else { continue };
            if bucket.hash != hash_key(&bucket.key) {
                return None;
            }
            let distance = probe_distance(bucket.hash, slot, capacity);
            // Every slot between home and here must be occupied
            if distance > 0 {
                let previous = (slot + capacity - 1) % capacity;
                match &slots[previous] {
                    Some(prev) if probe_distance(prev.hash, previous, capacity) + 1 >= distance => {}
                    _ => return None,
                }
            }
            len += 1;
            max_probe = max_probe.max(distance);
        }

        Some(Self {
            slots,
            len,
            max_probe,
        })
    }

    /// Number of buckets
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the table holds no entries
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Largest distance of any entry from its home bucket
    pub fn max_probe(&self) -> usize {
        self.max_probe
    }

    /// All buckets in slot order
    pub fn slots(&self) -> &[Option<Bucket<V>>] {
        &self.slots
    }

    /// Insert or overwrite `key`
    ///
    /// Returns `false` when the key is new and every bucket is taken.
    pub fn put(&mut self, key: Vec<u8>, value: V) -> bool {
        let hash = hash_key(&key);
        if let Some(slot) = self.find_slot(&key, hash) {
            if let Some(bucket) = self.slots[slot].as_mut() {
                bucket.value = value;
            }
            return true;
        }
        if self.len == self.capacity() {
            return false;
        }

        let capacity = self.capacity();
        let mut incoming = Bucket { hash, key, value };
        let mut slot = hash as usize % capacity;
        let mut distance = 0usize;

        loop {
            match self.slots[slot].as_mut() {
                None => {
                    self.slots[slot] = Some(incoming);
                    self.len += 1;
                    self.max_probe = self.max_probe.max(distance);
                    return true;
                }
                Some(resident) => {
                    let resident_distance = probe_distance(resident.hash, slot, capacity);
                    if distance > resident_distance {
                        std::mem::swap(resident, &mut incoming);
                        self.max_probe = self.max_probe.max(distance);
                        distance = resident_distance;
                    }
                }
            }
            slot = (slot + 1) % capacity;
            distance += 1;
        }
    }

    /// Look up `key`
    pub fn get(&self, key: &[u8]) -> Option<&V> {
        self.find_slot(key, hash_key(key))
            .and_then(|slot| self.slots[slot].as_ref())
            .map(|bucket| &bucket.value)
    }

    /// Slot holding `key`, if present
    pub fn position(&self, key: &[u8]) -> Option<usize> {
        self.find_slot(key, hash_key(key))
    }

    /// Remove `key`, shifting the rest of its run back by one
    pub fn remove(&mut self, key: &[u8]) -> Option<V> {
        let mut slot = self.find_slot(key, hash_key(key))?;
        let removed = self.slots[slot].take()?;
        self.len -= 1;

        let capacity = self.capacity();
        loop {
            let next = (slot + 1) % capacity;
            let shift = match &self.slots[next] {
                Some(bucket) => probe_distance(bucket.hash, next, capacity) > 0,
                None => false,
            };
            if !shift {
                break;
            }
            self.slots[slot] = self.slots[next].take();
            slot = next;
        }

        Some(removed.value)
    }

    fn find_slot(&self, key: &[u8], hash: u32) -> Option<usize> {
        let capacity = self.capacity();
        if capacity == 0 {
            return None;
        }

        let home = hash as usize % capacity;
        for probes in 0..=self.max_probe {
            let slot = (home + probes) % capacity;
            match &self.slots[slot] {
                None => return None,
                Some(bucket) => {
                    if bucket.hash == hash && bucket.key == key {
                        log::trace!("Found key after {} probes", probes + 1);
                        return Some(slot);
                    }
                    if probe_distance(bucket.hash, slot, capacity) < probes {
                        return None;
                    }
                }
            }
        }
        None
    }
}
