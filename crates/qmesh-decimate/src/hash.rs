//! Concurrent hash tables mapping edge and triangle keys to handles.
//!
//! Both tables are open-addressed arrays split into independently locked
//! shards; a key's shard is picked by the high bits of its hash, so every
//! operation on a key serializes on one short-lived mutex while distinct
//! shards proceed in parallel. Probe chains never leave their shard.

use parking_lot::Mutex;
use xxhash_rust::xxh3::xxh3_64;

/// Canonical key of an edge: the unordered vertex pair stored (min, max).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EdgeKey(pub(crate) u32, pub(crate) u32);

impl EdgeKey {
    pub(crate) fn new(a: u32, b: u32) -> Self {
        if a < b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }
}

/// Canonical key of a triangle: its vertex triple, sorted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TriKey([u32; 3]);

impl TriKey {
    pub(crate) fn new(verts: [u32; 3]) -> Self {
        let mut v = verts;
        v.sort_unstable();
        Self(v)
    }
}

/// A hashable table key.
pub(crate) trait TableKey: Copy + Eq {
    fn hash(&self) -> u64;
}

impl TableKey for EdgeKey {
    fn hash(&self) -> u64 {
        let mut bytes = [0u8; 8];
        bytes[..4].copy_from_slice(&self.0.to_le_bytes());
        bytes[4..].copy_from_slice(&self.1.to_le_bytes());
        xxh3_64(&bytes)
    }
}

impl TableKey for TriKey {
    fn hash(&self) -> u64 {
        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&self.0[0].to_le_bytes());
        bytes[4..8].copy_from_slice(&self.0[1].to_le_bytes());
        bytes[8..].copy_from_slice(&self.0[2].to_le_bytes());
        xxh3_64(&bytes)
    }
}

#[derive(Debug, Clone, Copy)]
enum Slot<K, V> {
    Empty,
    Tombstone,
    Full(K, V),
}

#[derive(Debug)]
struct Shard<K, V> {
    slots: Vec<Slot<K, V>>,
    live: usize,
    /// Live plus tombstoned slots; probe chains terminate only on truly
    /// empty slots, so this is the quantity the load cap bounds.
    used: usize,
}

/// Load factor above which a shard rehashes.
const MAX_LOAD: f64 = 0.7;

impl<K: TableKey, V: Copy> Shard<K, V> {
    fn with_capacity(slots: usize) -> Self {
        Self {
            slots: vec![Slot::Empty; slots.next_power_of_two().max(8)],
            live: 0,
            used: 0,
        }
    }

    /// Linear probe for `key`. Returns the slot holding it, or the first
    /// insertable slot (empty or tombstone) on its chain.
    fn probe(&self, key: &K) -> (usize, bool) {
        let mask = self.slots.len() - 1;
        let mut index = (key.hash() as usize) & mask;
        let mut insert_at = None;
        loop {
            match &self.slots[index] {
                Slot::Empty => return (insert_at.unwrap_or(index), false),
                Slot::Tombstone => {
                    insert_at.get_or_insert(index);
                }
                Slot::Full(k, _) if k == key => return (index, true),
                Slot::Full(..) => {}
            }
            index = (index + 1) & mask;
        }
    }

    /// Claim the insertable slot returned by `probe` for a new entry.
    fn fill(&mut self, index: usize, key: K, value: V) {
        if matches!(self.slots[index], Slot::Empty) {
            self.used += 1;
        }
        self.slots[index] = Slot::Full(key, value);
        self.live += 1;
        self.rehash_if_needed();
    }

    fn rehash_if_needed(&mut self) {
        if (self.used as f64) < MAX_LOAD * self.slots.len() as f64 {
            return;
        }
        // Double when genuinely full; rebuild in place when the load is
        // mostly tombstones.
        let new_len = if (self.live as f64) >= 0.5 * MAX_LOAD * self.slots.len() as f64 {
            self.slots.len() * 2
        } else {
            self.slots.len()
        };
        let old = std::mem::replace(&mut self.slots, vec![Slot::Empty; new_len]);
        self.used = self.live;
        for slot in old {
            if let Slot::Full(k, v) = slot {
                let (index, _) = self.probe(&k);
                self.slots[index] = Slot::Full(k, v);
            }
        }
    }
}

/// A sharded concurrent map from canonical keys to pool handles.
#[derive(Debug)]
pub(crate) struct ConcurrentTable<K, V> {
    shards: Vec<Mutex<Shard<K, V>>>,
    shard_bits: u32,
}

impl<K: TableKey, V: Copy> ConcurrentTable<K, V> {
    /// Size the table for `expected` entries spread over `shards` locks.
    pub(crate) fn with_capacity(expected: usize, shards: usize) -> Self {
        let shards = shards.next_power_of_two().max(16);
        let per_shard = (expected * 2 / shards).max(8);
        Self {
            shards: (0..shards)
                .map(|_| Mutex::new(Shard::with_capacity(per_shard)))
                .collect(),
            shard_bits: shards.trailing_zeros(),
        }
    }

    fn shard_of(&self, key: &K) -> &Mutex<Shard<K, V>> {
        // High bits pick the shard; low bits walk the chain inside it.
        let index = (key.hash() >> (64 - self.shard_bits)) as usize;
        &self.shards[index]
    }

    /// Look up `key`.
    pub(crate) fn lookup(&self, key: &K) -> Option<V> {
        let shard = self.shard_of(key).lock();
        let (index, found) = shard.probe(key);
        if found {
            match shard.slots[index] {
                Slot::Full(_, v) => Some(v),
                _ => unreachable!(),
            }
        } else {
            None
        }
    }

    /// Return the value under `key`, inserting `make()` when absent.
    /// The boolean is true when the key already existed.
    pub(crate) fn find_or_insert(&self, key: K, make: impl FnOnce() -> V) -> (V, bool) {
        let mut shard = self.shard_of(&key).lock();
        let (index, found) = shard.probe(&key);
        if found {
            match shard.slots[index] {
                Slot::Full(_, v) => (v, true),
                _ => unreachable!(),
            }
        } else {
            let value = make();
            shard.fill(index, key, value);
            (value, false)
        }
    }

    /// Insert `key -> value`. Returns the previously stored value if the
    /// key was already present (the stored value is left unchanged).
    pub(crate) fn insert(&self, key: K, value: V) -> Option<V> {
        let mut shard = self.shard_of(&key).lock();
        let (index, found) = shard.probe(&key);
        if found {
            match shard.slots[index] {
                Slot::Full(_, v) => Some(v),
                _ => unreachable!(),
            }
        } else {
            shard.fill(index, key, value);
            None
        }
    }

    /// Remove `key`, returning its value when present.
    pub(crate) fn remove(&self, key: &K) -> Option<V> {
        let mut shard = self.shard_of(key).lock();
        let (index, found) = shard.probe(key);
        if found {
            let value = match shard.slots[index] {
                Slot::Full(_, v) => v,
                _ => unreachable!(),
            };
            shard.slots[index] = Slot::Tombstone;
            shard.live -= 1;
            Some(value)
        } else {
            None
        }
    }
}
