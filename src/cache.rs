use fnv::FnvHashMap;
use std::hash::Hash;

/// Memo with a fixed capacity.
///
/// Eviction policy: when an insert would exceed the capacity the whole cache is cleared. Entries
/// can always be recomputed, so clearing only costs time.
#[derive(Debug)]
pub(crate) struct BoundedCache<K, V> {
    entries: FnvHashMap<K, V>,
    capacity: usize,
    clears: usize,
}

impl<K, V> BoundedCache<K, V>
where
    K: Eq + Hash,
{
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            entries: Default::default(),
            capacity: capacity.max(1),
            clears: 0,
        }
    }

    pub(crate) fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub(crate) fn insert(&mut self, key: K, value: V) {
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            self.entries.clear();
            self.clears += 1;
        }
        self.entries.insert(key, value);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Number of times the cache overflowed and was cleared.
    pub(crate) fn clears(&self) -> usize {
        self.clears
    }
}
