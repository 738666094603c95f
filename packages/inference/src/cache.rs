use rustc_hash::FxHashMap;
use std::borrow::Borrow;
use std::hash::Hash;

pub const DEFAULT_CAPACITY: usize = 50;

#[derive(Debug)]
struct Slot<K, V> {
    key: K,
    value: V,
    /// towards the most recently touched end
    newer: Option<usize>,
    /// towards the least recently touched end
    older: Option<usize>,
}

/// Bounded least-recently-used cache.
///
/// Slots live in a vector and are threaded into a doubly linked recency
/// list by index, so `get` and `set` are O(1). Once the cache is full the
/// least recently touched slot is reused for the incoming entry.
#[derive(Debug)]
pub struct RecencyCache<K, V> {
    capacity: usize,
    index: FxHashMap<K, usize>,
    slots: Vec<Slot<K, V>>,
    newest: Option<usize>,
    oldest: Option<usize>,
}

impl<K: Hash + Eq + Clone, V> RecencyCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            index: FxHashMap::default(),
            slots: Vec::with_capacity(capacity),
            newest: None,
            oldest: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Look up `key` and mark it as most recently used
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let slot = *self.index.get(key)?;
        self.touch(slot);
        Some(&self.slots[slot].value)
    }

    /// Look up `key` without refreshing its recency
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.get(key).map(|&slot| &self.slots[slot].value)
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.contains_key(key)
    }

    /// Insert or update `key`; returns the evicted entry, if any
    pub fn set(&mut self, key: K, value: V) -> Option<(K, V)> {
        if let Some(&slot) = self.index.get(&key) {
            self.slots[slot].value = value;
            self.touch(slot);
            return None;
        }

        if self.slots.len() < self.capacity {
            let slot = self.slots.len();
            self.slots.push(Slot {
                key: key.clone(),
                value,
                newer: None,
                older: None,
            });
            self.index.insert(key, slot);
            self.push_newest(slot);
            return None;
        }

        // Full: recycle the least recently touched slot
        let slot = self.oldest?;
        self.unlink(slot);
        let evicted_key = std::mem::replace(&mut self.slots[slot].key, key.clone());
        let evicted_value = std::mem::replace(&mut self.slots[slot].value, value);
        self.index.remove(&evicted_key);
        self.index.insert(key, slot);
        self.push_newest(slot);
        Some((evicted_key, evicted_value))
    }

    pub fn clear(&mut self) {
        self.index.clear();
        self.slots.clear();
        self.newest = None;
        self.oldest = None;
    }

    /// Keys from most to least recently touched
    pub fn keys(&self) -> Vec<&K> {
        let mut keys = Vec::with_capacity(self.slots.len());
        let mut cursor = self.newest;
        while let Some(slot) = cursor {
            keys.push(&self.slots[slot].key);
            cursor = self.slots[slot].older;
        }
        keys
    }

    fn touch(&mut self, slot: usize) {
        if self.newest == Some(slot) {
            return;
        }
        self.unlink(slot);
        self.push_newest(slot);
    }

    fn unlink(&mut self, slot: usize) {
        let Slot { newer, older, .. } = self.slots[slot];
        match newer {
            Some(newer) => self.slots[newer].older = older,
            None => self.newest = older,
        }
        match older {
            Some(older) => self.slots[older].newer = newer,
            None => self.oldest = newer,
        }
        self.slots[slot].newer = None;
        self.slots[slot].older = None;
    }

    fn push_newest(&mut self, slot: usize) {
        self.slots[slot].older = self.newest;
        self.slots[slot].newer = None;
        if let Some(previous) = self.newest {
            self.slots[previous].newer = Some(slot);
        }
        self.newest = Some(slot);
        if self.oldest.is_none() {
            self.oldest = Some(slot);
        }
    }
}

impl<K: Hash + Eq + Clone, V> Default for RecencyCache<K, V> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_capacity() {
        let cache: RecencyCache<String, u32> = RecencyCache::default();
        assert_eq!(cache.capacity(), 50);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_evicts_least_recently_touched() {
        let mut cache = RecencyCache::new(3);
        cache.set("a", 1);
        cache.set("b", 2);
        cache.set("c", 3);

        let evicted = cache.set("d", 4);

        assert_eq!(evicted, Some(("a", 1)));
        assert_eq!(cache.len(), 3);
        assert!(!cache.contains("a"));
        assert_eq!(cache.peek("d"), Some(&4));
    }

    #[test]
    fn test_get_refreshes_recency() {
        let mut cache = RecencyCache::new(3);
        cache.set("a", 1);
        cache.set("b", 2);
        cache.set("c", 3);

        assert_eq!(cache.get("a"), Some(&1));
        cache.set("d", 4);

        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert_eq!(cache.keys(), vec![&"d", &"a", &"c"]);
    }

    #[test]
    fn test_set_existing_updates_and_refreshes() {
        let mut cache = RecencyCache::new(2);
        cache.set("a", 1);
        cache.set("b", 2);

        assert_eq!(cache.set("a", 10), None);
        cache.set("c", 3);

        assert_eq!(cache.peek("a"), Some(&10));
        assert!(!cache.contains("b"));
    }

    #[test]
    fn test_capacity_of_one() {
        let mut cache = RecencyCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.set(1, "one");
        cache.set(2, "two");
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&2), Some(&"two"));
        assert_eq!(cache.get(&1), None);
    }

    #[test]
    fn test_peek_does_not_refresh() {
        let mut cache = RecencyCache::new(2);
        cache.set("a", 1);
        cache.set("b", 2);

        assert_eq!(cache.peek("a"), Some(&1));
        cache.set("c", 3);

        assert!(!cache.contains("a"));
    }

    #[test]
    fn test_string_keys_borrow_as_str() {
        let mut cache: RecencyCache<String, usize> = RecencyCache::new(4);
        cache.set("hello".to_string(), 5);
        assert_eq!(cache.get("hello"), Some(&5));
    }
}
