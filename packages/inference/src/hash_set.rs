use indexmap::IndexMap;
use miniscript_catalog::SignatureDefinition;
use rustc_hash::FxBuildHasher;

/// Structural content hash used for deduplication
pub trait ContentHash {
    fn content_hash(&self) -> u32;
}

impl ContentHash for SignatureDefinition {
    fn content_hash(&self) -> u32 {
        SignatureDefinition::content_hash(self)
    }
}

/// Set deduplicated by content hash.
///
/// Two items with the same hash are the same item: adding the second
/// overwrites the stored value but keeps its original position, so iteration
/// stays in first-seen order.
#[derive(Debug, Clone)]
pub struct HashConsedSet<T> {
    items: IndexMap<u32, T, FxBuildHasher>,
}

impl<T: ContentHash> HashConsedSet<T> {
    pub fn new() -> Self {
        Self {
            items: IndexMap::default(),
        }
    }

    /// Returns true when no item with the same hash was present
    pub fn add(&mut self, item: T) -> bool {
        self.items.insert(item.content_hash(), item).is_none()
    }

    /// Returns true when an item with the same hash was removed
    pub fn delete(&mut self, item: &T) -> bool {
        self.items.shift_remove(&item.content_hash()).is_some()
    }

    pub fn has(&self, item: &T) -> bool {
        self.items.contains_key(&item.content_hash())
    }

    pub fn first(&self) -> Option<&T> {
        self.items.first().map(|(_, item)| item)
    }

    pub fn last(&self) -> Option<&T> {
        self.items.last().map(|(_, item)| item)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.values()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T: ContentHash + Clone> HashConsedSet<T> {
    /// Union with another set
    pub fn union(&mut self, other: &HashConsedSet<T>) {
        self.extend(other.iter().cloned());
    }
}

impl<T: ContentHash> Default for HashConsedSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ContentHash> Extend<T> for HashConsedSet<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.add(item);
        }
    }
}

impl<T: ContentHash> FromIterator<T> for HashConsedSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl<T: ContentHash> IntoIterator for HashConsedSet<T> {
    type Item = T;
    type IntoIter = indexmap::map::IntoValues<u32, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_values()
    }
}
