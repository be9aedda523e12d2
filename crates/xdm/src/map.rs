use crate::atomic::AtomicValue;
use crate::item::Item;
use indexmap::IndexMap;

/// An immutable-by-convention map keyed by atomic values, preserving insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XdmMap {
    entries: IndexMap<AtomicValue, Item>,
}

impl XdmMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces an entry. Keys are compared with atomic equality, so `1` and
    /// `1.0` address the same entry.
    pub fn insert(&mut self, key: AtomicValue, value: Item) -> Option<Item> {
        self.entries.insert(key, value)
    }

    pub fn get(&self, key: &AtomicValue) -> Option<&Item> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &AtomicValue) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &AtomicValue> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AtomicValue, &Item)> {
        self.entries.iter()
    }
}

impl FromIterator<(AtomicValue, Item)> for XdmMap {
    fn from_iter<T: IntoIterator<Item = (AtomicValue, Item)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
