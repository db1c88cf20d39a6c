use std::hash::Hash;

use rustc_hash::FxHashMap;

/// Keys handed out by an [`InternTable`].
pub trait InternKey: From<usize> + Into<usize> + Clone + Copy + PartialEq + Eq + Hash {}

impl InternKey for usize {}

/// Assigns each distinct item a dense, stable key.
///
/// Owned by whoever needs identity caching (the analysis context keeps one
/// for named singleton values); there is no process-wide table.
#[derive(Clone, Debug)]
pub struct InternTable<T: Clone + Eq + Hash, Key: InternKey = usize> {
    items: Vec<T>,
    item_map: FxHashMap<T, Key>,
}

impl<T, K> Default for InternTable<T, K>
where
    T: Clone + Eq + Hash,
    K: InternKey,
{
    fn default() -> Self {
        Self {
            items: Vec::new(),
            item_map: FxHashMap::default(),
        }
    }
}

impl<T: Clone + Eq + Hash, Key: InternKey> InternTable<T, Key> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the key for `item`, inserting it if unseen. The boolean is
    /// `true` when the item was newly inserted.
    pub fn intern_full(&mut self, item: T) -> (Key, bool) {
        if let Some(&idx) = self.item_map.get(&item) {
            return (idx, false);
        }
        let idx = Key::from(self.items.len());
        self.items.push(item.clone());
        self.item_map.insert(item, idx);
        (idx, true)
    }

    pub fn intern(&mut self, item: T) -> Key {
        self.intern_full(item).0
    }

    pub fn get(&self, item: &T) -> Option<Key> {
        self.item_map.get(item).copied()
    }

    pub fn resolve(&self, idx: Key) -> Option<&T> {
        self.items.get(idx.into())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
