use core::fmt;
use core::ops::RangeBounds;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::comparator::{Comparator, Natural};
use crate::cursor::Cursor;
use crate::error::{Error, Result};
use crate::iter::{IntoIter, IntoKeys, IntoValues, Iter, Keys, Values};
use crate::persist::{self, Snapshot};
use crate::raw::RawTree;

mod order_statistic;

/// An ordered map that allows duplicate keys, with `O(log n)` access by rank.
///
/// Entries with equal keys keep the order they were inserted in: a new
/// entry always goes after every entry whose key compares equal to it. The
/// group of entries sharing a key can be counted, listed or removed in
/// `O(log n)` (plus the size of the group for listing).
///
/// # Examples
///
/// ```
/// use ranked_tree::RankedMultiMap;
///
/// let mut log = RankedMultiMap::new();
/// log.insert(2, "second");
/// log.insert(1, "first");
/// log.insert(2, "second again");
///
/// assert_eq!(log.count_of(&2), 2);
/// assert_eq!(log.get_all(&2).map(|(_, v)| *v).collect::<Vec<_>>(), ["second", "second again"]);
/// assert_eq!(log.rank_of(&2), Ok(1));
///
/// assert_eq!(log.remove_one(&2), Some((2, "second")));
/// assert_eq!(log.get(&2), Some(&"second again"));
/// ```
pub struct RankedMultiMap<K, V, C = Natural> {
    pub(crate) raw: RawTree<K, V, C>,
}

impl<K, V> RankedMultiMap<K, V> {
    /// Makes a new, empty `RankedMultiMap` ordered by `K`'s [`Ord`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_comparator(Natural)
    }

    /// Makes a new, empty `RankedMultiMap` whose nodes hold up to `capacity` children.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCapacity`] for a capacity outside the accepted range.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        Self::with_capacity_and_comparator(capacity, Natural)
    }
}

impl<K, V, C> RankedMultiMap<K, V, C> {
    /// Makes a new, empty `RankedMultiMap` ordered by `comparator`.
    pub fn with_comparator(comparator: C) -> Self {
        Self {
            raw: RawTree::with_comparator(comparator),
        }
    }

    /// Makes a new, empty `RankedMultiMap` with both a node capacity and a comparator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCapacity`] for a capacity outside the accepted range.
    pub fn with_capacity_and_comparator(capacity: usize, comparator: C) -> Result<Self> {
        Ok(Self {
            raw: RawTree::new(capacity, comparator)?,
        })
    }

    /// Returns the number of entries, counting every duplicate.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.raw.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    #[must_use]
    pub const fn node_capacity(&self) -> usize {
        self.raw.capacity()
    }

    #[must_use]
    pub const fn comparator(&self) -> &C {
        self.raw.comparator()
    }

    /// Number of tree levels, counting the leaves.
    #[must_use]
    pub fn height(&self) -> usize {
        self.raw.height()
    }

    pub fn clear(&mut self) {
        self.raw.clear();
    }

    #[must_use]
    pub fn first_key_value(&self) -> Option<(&K, &V)> {
        self.raw.first()
    }

    #[must_use]
    pub fn last_key_value(&self) -> Option<(&K, &V)> {
        self.raw.last()
    }

    /// Gets an iterator over the entries, sorted by key and then by insertion order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter::new(&self.raw, 0, self.len())
    }

    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys(self.iter())
    }

    pub fn values(&self) -> Values<'_, K, V> {
        Values(self.iter())
    }

    pub fn into_keys(self) -> IntoKeys<K, V> {
        IntoKeys(self.raw.into_entries().into_iter())
    }

    pub fn into_values(self) -> IntoValues<K, V> {
        IntoValues(self.raw.into_entries().into_iter())
    }

    /// Creates a detached cursor at the first entry, moving forward.
    pub fn cursor(&self) -> Cursor {
        Cursor::first(&self.raw)
    }

    /// Creates a detached cursor at the last entry, moving backward.
    pub fn cursor_back(&self) -> Cursor {
        Cursor::last(&self.raw)
    }

    /// Returns the entry under `cursor` and moves the cursor past it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StaleCursor`] if the map changed structurally since
    /// the cursor was created.
    pub fn advance(&self, cursor: &mut Cursor) -> Result<Option<(&K, &V)>> {
        cursor.advance(&self.raw)
    }
}

impl<K: Clone, V, C> RankedMultiMap<K, V, C> {
    pub fn pop_first(&mut self) -> Option<(K, V)> {
        self.raw.pop_first()
    }

    pub fn pop_last(&mut self) -> Option<(K, V)> {
        self.raw.pop_last()
    }

    /// Retains only the entries specified by the predicate.
    pub fn retain<F>(&mut self, f: F)
    where
        F: FnMut(&K, &mut V) -> bool,
    {
        self.raw.retain(f);
    }
}

impl<K, V, C: Comparator<K>> RankedMultiMap<K, V, C> {
    /// Returns the value of the first entry with this key.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.raw.get(key).map(|(_, v)| v)
    }

    /// Returns the value of the first entry with this key, mutably.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.raw.get_mut(key)
    }

    /// Iterates every entry with this key, in insertion order.
    ///
    /// # Complexity
    ///
    /// O(log n + k) for `k` matching entries.
    pub fn get_all(&self, key: &K) -> Iter<'_, K, V> {
        let start = self.raw.lower_rank(key);
        Iter::new(&self.raw, start, self.raw.upper_rank(key))
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.raw.contains(key)
    }

    /// Number of entries with this key.
    ///
    /// # Complexity
    ///
    /// O(log n) - two boundary descents.
    pub fn count_of(&self, key: &K) -> usize {
        self.raw.count_of(key)
    }

    /// Constructs a double-ended iterator over a sub-range of entries.
    ///
    /// A bound that falls inside a group of equal keys includes or excludes
    /// the whole group.
    ///
    /// # Panics
    ///
    /// Panics if range `start > end`, or if `start == end` and both bounds are `Excluded`.
    pub fn range<R: RangeBounds<K>>(&self, range: R) -> Iter<'_, K, V> {
        let (start, end) = self.raw.checked_rank_bounds(&range);
        Iter::new(&self.raw, start, end)
    }

    /// Iterates the entries with `low <= key < high`, starting at the first
    /// entry equal to `low`.
    pub fn elements_between(&self, low: &K, high: &K) -> Iter<'_, K, V> {
        Iter::new(&self.raw, self.raw.lower_rank(low), self.raw.lower_rank(high))
    }

    /// Iterates the entries with `low <= key`.
    pub fn elements_from(&self, low: &K) -> Iter<'_, K, V> {
        Iter::new(&self.raw, self.raw.lower_rank(low), self.len())
    }

    /// Verifies the structural invariants of the underlying tree.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupt`] describing the first violation found.
    pub fn check_invariants(&self) -> Result<()> {
        self.raw.check_invariants(false)
    }

    /// Checks that `snapshot` describes a valid multimap without building it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCapacity`] or [`Error::InvalidSnapshot`].
    pub fn validate_snapshot(snapshot: &Snapshot<(K, V), C>) -> Result<()> {
        snapshot.check(|(key, _)| key, false)
    }
}

impl<K: Clone, V, C: Comparator<K>> RankedMultiMap<K, V, C> {
    /// Inserts an entry after every entry with an equal key and returns its rank.
    ///
    /// # Examples
    ///
    /// ```
    /// use ranked_tree::RankedMultiMap;
    ///
    /// let mut map = RankedMultiMap::new();
    /// assert_eq!(map.insert("b", 1), 0);
    /// assert_eq!(map.insert("a", 2), 0);
    /// assert_eq!(map.insert("b", 3), 2);
    /// ```
    pub fn insert(&mut self, key: K, value: V) -> usize {
        self.raw.insert_multi(key, value)
    }

    /// Removes the first (lowest-ranked) entry with this key.
    pub fn remove_one(&mut self, key: &K) -> Option<(K, V)> {
        self.raw.remove_first(key).map(|(_, k, v)| (k, v))
    }

    /// Removes every entry with this key, returning how many were removed.
    pub fn remove_all(&mut self, key: &K) -> usize {
        self.raw.remove_all(key)
    }

    /// Rebuilds a multimap from a snapshot after validating it. Equal keys
    /// keep their order in the snapshot.
    ///
    /// # Errors
    ///
    /// Returns the error [`validate_snapshot`](Self::validate_snapshot) reports.
    pub fn restore(snapshot: Snapshot<(K, V), C>) -> Result<Self> {
        Self::validate_snapshot(&snapshot)?;
        Ok(Self {
            raw: snapshot.into_tree(|entry| entry)?,
        })
    }
}

impl<K: Clone, V: Clone, C: Clone> RankedMultiMap<K, V, C> {
    /// Copies the multimap's persisted state out.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot<(K, V), C> {
        Snapshot {
            capacity: self.node_capacity(),
            comparator: self.comparator().clone(),
            entries: self.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        }
    }
}

impl<K: fmt::Debug, V, C> RankedMultiMap<K, V, C> {
    /// Renders the tree shape one level per line, for debugging.
    #[must_use]
    pub fn dump_structure(&self) -> alloc::string::String {
        self.raw.dump_structure()
    }
}

impl<K: Clone, V: Clone, C: Clone> Clone for RankedMultiMap<K, V, C> {
    fn clone(&self) -> Self {
        Self { raw: self.raw.clone() }
    }
}

impl<K: PartialEq, V: PartialEq, C> PartialEq for RankedMultiMap<K, V, C> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl<K: Eq, V: Eq, C> Eq for RankedMultiMap<K, V, C> {}

impl<K: fmt::Debug, V: fmt::Debug, C> fmt::Debug for RankedMultiMap<K, V, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V, C: Default> Default for RankedMultiMap<K, V, C> {
    fn default() -> Self {
        Self::with_comparator(C::default())
    }
}

impl<K: Clone, V, C: Comparator<K> + Default> FromIterator<(K, V)> for RankedMultiMap<K, V, C> {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = Self::default();
        map.extend(iter);
        map
    }
}

impl<K: Clone, V, C: Comparator<K>> Extend<(K, V)> for RankedMultiMap<K, V, C> {
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl<K: Ord + Clone, V, const N: usize> From<[(K, V); N]> for RankedMultiMap<K, V> {
    fn from(arr: [(K, V); N]) -> Self {
        arr.into_iter().collect()
    }
}

impl<'a, K, V, C> IntoIterator for &'a RankedMultiMap<K, V, C> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Iter<'a, K, V> {
        self.iter()
    }
}

impl<K, V, C> IntoIterator for RankedMultiMap<K, V, C> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V>;

    fn into_iter(self) -> IntoIter<K, V> {
        IntoIter(self.raw.into_entries().into_iter())
    }
}

impl<K: Serialize, V: Serialize, C: Serialize> Serialize for RankedMultiMap<K, V, C> {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        persist::serialize_tree(serializer, self.node_capacity(), self.comparator(), self.iter())
    }
}

impl<'de, K, V, C> Deserialize<'de> for RankedMultiMap<K, V, C>
where
    K: Deserialize<'de> + Clone,
    V: Deserialize<'de>,
    C: Deserialize<'de> + Comparator<K>,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        let snapshot = Snapshot::<(K, V), C>::deserialize(deserializer)?;
        Self::restore(snapshot).map_err(D::Error::custom)
    }
}

impl<K: Clone, V, C: Comparator<K>> TryFrom<Snapshot<(K, V), C>> for RankedMultiMap<K, V, C> {
    type Error = Error;

    fn try_from(snapshot: Snapshot<(K, V), C>) -> Result<Self> {
        Self::restore(snapshot)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    fn values(map: &RankedMultiMap<i32, i32>) -> Vec<i32> {
        map.values().copied().collect()
    }

    #[test]
    fn groups_straddle_leaves() {
        let mut map = RankedMultiMap::with_capacity(4).unwrap();
        for value in 0..30 {
            map.insert(value % 3, value);
        }
        map.check_invariants().unwrap();
        assert_eq!(map.count_of(&1), 10);
        assert_eq!(map.rank_of(&1), Ok(10));
        assert_eq!(map.rank_of(&5), Err(30));
        let ones: Vec<i32> = map.get_all(&1).map(|(_, v)| *v).collect();
        assert_eq!(ones, (0..30).filter(|v| v % 3 == 1).collect::<Vec<_>>());

        assert_eq!(map.remove_all(&1), 10);
        assert_eq!(map.count_of(&1), 0);
        assert_eq!(map.remove_all(&1), 0);
        map.check_invariants().unwrap();
        assert_eq!(map.len(), 20);
    }

    #[test]
    fn remove_one_takes_the_oldest() {
        let mut map = RankedMultiMap::with_capacity(5).unwrap();
        for value in 0..12 {
            map.insert(7, value);
        }
        for expected in 0..12 {
            assert_eq!(map.remove_one(&7), Some((7, expected)));
            map.check_invariants().unwrap();
        }
        assert_eq!(map.remove_one(&7), None);
        assert!(values(&map).is_empty());
    }

    #[test]
    fn range_bounds_cover_whole_groups() {
        let map: RankedMultiMap<i32, i32> = [(1, 0), (2, 1), (2, 2), (2, 3), (3, 4)].into_iter().collect();
        let values = |iter: Iter<'_, i32, i32>| iter.map(|(_, v)| *v).collect::<Vec<_>>();
        assert_eq!(values(map.range(2..3)), [1, 2, 3]);
        assert_eq!(values(map.range(..=2)), [0, 1, 2, 3]);
        assert_eq!(values(map.range((core::ops::Bound::Excluded(2), core::ops::Bound::Unbounded))), [4]);
        assert_eq!(values(map.elements_between(&2, &3)), [1, 2, 3]);
        assert_eq!(values(map.elements_from(&2)), [1, 2, 3, 4]);
    }
}
