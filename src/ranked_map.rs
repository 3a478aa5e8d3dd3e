use core::fmt;
use core::ops::{Index, RangeBounds};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::comparator::{Comparator, Natural};
use crate::cursor::Cursor;
use crate::error::{Error, Result};
use crate::iter::{IntoIter, IntoKeys, IntoValues, Iter, Keys, Values};
use crate::persist::{self, Snapshot};
use crate::raw::{Insertion, OnDuplicate, RawTree};

mod order_statistic;

/// An ordered map with unique keys and `O(log n)` access by rank.
///
/// Entries are kept in the order given by the map's [`Comparator`] (the
/// key type's [`Ord`] by default). On top of the usual ordered-map
/// operations the map answers "which entry is `n`-th?" and "how many keys
/// sort before this one?" in logarithmic time, because every branch of the
/// underlying B+Tree records how many entries sit below each child.
///
/// # Examples
///
/// ```
/// use ranked_tree::{RankedMap, Rank};
///
/// let mut scores = RankedMap::new();
/// scores.insert("carol", 92);
/// scores.insert("alice", 100);
/// scores.insert("bob", 85);
///
/// assert_eq!(scores.get(&"bob"), Some(&85));
/// assert_eq!(scores.get_by_rank(1), Some((&"bob", &85)));
/// assert_eq!(scores.rank_of(&"carol"), Ok(2));
/// assert_eq!(scores.rank_of(&"bert"), Err(1));
/// assert_eq!(scores[Rank(0)], 100);
///
/// // Upserts return the replaced value; `try_insert` refuses instead.
/// assert_eq!(scores.insert("bob", 88), Some(85));
/// assert!(scores.try_insert("bob", 0).is_err());
/// ```
///
/// A map with a known list of items can be initialized from an array:
///
/// ```
/// use ranked_tree::RankedMap;
///
/// let planets = RankedMap::from([("Mercury", 0.4), ("Venus", 0.7), ("Earth", 1.0)]);
/// assert_eq!(planets.keys().copied().collect::<Vec<_>>(), ["Earth", "Mercury", "Venus"]);
/// ```
pub struct RankedMap<K, V, C = Natural> {
    pub(crate) raw: RawTree<K, V, C>,
}

impl<K, V> RankedMap<K, V> {
    /// Makes a new, empty `RankedMap` ordered by `K`'s [`Ord`], with
    /// [`DEFAULT_CAPACITY`](crate::DEFAULT_CAPACITY).
    ///
    /// Does not allocate anything beyond the empty root leaf.
    #[must_use]
    pub fn new() -> Self {
        Self::with_comparator(Natural)
    }

    /// Makes a new, empty `RankedMap` whose nodes hold up to `capacity` children.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCapacity`] unless `capacity` lies within
    /// [`MIN_CAPACITY`](crate::MIN_CAPACITY)`..=`[`MAX_CAPACITY`](crate::MAX_CAPACITY).
    ///
    /// # Examples
    ///
    /// ```
    /// use ranked_tree::RankedMap;
    ///
    /// assert!(RankedMap::<i32, i32>::with_capacity(4).is_ok());
    /// assert!(RankedMap::<i32, i32>::with_capacity(3).is_err());
    /// ```
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        Self::with_capacity_and_comparator(capacity, Natural)
    }
}

impl<K, V, C> RankedMap<K, V, C> {
    /// Makes a new, empty `RankedMap` ordered by `comparator`.
    pub fn with_comparator(comparator: C) -> Self {
        Self {
            raw: RawTree::with_comparator(comparator),
        }
    }

    /// Makes a new, empty `RankedMap` with both a node capacity and a comparator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCapacity`] for a capacity outside the accepted range.
    pub fn with_capacity_and_comparator(capacity: usize, comparator: C) -> Result<Self> {
        Ok(Self {
            raw: RawTree::new(capacity, comparator)?,
        })
    }

    /// Returns the number of elements in the map.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.raw.len()
    }

    /// Returns `true` if the map contains no elements.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Returns the node capacity the map was built with.
    #[must_use]
    pub const fn node_capacity(&self) -> usize {
        self.raw.capacity()
    }

    /// Returns the comparator ordering the keys.
    #[must_use]
    pub const fn comparator(&self) -> &C {
        self.raw.comparator()
    }

    /// Number of tree levels, counting the leaves. An empty map has height 1.
    #[must_use]
    pub fn height(&self) -> usize {
        self.raw.height()
    }

    /// Clears the map, removing all elements.
    ///
    /// # Examples
    ///
    /// ```
    /// use ranked_tree::RankedMap;
    ///
    /// let mut a = RankedMap::new();
    /// a.insert(1, "a");
    /// a.clear();
    /// assert!(a.is_empty());
    /// ```
    pub fn clear(&mut self) {
        self.raw.clear();
    }

    /// Returns the first key-value pair in the map.
    ///
    /// # Complexity
    ///
    /// O(1) - uses the cached first leaf.
    #[must_use]
    pub fn first_key_value(&self) -> Option<(&K, &V)> {
        self.raw.first()
    }

    /// Returns the last key-value pair in the map.
    ///
    /// # Complexity
    ///
    /// O(1) - uses the cached last leaf.
    #[must_use]
    pub fn last_key_value(&self) -> Option<(&K, &V)> {
        self.raw.last()
    }

    /// Gets an iterator over the entries of the map, sorted by key.
    ///
    /// # Examples
    ///
    /// ```
    /// use ranked_tree::RankedMap;
    ///
    /// let map = RankedMap::from([(3, "c"), (2, "b"), (1, "a")]);
    /// let (first_key, first_value) = map.iter().next().unwrap();
    /// assert_eq!((*first_key, *first_value), (1, "a"));
    ///
    /// // Skipping repositions by rank instead of stepping.
    /// assert_eq!(map.iter().rev().skip(1).next(), Some((&2, &"b")));
    /// ```
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter::new(&self.raw, 0, self.len())
    }

    /// Gets an iterator over the keys of the map, in sorted order.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys(self.iter())
    }

    /// Gets an iterator over the values of the map, in order by key.
    pub fn values(&self) -> Values<'_, K, V> {
        Values(self.iter())
    }

    /// Creates a consuming iterator visiting all the keys, in sorted order.
    pub fn into_keys(self) -> IntoKeys<K, V> {
        IntoKeys(self.raw.into_entries().into_iter())
    }

    /// Creates a consuming iterator visiting all the values, in order by key.
    pub fn into_values(self) -> IntoValues<K, V> {
        IntoValues(self.raw.into_entries().into_iter())
    }

    /// Creates a detached cursor at the first entry, moving forward.
    ///
    /// The cursor does not borrow the map; pass it back to
    /// [`advance`](Self::advance) to read entries. Any structural change to
    /// the map in between makes the next advance fail.
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
    /// the cursor was created, or if the cursor belongs to another collection.
    ///
    /// # Examples
    ///
    /// ```
    /// use ranked_tree::{Error, RankedMap};
    ///
    /// let mut map = RankedMap::from([(1, "a"), (2, "b")]);
    /// let mut cursor = map.cursor_back();
    /// assert_eq!(map.advance(&mut cursor), Ok(Some((&2, &"b"))));
    ///
    /// // Replacing a value is not a structural change.
    /// map.insert(1, "z");
    /// assert_eq!(map.advance(&mut cursor), Ok(Some((&1, &"z"))));
    /// assert_eq!(map.advance(&mut cursor), Ok(None));
    ///
    /// map.remove(&1);
    /// assert_eq!(map.advance(&mut cursor), Err(Error::StaleCursor));
    /// ```
    pub fn advance(&self, cursor: &mut Cursor) -> Result<Option<(&K, &V)>> {
        cursor.advance(&self.raw)
    }
}

impl<K: Clone, V, C> RankedMap<K, V, C> {
    /// Removes and returns the first element in the map.
    ///
    /// # Examples
    ///
    /// ```
    /// use ranked_tree::RankedMap;
    ///
    /// let mut map = RankedMap::from([(1, "a"), (2, "b")]);
    /// while let Some((key, _val)) = map.pop_first() {
    ///     assert!(map.iter().all(|(k, _v)| *k > key));
    /// }
    /// assert!(map.is_empty());
    /// ```
    pub fn pop_first(&mut self) -> Option<(K, V)> {
        self.raw.pop_first()
    }

    /// Removes and returns the last element in the map.
    pub fn pop_last(&mut self) -> Option<(K, V)> {
        self.raw.pop_last()
    }

    /// Retains only the elements specified by the predicate.
    ///
    /// # Examples
    ///
    /// ```
    /// use ranked_tree::RankedMap;
    ///
    /// let mut map: RankedMap<i32, i32> = (0..8).map(|x| (x, x * 10)).collect();
    /// // Keep only the elements with even-numbered keys.
    /// map.retain(|&k, _| k % 2 == 0);
    /// assert!(map.into_iter().eq(vec![(0, 0), (2, 20), (4, 40), (6, 60)]));
    /// ```
    pub fn retain<F>(&mut self, f: F)
    where
        F: FnMut(&K, &mut V) -> bool,
    {
        self.raw.retain(f);
    }
}

impl<K, V, C: Comparator<K>> RankedMap<K, V, C> {
    /// Returns a reference to the value corresponding to the key.
    ///
    /// # Complexity
    ///
    /// O(log n)
    pub fn get(&self, key: &K) -> Option<&V> {
        self.raw.get(key).map(|(_, v)| v)
    }

    /// Returns the key-value pair corresponding to the supplied key.
    pub fn get_key_value(&self, key: &K) -> Option<(&K, &V)> {
        self.raw.get(key)
    }

    /// Returns a mutable reference to the value corresponding to the key.
    ///
    /// Changing a value in place does not invalidate cursors.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.raw.get_mut(key)
    }

    /// Returns `true` if the map contains a value for the specified key.
    pub fn contains_key(&self, key: &K) -> bool {
        self.raw.contains(key)
    }

    /// Constructs a double-ended iterator over a sub-range of elements in the map.
    ///
    /// Both ends are resolved to ranks in `O(log n)`; the iterator then walks
    /// the leaf chain, so a range of `k` elements costs `O(log n + k)`.
    ///
    /// # Panics
    ///
    /// Panics if range `start > end`, or if `start == end` and both bounds are `Excluded`.
    ///
    /// # Examples
    ///
    /// ```
    /// use ranked_tree::RankedMap;
    ///
    /// let map = RankedMap::from([(3, "a"), (5, "b"), (8, "c")]);
    /// let keys: Vec<_> = map.range(4..=8).map(|(k, _)| *k).collect();
    /// assert_eq!(keys, [5, 8]);
    /// ```
    pub fn range<R: RangeBounds<K>>(&self, range: R) -> Iter<'_, K, V> {
        let (start, end) = self.raw.checked_rank_bounds(&range);
        Iter::new(&self.raw, start, end)
    }

    /// Iterates the entries with `low <= key < high`. Yields nothing when
    /// `high` does not sort after `low`.
    pub fn elements_between(&self, low: &K, high: &K) -> Iter<'_, K, V> {
        let start = self.raw.lower_rank(low);
        let end = self.raw.lower_rank(high);
        Iter::new(&self.raw, start, end)
    }

    /// Iterates the entries with `low <= key`.
    pub fn elements_from(&self, low: &K) -> Iter<'_, K, V> {
        Iter::new(&self.raw, self.raw.lower_rank(low), self.len())
    }

    /// Verifies the structural invariants of the underlying tree.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupt`] describing the first violation found. This
    /// indicates a bug in the tree or a comparator that is not a total order.
    pub fn check_invariants(&self) -> Result<()> {
        self.raw.check_invariants(true)
    }

    /// Checks that `snapshot` describes a valid map without building it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCapacity`] or [`Error::InvalidSnapshot`].
    pub fn validate_snapshot(snapshot: &Snapshot<(K, V), C>) -> Result<()> {
        snapshot.check(|(key, _)| key, true)
    }
}

impl<K: Clone, V, C: Comparator<K>> RankedMap<K, V, C> {
    /// Inserts a key-value pair into the map.
    ///
    /// If the map did not have this key present, `None` is returned.
    /// If it did, the value is updated and the old value is returned; the
    /// key itself is not updated.
    ///
    /// # Complexity
    ///
    /// O(log n)
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        match self.raw.insert_unique(key, value, OnDuplicate::Replace) {
            Insertion::Replaced { old, .. } => Some(old),
            Insertion::Inserted { .. } | Insertion::Rejected { .. } => None,
        }
    }

    /// Inserts a key-value pair only if the key is absent, returning its rank.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateKey`] with the rank of the existing entry,
    /// leaving the map untouched.
    ///
    /// # Examples
    ///
    /// ```
    /// use ranked_tree::{Error, RankedMap};
    ///
    /// let mut map = RankedMap::new();
    /// assert_eq!(map.try_insert(20, "b"), Ok(0));
    /// assert_eq!(map.try_insert(10, "a"), Ok(0));
    /// assert_eq!(map.try_insert(20, "c"), Err(Error::DuplicateKey { rank: 1 }));
    /// assert_eq!(map[&20], "b");
    /// ```
    pub fn try_insert(&mut self, key: K, value: V) -> Result<usize> {
        match self.raw.insert_unique(key, value, OnDuplicate::Reject) {
            Insertion::Inserted { rank } => Ok(rank),
            Insertion::Rejected { rank, .. } | Insertion::Replaced { rank, .. } => Err(Error::DuplicateKey { rank }),
        }
    }

    /// Removes a key from the map, returning the value at the key if the key
    /// was previously in the map.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.remove_entry(key).map(|(_, v)| v)
    }

    /// Removes a key from the map, returning the stored key and value if the
    /// key was previously in the map.
    pub fn remove_entry(&mut self, key: &K) -> Option<(K, V)> {
        self.raw.remove_first(key).map(|(_, k, v)| (k, v))
    }

    /// Rebuilds a map from a snapshot after validating it.
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

impl<K: Clone, V: Clone, C: Clone> RankedMap<K, V, C> {
    /// Copies the map's persisted state out.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot<(K, V), C> {
        Snapshot {
            capacity: self.node_capacity(),
            comparator: self.comparator().clone(),
            entries: self.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        }
    }
}

impl<K: fmt::Debug, V, C> RankedMap<K, V, C> {
    /// Renders the tree shape one level per line, for debugging. The format
    /// is not stable.
    #[must_use]
    pub fn dump_structure(&self) -> alloc::string::String {
        self.raw.dump_structure()
    }
}

impl<K: Clone, V: Clone, C: Clone> Clone for RankedMap<K, V, C> {
    fn clone(&self) -> Self {
        Self { raw: self.raw.clone() }
    }
}

impl<K: PartialEq, V: PartialEq, C> PartialEq for RankedMap<K, V, C> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl<K: Eq, V: Eq, C> Eq for RankedMap<K, V, C> {}

impl<K: fmt::Debug, V: fmt::Debug, C> fmt::Debug for RankedMap<K, V, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V, C: Default> Default for RankedMap<K, V, C> {
    /// Creates an empty `RankedMap` with the default comparator and capacity.
    fn default() -> Self {
        Self::with_comparator(C::default())
    }
}

impl<K: Clone, V, C: Comparator<K> + Default> FromIterator<(K, V)> for RankedMap<K, V, C> {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = Self::default();
        map.extend(iter);
        map
    }
}

impl<K: Clone, V, C: Comparator<K>> Extend<(K, V)> for RankedMap<K, V, C> {
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl<K: Ord + Clone, V, const N: usize> From<[(K, V); N]> for RankedMap<K, V> {
    /// Converts a `[(K, V); N]` into a `RankedMap<K, V>`. Later entries
    /// overwrite earlier ones with the same key.
    fn from(arr: [(K, V); N]) -> Self {
        arr.into_iter().collect()
    }
}

impl<'a, K, V, C> IntoIterator for &'a RankedMap<K, V, C> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Iter<'a, K, V> {
        self.iter()
    }
}

impl<K, V, C> IntoIterator for RankedMap<K, V, C> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V>;

    /// Gets an owning iterator over the entries of the map, sorted by key.
    fn into_iter(self) -> IntoIter<K, V> {
        IntoIter(self.raw.into_entries().into_iter())
    }
}

impl<K, V, C: Comparator<K>> Index<&K> for RankedMap<K, V, C> {
    type Output = V;

    /// Returns a reference to the value corresponding to the supplied key.
    ///
    /// # Panics
    ///
    /// Panics if the key is not present in the `RankedMap`.
    #[inline]
    fn index(&self, key: &K) -> &V {
        self.get(key).expect("no entry found for key")
    }
}

impl<K: Serialize, V: Serialize, C: Serialize> Serialize for RankedMap<K, V, C> {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        persist::serialize_tree(serializer, self.node_capacity(), self.comparator(), self.iter())
    }
}

impl<'de, K, V, C> Deserialize<'de> for RankedMap<K, V, C>
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

impl<K: Clone, V, C: Comparator<K>> TryFrom<Snapshot<(K, V), C>> for RankedMap<K, V, C> {
    type Error = Error;

    fn try_from(snapshot: Snapshot<(K, V), C>) -> Result<Self> {
        Self::restore(snapshot)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::comparator::Reverse;
    use alloc::vec::Vec;

    #[test]
    fn reverse_comparator_orders_descending() {
        let mut map = RankedMap::with_capacity_and_comparator(4, Reverse(Natural)).unwrap();
        for key in 0..20 {
            map.insert(key, key * 2);
        }
        map.check_invariants().unwrap();
        assert_eq!(map.first_key_value(), Some((&19, &38)));
        assert_eq!(map.rank_of(&0), Ok(19));
        // Bounds follow the comparator's order, not `Ord`.
        let keys: Vec<i32> = map.range(15..=12).map(|(k, _)| *k).collect();
        assert_eq!(keys, [15, 14, 13, 12]);
    }

    #[test]
    fn elements_between_is_empty_for_inverted_bounds() {
        let map: RankedMap<i32, ()> = (0..10).map(|k| (k, ())).collect();
        assert_eq!(map.elements_between(&7, &3).len(), 0);
        assert_eq!(map.elements_between(&3, &3).len(), 0);
        assert_eq!(map.elements_from(&8).map(|(k, _)| *k).collect::<Vec<_>>(), [8, 9]);
    }

    #[test]
    #[should_panic(expected = "range start is greater than range end")]
    fn inverted_range_panics() {
        let map: RankedMap<i32, ()> = (0..10).map(|k| (k, ())).collect();
        let _ = map.range(5..2);
    }

    #[test]
    fn equality_ignores_shape() {
        let mut small = RankedMap::with_capacity(4).unwrap();
        let mut large = RankedMap::with_capacity(64).unwrap();
        for key in 0..50 {
            small.insert(key, ());
            large.insert(49 - key, ());
        }
        assert_ne!(small.height(), large.height());
        assert_eq!(small, large);
    }
}
