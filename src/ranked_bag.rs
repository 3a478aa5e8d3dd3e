use core::fmt;
use core::ops::RangeBounds;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::comparator::{Comparator, Natural};
use crate::cursor::Cursor;
use crate::error::{Error, Result};
use crate::iter::Keys;
use crate::persist::{self, Snapshot};
use crate::ranked_multimap::RankedMultiMap;
use crate::ranked_set::{IntoIter, Iter};

mod order_statistic;

/// An ordered multiset with `O(log n)` access by rank.
///
/// Equal items are all kept, in the order they were inserted. Ranks count
/// every copy, so a bag holding `[1, 1, 2]` has `2` at rank 2.
///
/// # Examples
///
/// ```
/// use ranked_tree::RankedBag;
///
/// let mut scores = RankedBag::new();
/// scores.extend([70, 85, 70, 92, 70]);
///
/// assert_eq!(scores.len(), 5);
/// assert_eq!(scores.count_of(&70), 3);
/// assert_eq!(scores.rank_of(&85), Ok(3));
///
/// // The median is just the middle rank.
/// assert_eq!(scores.get_by_rank(scores.len() / 2), Some(&70));
///
/// assert!(scores.remove_one(&70));
/// assert_eq!(scores.remove_all(&70), 2);
/// assert_eq!(scores.iter().copied().collect::<Vec<_>>(), [85, 92]);
/// ```
pub struct RankedBag<T, C = Natural> {
    map: RankedMultiMap<T, (), C>,
}

impl<T> RankedBag<T> {
    /// Makes a new, empty `RankedBag` ordered by `T`'s [`Ord`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_comparator(Natural)
    }

    /// Makes a new, empty `RankedBag` whose nodes hold up to `capacity` children.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCapacity`] for a capacity outside the accepted range.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        Self::with_capacity_and_comparator(capacity, Natural)
    }
}

impl<T, C> RankedBag<T, C> {
    pub fn with_comparator(comparator: C) -> Self {
        Self {
            map: RankedMultiMap::with_comparator(comparator),
        }
    }

    /// # Errors
    ///
    /// Returns [`Error::InvalidCapacity`] for a capacity outside the accepted range.
    pub fn with_capacity_and_comparator(capacity: usize, comparator: C) -> Result<Self> {
        Ok(Self {
            map: RankedMultiMap::with_capacity_and_comparator(capacity, comparator)?,
        })
    }

    /// Number of items, counting every copy.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    #[must_use]
    pub const fn node_capacity(&self) -> usize {
        self.map.node_capacity()
    }

    #[must_use]
    pub const fn comparator(&self) -> &C {
        self.map.comparator()
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.map.height()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }

    #[must_use]
    pub fn first(&self) -> Option<&T> {
        self.map.first_key_value().map(|(k, ())| k)
    }

    #[must_use]
    pub fn last(&self) -> Option<&T> {
        self.map.last_key_value().map(|(k, ())| k)
    }

    pub fn iter(&self) -> Iter<'_, T> {
        self.map.keys()
    }

    pub fn cursor(&self) -> Cursor {
        self.map.cursor()
    }

    pub fn cursor_back(&self) -> Cursor {
        self.map.cursor_back()
    }

    /// Returns the item under `cursor` and moves the cursor past it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StaleCursor`] if the bag changed since the cursor was
    /// created.
    pub fn advance(&self, cursor: &mut Cursor) -> Result<Option<&T>> {
        Ok(self.map.advance(cursor)?.map(|(k, ())| k))
    }
}

impl<T: Clone, C> RankedBag<T, C> {
    pub fn pop_first(&mut self) -> Option<T> {
        self.map.pop_first().map(|(k, ())| k)
    }

    pub fn pop_last(&mut self) -> Option<T> {
        self.map.pop_last().map(|(k, ())| k)
    }

    pub fn retain<F>(&mut self, mut f: F)
    where
        F: FnMut(&T) -> bool,
    {
        self.map.retain(|k, ()| f(k));
    }
}

impl<T, C: Comparator<T>> RankedBag<T, C> {
    pub fn contains(&self, value: &T) -> bool {
        self.map.contains_key(value)
    }

    /// Number of items equal to `value`.
    pub fn count_of(&self, value: &T) -> usize {
        self.map.count_of(value)
    }

    /// # Panics
    ///
    /// Panics if range `start > end`, or if `start == end` and both bounds are `Excluded`.
    pub fn range<R: RangeBounds<T>>(&self, range: R) -> Iter<'_, T> {
        Keys(self.map.range(range))
    }

    /// Iterates the items with `low <= item < high`, including every copy of `low`.
    pub fn elements_between(&self, low: &T, high: &T) -> Iter<'_, T> {
        Keys(self.map.elements_between(low, high))
    }

    pub fn elements_from(&self, low: &T) -> Iter<'_, T> {
        Keys(self.map.elements_from(low))
    }

    /// # Errors
    ///
    /// Returns [`Error::Corrupt`] describing the first violation found.
    pub fn check_invariants(&self) -> Result<()> {
        self.map.check_invariants()
    }

    /// Checks that `snapshot` describes a valid bag: non-descending items and
    /// a supported capacity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCapacity`] or [`Error::InvalidSnapshot`].
    pub fn validate_snapshot(snapshot: &Snapshot<T, C>) -> Result<()> {
        snapshot.check(|item| item, false)
    }
}

impl<T: Clone, C: Comparator<T>> RankedBag<T, C> {
    /// Adds a copy of `value` after any equal items and returns its rank.
    pub fn insert(&mut self, value: T) -> usize {
        self.map.insert(value, ())
    }

    /// Removes the first item equal to `value`, returning whether one was present.
    pub fn remove_one(&mut self, value: &T) -> bool {
        self.map.remove_one(value).is_some()
    }

    /// Removes every item equal to `value`, returning how many were removed.
    pub fn remove_all(&mut self, value: &T) -> usize {
        self.map.remove_all(value)
    }

    /// Rebuilds a bag from a snapshot after validating it.
    ///
    /// # Errors
    ///
    /// Returns the error [`validate_snapshot`](Self::validate_snapshot) reports.
    pub fn restore(snapshot: Snapshot<T, C>) -> Result<Self> {
        Self::validate_snapshot(&snapshot)?;
        let raw = snapshot.into_tree(|item| (item, ()))?;
        Ok(Self {
            map: RankedMultiMap { raw },
        })
    }
}

impl<T: Clone, C: Clone> RankedBag<T, C> {
    #[must_use]
    pub fn snapshot(&self) -> Snapshot<T, C> {
        Snapshot {
            capacity: self.node_capacity(),
            comparator: self.comparator().clone(),
            entries: self.iter().cloned().collect(),
        }
    }
}

impl<T: fmt::Debug, C> RankedBag<T, C> {
    #[must_use]
    pub fn dump_structure(&self) -> alloc::string::String {
        self.map.dump_structure()
    }
}

impl<T: Clone, C: Clone> Clone for RankedBag<T, C> {
    fn clone(&self) -> Self {
        Self { map: self.map.clone() }
    }
}

impl<T: PartialEq, C> PartialEq for RankedBag<T, C> {
    fn eq(&self, other: &Self) -> bool {
        self.map.eq(&other.map)
    }
}

impl<T: Eq, C> Eq for RankedBag<T, C> {}

impl<T: fmt::Debug, C> fmt::Debug for RankedBag<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T, C: Default> Default for RankedBag<T, C> {
    fn default() -> Self {
        Self::with_comparator(C::default())
    }
}

impl<T: Clone, C: Comparator<T> + Default> FromIterator<T> for RankedBag<T, C> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut bag = Self::default();
        bag.extend(iter);
        bag
    }
}

impl<T: Clone, C: Comparator<T>> Extend<T> for RankedBag<T, C> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.insert(item);
        }
    }
}

impl<'a, T: 'a + Copy, C: Comparator<T>> Extend<&'a T> for RankedBag<T, C> {
    fn extend<I: IntoIterator<Item = &'a T>>(&mut self, iter: I) {
        self.extend(iter.into_iter().copied());
    }
}

impl<T: Ord + Clone, const N: usize> From<[T; N]> for RankedBag<T> {
    fn from(arr: [T; N]) -> Self {
        arr.into_iter().collect()
    }
}

impl<'a, T, C> IntoIterator for &'a RankedBag<T, C> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}

impl<T, C> IntoIterator for RankedBag<T, C> {
    type Item = T;
    type IntoIter = IntoIter<T>;

    fn into_iter(self) -> IntoIter<T> {
        self.map.into_keys()
    }
}

impl<T: Serialize, C: Serialize> Serialize for RankedBag<T, C> {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        persist::serialize_tree(serializer, self.node_capacity(), self.comparator(), self.iter())
    }
}

impl<'de, T, C> Deserialize<'de> for RankedBag<T, C>
where
    T: Deserialize<'de> + Clone,
    C: Deserialize<'de> + Comparator<T>,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        let snapshot = Snapshot::<T, C>::deserialize(deserializer)?;
        Self::restore(snapshot).map_err(D::Error::custom)
    }
}

impl<T: Clone, C: Comparator<T>> TryFrom<Snapshot<T, C>> for RankedBag<T, C> {
    type Error = Error;

    fn try_from(snapshot: Snapshot<T, C>) -> Result<Self> {
        Self::restore(snapshot)
    }
}
