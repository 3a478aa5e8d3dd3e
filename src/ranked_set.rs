use core::fmt;
use core::ops::RangeBounds;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::comparator::{Comparator, Natural};
use crate::cursor::Cursor;
use crate::error::{Error, Result};
use crate::iter::{IntoKeys, Keys};
use crate::persist::{self, Snapshot};
use crate::ranked_map::RankedMap;
use crate::raw::{Insertion, OnDuplicate};

mod order_statistic;

/// An iterator over the items of a [`RankedSet`] or [`RankedBag`](crate::RankedBag).
pub type Iter<'a, T> = Keys<'a, T, ()>;

/// An owning iterator over the items of a [`RankedSet`] or [`RankedBag`](crate::RankedBag).
pub type IntoIter<T> = IntoKeys<T, ()>;

/// An ordered set with `O(log n)` access by rank.
///
/// See [`RankedMap`] for a discussion of the underlying tree. Items are
/// ordered by the set's [`Comparator`]; two items the comparator calls equal
/// are the same item as far as the set is concerned.
///
/// It is a logic error for an item to be modified in such a way that its
/// ordering relative to any other item changes while it is in the set. This
/// is normally only possible through [`Cell`](core::cell::Cell),
/// [`RefCell`](core::cell::RefCell), global state, I/O, or unsafe code.
///
/// # Examples
///
/// ```
/// use ranked_tree::RankedSet;
///
/// let mut books = RankedSet::new();
/// books.insert("A Dance With Dragons");
/// books.insert("To Kill a Mockingbird");
/// books.insert("The Odyssey");
/// books.insert("The Great Gatsby");
///
/// assert!(!books.contains(&"The Winds of Winter"));
/// assert_eq!(books.rank_of(&"The Odyssey"), Ok(2));
///
/// books.remove(&"The Odyssey");
/// assert_eq!(books.get_by_rank(2), Some(&"To Kill a Mockingbird"));
/// ```
pub struct RankedSet<T, C = Natural> {
    pub(crate) map: RankedMap<T, (), C>,
}

impl<T> RankedSet<T> {
    /// Makes a new, empty `RankedSet` ordered by `T`'s [`Ord`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_comparator(Natural)
    }

    /// Makes a new, empty `RankedSet` whose nodes hold up to `capacity` children.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCapacity`] for a capacity outside the accepted range.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        Self::with_capacity_and_comparator(capacity, Natural)
    }
}

impl<T, C> RankedSet<T, C> {
    pub fn with_comparator(comparator: C) -> Self {
        Self {
            map: RankedMap::with_comparator(comparator),
        }
    }

    /// # Errors
    ///
    /// Returns [`Error::InvalidCapacity`] for a capacity outside the accepted range.
    pub fn with_capacity_and_comparator(capacity: usize, comparator: C) -> Result<Self> {
        Ok(Self {
            map: RankedMap::with_capacity_and_comparator(capacity, comparator)?,
        })
    }

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

    /// Clears the set, removing all items.
    pub fn clear(&mut self) {
        self.map.clear();
    }

    /// Returns the smallest item, if any.
    ///
    /// ```
    /// use ranked_tree::RankedSet;
    ///
    /// let set = RankedSet::from([3, 1, 2]);
    /// assert_eq!(set.first(), Some(&1));
    /// assert_eq!(set.last(), Some(&3));
    /// ```
    #[must_use]
    pub fn first(&self) -> Option<&T> {
        self.map.first_key_value().map(|(k, ())| k)
    }

    #[must_use]
    pub fn last(&self) -> Option<&T> {
        self.map.last_key_value().map(|(k, ())| k)
    }

    /// Gets an iterator that visits the items in ascending order.
    ///
    /// ```
    /// use ranked_tree::RankedSet;
    ///
    /// let set = RankedSet::from([3, 1, 2]);
    /// let mut iter = set.iter();
    /// assert_eq!(iter.next(), Some(&1));
    /// assert_eq!(iter.next_back(), Some(&3));
    /// assert_eq!(iter.next(), Some(&2));
    /// assert_eq!(iter.next(), None);
    /// ```
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
    /// Returns [`Error::StaleCursor`] if the set changed structurally since
    /// the cursor was created.
    pub fn advance(&self, cursor: &mut Cursor) -> Result<Option<&T>> {
        Ok(self.map.advance(cursor)?.map(|(k, ())| k))
    }
}

impl<T: Clone, C> RankedSet<T, C> {
    pub fn pop_first(&mut self) -> Option<T> {
        self.map.pop_first().map(|(k, ())| k)
    }

    pub fn pop_last(&mut self) -> Option<T> {
        self.map.pop_last().map(|(k, ())| k)
    }

    /// Retains only the items specified by the predicate.
    ///
    /// ```
    /// use ranked_tree::RankedSet;
    ///
    /// let mut set: RankedSet<i32> = (1..=6).collect();
    /// set.retain(|&k| k % 2 == 0);
    /// assert!(set.iter().eq([2, 4, 6].iter()));
    /// ```
    pub fn retain<F>(&mut self, mut f: F)
    where
        F: FnMut(&T) -> bool,
    {
        self.map.retain(|k, ()| f(k));
    }
}

impl<T, C: Comparator<T>> RankedSet<T, C> {
    pub fn contains(&self, value: &T) -> bool {
        self.map.contains_key(value)
    }

    /// Returns the stored item equal to `value`, if any.
    pub fn get(&self, value: &T) -> Option<&T> {
        self.map.get_key_value(value).map(|(k, ())| k)
    }

    /// Constructs a double-ended iterator over a sub-range of items.
    ///
    /// # Panics
    ///
    /// Panics if range `start > end`, or if `start == end` and both bounds are `Excluded`.
    ///
    /// ```
    /// use ranked_tree::RankedSet;
    ///
    /// let set = RankedSet::from([1, 2, 3, 4]);
    /// let mut range = set.range(2..=3);
    /// assert_eq!(range.next(), Some(&2));
    /// assert_eq!(range.next_back(), Some(&3));
    /// assert_eq!(range.next(), None);
    /// ```
    pub fn range<R: RangeBounds<T>>(&self, range: R) -> Iter<'_, T> {
        Keys(self.map.range(range))
    }

    /// Iterates the items with `low <= item < high`. Empty when `high <= low`.
    pub fn elements_between(&self, low: &T, high: &T) -> Iter<'_, T> {
        Keys(self.map.elements_between(low, high))
    }

    /// Iterates the items with `low <= item`.
    pub fn elements_from(&self, low: &T) -> Iter<'_, T> {
        Keys(self.map.elements_from(low))
    }

    /// # Errors
    ///
    /// Returns [`Error::Corrupt`] describing the first violation found.
    pub fn check_invariants(&self) -> Result<()> {
        self.map.check_invariants()
    }

    /// Checks that `snapshot` describes a valid set: strictly ascending items
    /// and a supported capacity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCapacity`] or [`Error::InvalidSnapshot`].
    pub fn validate_snapshot(snapshot: &Snapshot<T, C>) -> Result<()> {
        snapshot.check(|item| item, true)
    }
}

impl<T: Clone, C: Comparator<T>> RankedSet<T, C> {
    /// Adds a value to the set. Returns `false`, leaving the stored item in
    /// place, if an equal item was already present.
    pub fn insert(&mut self, value: T) -> bool {
        matches!(
            self.map.raw.insert_unique(value, (), OnDuplicate::Reject),
            Insertion::Inserted { .. }
        )
    }

    /// Adds a value to the set, replacing and returning an equal stored item.
    ///
    /// ```
    /// use ranked_tree::RankedSet;
    ///
    /// let mut set = RankedSet::new();
    /// set.insert(Vec::<i32>::new());
    ///
    /// assert_eq!(set.get(&vec![]).unwrap().capacity(), 0);
    /// set.replace(Vec::with_capacity(10));
    /// assert_eq!(set.get(&vec![]).unwrap().capacity(), 10);
    /// ```
    pub fn replace(&mut self, value: T) -> Option<T> {
        let replaced = self.take(&value);
        self.insert(value);
        replaced
    }

    /// Removes an item from the set, returning whether it was present.
    pub fn remove(&mut self, value: &T) -> bool {
        self.map.remove(value).is_some()
    }

    /// Removes and returns the stored item equal to `value`.
    pub fn take(&mut self, value: &T) -> Option<T> {
        self.map.remove_entry(value).map(|(k, ())| k)
    }

    /// Rebuilds a set from a snapshot after validating it.
    ///
    /// # Errors
    ///
    /// Returns the error [`validate_snapshot`](Self::validate_snapshot) reports.
    pub fn restore(snapshot: Snapshot<T, C>) -> Result<Self> {
        Self::validate_snapshot(&snapshot)?;
        let raw = snapshot.into_tree(|item| (item, ()))?;
        Ok(Self { map: RankedMap { raw } })
    }
}

impl<T: Clone, C: Clone> RankedSet<T, C> {
    #[must_use]
    pub fn snapshot(&self) -> Snapshot<T, C> {
        Snapshot {
            capacity: self.node_capacity(),
            comparator: self.comparator().clone(),
            entries: self.iter().cloned().collect(),
        }
    }
}

impl<T: fmt::Debug, C> RankedSet<T, C> {
    /// Renders the tree shape one level per line.
    ///
    /// ```
    /// use ranked_tree::RankedSet;
    ///
    /// let set: RankedSet<i32> = (1..=5).fold(RankedSet::with_capacity(4).unwrap(), |mut s, k| {
    ///     s.insert(k);
    ///     s
    /// });
    /// assert_eq!(set.dump_structure(), "[3]\n(1 2 3) (4 5)\n");
    /// ```
    #[must_use]
    pub fn dump_structure(&self) -> alloc::string::String {
        self.map.dump_structure()
    }
}

impl<T: Clone, C: Clone> Clone for RankedSet<T, C> {
    fn clone(&self) -> Self {
        Self { map: self.map.clone() }
    }
}

impl<T: PartialEq, C> PartialEq for RankedSet<T, C> {
    fn eq(&self, other: &Self) -> bool {
        self.map.eq(&other.map)
    }
}

impl<T: Eq, C> Eq for RankedSet<T, C> {}

impl<T: fmt::Debug, C> fmt::Debug for RankedSet<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<T, C: Default> Default for RankedSet<T, C> {
    fn default() -> Self {
        Self::with_comparator(C::default())
    }
}

impl<T: Clone, C: Comparator<T> + Default> FromIterator<T> for RankedSet<T, C> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = Self::default();
        set.extend(iter);
        set
    }
}

impl<T: Clone, C: Comparator<T>> Extend<T> for RankedSet<T, C> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.insert(item);
        }
    }
}

impl<'a, T: 'a + Copy, C: Comparator<T>> Extend<&'a T> for RankedSet<T, C> {
    fn extend<I: IntoIterator<Item = &'a T>>(&mut self, iter: I) {
        self.extend(iter.into_iter().copied());
    }
}

impl<T: Ord + Clone, const N: usize> From<[T; N]> for RankedSet<T> {
    /// Converts a `[T; N]` into a `RankedSet<T>`. Later duplicates are dropped.
    ///
    /// ```
    /// use ranked_tree::RankedSet;
    ///
    /// let set1 = RankedSet::from([1, 2, 3, 4]);
    /// let set2: RankedSet<_> = [1, 2, 3, 4].into();
    /// assert_eq!(set1, set2);
    /// ```
    fn from(arr: [T; N]) -> Self {
        arr.into_iter().collect()
    }
}

impl<'a, T, C> IntoIterator for &'a RankedSet<T, C> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}

impl<T, C> IntoIterator for RankedSet<T, C> {
    type Item = T;
    type IntoIter = IntoIter<T>;

    fn into_iter(self) -> IntoIter<T> {
        self.map.into_keys()
    }
}

impl<T: Serialize, C: Serialize> Serialize for RankedSet<T, C> {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        persist::serialize_tree(serializer, self.node_capacity(), self.comparator(), self.iter())
    }
}

impl<'de, T, C> Deserialize<'de> for RankedSet<T, C>
where
    T: Deserialize<'de> + Clone,
    C: Deserialize<'de> + Comparator<T>,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        let snapshot = Snapshot::<T, C>::deserialize(deserializer)?;
        Self::restore(snapshot).map_err(D::Error::custom)
    }
}

impl<T: Clone, C: Comparator<T>> TryFrom<Snapshot<T, C>> for RankedSet<T, C> {
    type Error = Error;

    fn try_from(snapshot: Snapshot<T, C>) -> Result<Self> {
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
    fn insert_keeps_the_first_equal_item() {
        #[derive(Clone, Debug)]
        struct Tagged(i32, char);
        struct ByNumber;
        impl Comparator<Tagged> for ByNumber {
            fn compare(&self, a: &Tagged, b: &Tagged) -> core::cmp::Ordering {
                a.0.cmp(&b.0)
            }
        }

        let mut set = RankedSet::with_comparator(ByNumber);
        assert!(set.insert(Tagged(1, 'a')));
        assert!(!set.insert(Tagged(1, 'b')));
        assert_eq!(set.get(&Tagged(1, '?')).map(|t| t.1), Some('a'));
        assert_eq!(set.replace(Tagged(1, 'c')).map(|t| t.1), Some('a'));
        assert_eq!(set.first().map(|t| t.1), Some('c'));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn ranges_under_reverse_order() {
        let mut set = RankedSet::with_capacity_and_comparator(4, Reverse(Natural)).unwrap();
        set.extend(0..20);
        set.check_invariants().unwrap();
        assert_eq!(set.range(15..=12).copied().collect::<Vec<_>>(), [15, 14, 13, 12]);
        assert_eq!(set.elements_from(&2).copied().collect::<Vec<_>>(), [2, 1, 0]);
        assert_eq!(set.elements_between(&2, &9).count(), 0);
    }

    #[test]
    fn restore_rejects_duplicates() {
        let snapshot = Snapshot {
            capacity: 4,
            comparator: Natural,
            entries: alloc::vec![1, 2, 2],
        };
        assert!(matches!(RankedSet::restore(snapshot), Err(Error::InvalidSnapshot(_))));
    }
}
