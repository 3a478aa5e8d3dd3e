use core::ops::Index;

use super::{Iter, RankedSet};
use crate::Rank;
use crate::comparator::Comparator;
use crate::cursor::{Cursor, Direction};
use crate::error::Result;
use crate::iter::Keys;

impl<T, C> RankedSet<T, C> {
    /// Returns the item at position `rank` in sorted order.
    ///
    /// # Complexity
    ///
    /// O(log n)
    ///
    /// # Examples
    ///
    /// ```
    /// use ranked_tree::RankedSet;
    ///
    /// let set = RankedSet::from([30, 10, 20]);
    /// assert_eq!(set.get_by_rank(0), Some(&10));
    /// assert_eq!(set.get_by_rank(2), Some(&30));
    /// assert_eq!(set.get_by_rank(3), None);
    /// ```
    #[must_use]
    pub fn get_by_rank(&self, rank: usize) -> Option<&T> {
        self.map.get_by_rank(rank).map(|(k, ())| k)
    }

    /// Iterates the items from position `rank` to the end.
    pub fn iter_from_rank(&self, rank: usize) -> Iter<'_, T> {
        Keys(self.map.iter_from_rank(rank))
    }

    /// Creates a detached cursor at position `rank`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RankOutOfRange`](crate::Error::RankOutOfRange) if `rank > len()`.
    pub fn cursor_at(&self, rank: usize, direction: Direction) -> Result<Cursor> {
        self.map.cursor_at(rank, direction)
    }
}

impl<T: Clone, C> RankedSet<T, C> {
    /// Removes and returns the item at position `rank`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RankOutOfRange`](crate::Error::RankOutOfRange) if `rank >= len()`.
    pub fn remove_at(&mut self, rank: usize) -> Result<T> {
        self.map.remove_at(rank).map(|(k, ())| k)
    }

    /// Removes the `count` items at positions `start..start + count`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RankOutOfRange`](crate::Error::RankOutOfRange) if
    /// `start + count > len()`.
    ///
    /// ```
    /// use ranked_tree::RankedSet;
    ///
    /// let mut set: RankedSet<i32> = (0..100).collect();
    /// set.remove_range(10, 80).unwrap();
    /// assert_eq!(set.len(), 20);
    /// assert_eq!(set.get_by_rank(10), Some(&90));
    /// ```
    pub fn remove_range(&mut self, start: usize, count: usize) -> Result<()> {
        self.map.remove_range(start, count)
    }
}

impl<T, C: Comparator<T>> RankedSet<T, C> {
    /// Returns the rank of `value`, or `Err` with the rank it would be
    /// inserted at.
    ///
    /// ```
    /// use ranked_tree::RankedSet;
    ///
    /// let set = RankedSet::from([10, 20, 30]);
    /// assert_eq!(set.rank_of(&20), Ok(1));
    /// assert_eq!(set.rank_of(&25), Err(2));
    /// ```
    pub fn rank_of(&self, value: &T) -> core::result::Result<usize, usize> {
        self.map.rank_of(value)
    }
}

/// Indexes into the set by rank.
///
/// # Panics
///
/// Panics if `rank` is out of bounds.
///
/// ```
/// use ranked_tree::{Rank, RankedSet};
///
/// let set = RankedSet::from(["b", "a"]);
/// assert_eq!(set[Rank(1)], "b");
/// ```
impl<T, C> Index<Rank> for RankedSet<T, C> {
    type Output = T;

    fn index(&self, rank: Rank) -> &T {
        self.get_by_rank(rank.0).expect("index out of bounds")
    }
}
