use core::ops::Index;

use super::{Iter, RankedBag};
use crate::Rank;
use crate::comparator::Comparator;
use crate::cursor::{Cursor, Direction};
use crate::error::Result;
use crate::iter::Keys;

impl<T, C> RankedBag<T, C> {
    /// Returns the item at position `rank`, counting every copy.
    ///
    /// # Examples
    ///
    /// ```
    /// use ranked_tree::RankedBag;
    ///
    /// let bag = RankedBag::from([3, 1, 3]);
    /// assert_eq!(bag.get_by_rank(2), Some(&3));
    /// assert_eq!(bag.get_by_rank(3), None);
    /// ```
    #[must_use]
    pub fn get_by_rank(&self, rank: usize) -> Option<&T> {
        self.map.get_by_rank(rank).map(|(k, ())| k)
    }

    pub fn iter_from_rank(&self, rank: usize) -> Iter<'_, T> {
        Keys(self.map.iter_from_rank(rank))
    }

    /// # Errors
    ///
    /// Returns [`Error::RankOutOfRange`](crate::Error::RankOutOfRange) if `rank > len()`.
    pub fn cursor_at(&self, rank: usize, direction: Direction) -> Result<Cursor> {
        self.map.cursor_at(rank, direction)
    }
}

impl<T: Clone, C> RankedBag<T, C> {
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
    pub fn remove_range(&mut self, start: usize, count: usize) -> Result<()> {
        self.map.remove_range(start, count)
    }
}

impl<T, C: Comparator<T>> RankedBag<T, C> {
    /// Rank of the first item equal to `value`, or `Err` with the rank it
    /// would be inserted at.
    pub fn rank_of(&self, value: &T) -> core::result::Result<usize, usize> {
        self.map.rank_of(value)
    }
}

impl<T, C> Index<Rank> for RankedBag<T, C> {
    type Output = T;

    /// # Panics
    ///
    /// Panics if `rank` is out of bounds.
    fn index(&self, rank: Rank) -> &T {
        self.get_by_rank(rank.0).expect("index out of bounds")
    }
}
