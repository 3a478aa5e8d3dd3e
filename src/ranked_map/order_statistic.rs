use core::ops::{Index, IndexMut};

use super::RankedMap;
use crate::Rank;
use crate::comparator::Comparator;
use crate::cursor::{Cursor, Direction};
use crate::error::{Error, Result};
use crate::iter::Iter;

impl<K, V, C> RankedMap<K, V, C> {
    /// Returns the key-value pair at position `rank` in sorted order.
    ///
    /// The rank is zero-based. Returns `None` if `rank` is out of bounds.
    ///
    /// # Complexity
    ///
    /// O(log n)
    ///
    /// # Examples
    ///
    /// ```
    /// use ranked_tree::RankedMap;
    ///
    /// let mut map = RankedMap::new();
    /// map.insert("a", 10);
    /// map.insert("c", 30);
    /// map.insert("b", 20);
    ///
    /// let (key, value) = map.get_by_rank(1).unwrap();
    /// assert_eq!((key, value), (&"b", &20));
    /// assert!(map.get_by_rank(3).is_none());
    /// ```
    #[must_use]
    pub fn get_by_rank(&self, rank: usize) -> Option<(&K, &V)> {
        self.raw.get_by_rank(rank)
    }

    /// Returns the key and a mutable reference to the value at position `rank`.
    ///
    /// The key is returned as a shared reference because mutating it would
    /// break the map's ordering.
    #[must_use]
    pub fn get_by_rank_mut(&mut self, rank: usize) -> Option<(&K, &mut V)> {
        self.raw.get_by_rank_mut(rank)
    }

    /// Iterates the entries from position `rank` to the end.
    ///
    /// # Examples
    ///
    /// ```
    /// use ranked_tree::RankedMap;
    ///
    /// let map = RankedMap::from([(1, 'a'), (2, 'b'), (3, 'c')]);
    /// assert_eq!(map.iter_from_rank(1).map(|(k, _)| *k).collect::<Vec<_>>(), [2, 3]);
    /// assert_eq!(map.iter_from_rank(9).count(), 0);
    /// ```
    pub fn iter_from_rank(&self, rank: usize) -> Iter<'_, K, V> {
        Iter::new(&self.raw, rank, self.len())
    }

    /// Creates a detached cursor at position `rank`.
    ///
    /// A cursor at `rank == len()` starts out finished.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RankOutOfRange`] if `rank > len()`.
    pub fn cursor_at(&self, rank: usize, direction: Direction) -> Result<Cursor> {
        if rank > self.len() {
            return Err(Error::RankOutOfRange { rank, len: self.len() });
        }
        Ok(Cursor::at(&self.raw, rank, direction))
    }
}

impl<K: Clone, V, C> RankedMap<K, V, C> {
    /// Removes and returns the entry at position `rank`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RankOutOfRange`] if `rank >= len()`.
    pub fn remove_at(&mut self, rank: usize) -> Result<(K, V)> {
        let len = self.len();
        self.raw.remove_at(rank).ok_or(Error::RankOutOfRange { rank, len })
    }

    /// Removes the `count` entries at positions `start..start + count`.
    ///
    /// # Complexity
    ///
    /// O((count / capacity + 1) * log n)
    ///
    /// # Errors
    ///
    /// Returns [`Error::RankOutOfRange`] if `start + count > len()`; the map
    /// is left untouched.
    ///
    /// # Examples
    ///
    /// ```
    /// use ranked_tree::RankedMap;
    ///
    /// let mut map: RankedMap<i32, ()> = (0..10).map(|k| (k, ())).collect();
    /// map.remove_range(2, 5).unwrap();
    /// assert_eq!(map.keys().copied().collect::<Vec<_>>(), [0, 1, 7, 8, 9]);
    /// assert!(map.remove_range(4, 2).is_err());
    /// ```
    pub fn remove_range(&mut self, start: usize, count: usize) -> Result<()> {
        self.raw.remove_range(start, count)
    }
}

impl<K, V, C: Comparator<K>> RankedMap<K, V, C> {
    /// Returns the zero-based rank of `key`, or `Err` with the rank it would
    /// be inserted at, in the manner of [`slice::binary_search`].
    ///
    /// # Complexity
    ///
    /// O(log n)
    ///
    /// # Examples
    ///
    /// ```
    /// use ranked_tree::RankedMap;
    ///
    /// let map = RankedMap::from([(10, "a"), (20, "b")]);
    /// assert_eq!(map.rank_of(&20), Ok(1));
    /// assert_eq!(map.rank_of(&15), Err(1));
    /// assert_eq!(map.rank_of(&99), Err(2));
    /// ```
    pub fn rank_of(&self, key: &K) -> core::result::Result<usize, usize> {
        self.raw.rank_of(key)
    }
}

/// Indexes into the map by rank.
///
/// # Panics
///
/// Panics if `rank` is out of bounds.
///
/// # Examples
///
/// ```
/// use ranked_tree::{RankedMap, Rank};
///
/// let map = RankedMap::from([("a", 1), ("b", 2)]);
/// assert_eq!(map[Rank(0)], 1);
/// ```
impl<K, V, C> Index<Rank> for RankedMap<K, V, C> {
    type Output = V;

    fn index(&self, rank: Rank) -> &Self::Output {
        self.get_by_rank(rank.0).map(|(_, v)| v).expect("index out of bounds")
    }
}

/// Mutably indexes into the map by rank.
///
/// # Panics
///
/// Panics if `rank` is out of bounds.
///
/// # Examples
///
/// ```
/// use ranked_tree::{RankedMap, Rank};
///
/// let mut map = RankedMap::from([("a", 1), ("b", 2)]);
/// map[Rank(1)] = 5;
/// assert_eq!(map.get(&"b"), Some(&5));
/// ```
impl<K, V, C> IndexMut<Rank> for RankedMap<K, V, C> {
    fn index_mut(&mut self, rank: Rank) -> &mut Self::Output {
        self.get_by_rank_mut(rank.0).map(|(_, v)| v).expect("index out of bounds")
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    #[test]
    fn cursor_at_bounds() {
        let map = RankedMap::from([(1, ()), (2, ()), (3, ())]);
        assert!(map.cursor_at(3, Direction::Forward).unwrap().is_finished());
        assert_eq!(map.cursor_at(4, Direction::Forward), Err(Error::RankOutOfRange { rank: 4, len: 3 }));

        let mut cursor = map.cursor_at(1, Direction::Reverse).unwrap();
        let mut keys = Vec::new();
        while let Some((k, ())) = map.advance(&mut cursor).unwrap() {
            keys.push(*k);
        }
        assert_eq!(keys, [2, 1]);
    }

    #[test]
    fn remove_at_reports_range() {
        let mut map = RankedMap::from([(1, 'a'), (2, 'b')]);
        assert_eq!(map.remove_at(1), Ok((2, 'b')));
        assert_eq!(map.remove_at(1), Err(Error::RankOutOfRange { rank: 1, len: 1 }));
    }

    #[test]
    #[should_panic(expected = "index out of bounds")]
    fn index_past_end_panics() {
        let map = RankedMap::from([(1, 'a')]);
        let _ = map[Rank(1)];
    }
}
