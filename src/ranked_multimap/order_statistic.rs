use core::ops::{Index, IndexMut};

use super::RankedMultiMap;
use crate::Rank;
use crate::comparator::Comparator;
use crate::cursor::{Cursor, Direction};
use crate::error::{Error, Result};
use crate::iter::Iter;

impl<K, V, C> RankedMultiMap<K, V, C> {
    /// Returns the entry at position `rank`, counting every duplicate.
    ///
    /// # Complexity
    ///
    /// O(log n)
    ///
    /// # Examples
    ///
    /// ```
    /// use ranked_tree::RankedMultiMap;
    ///
    /// let map = RankedMultiMap::from([(1, 'a'), (1, 'b'), (2, 'c')]);
    /// assert_eq!(map.get_by_rank(1), Some((&1, &'b')));
    /// assert_eq!(map.get_by_rank(3), None);
    /// ```
    #[must_use]
    pub fn get_by_rank(&self, rank: usize) -> Option<(&K, &V)> {
        self.raw.get_by_rank(rank)
    }

    #[must_use]
    pub fn get_by_rank_mut(&mut self, rank: usize) -> Option<(&K, &mut V)> {
        self.raw.get_by_rank_mut(rank)
    }

    /// Iterates the entries from position `rank` to the end.
    pub fn iter_from_rank(&self, rank: usize) -> Iter<'_, K, V> {
        Iter::new(&self.raw, rank, self.len())
    }

    /// Creates a detached cursor at position `rank`.
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

impl<K: Clone, V, C> RankedMultiMap<K, V, C> {
    /// Removes and returns the entry at position `rank`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RankOutOfRange`] if `rank >= len()`.
    pub fn remove_at(&mut self, rank: usize) -> Result<(K, V)> {
        let len = self.len();
        self.raw.remove_at(rank).ok_or(Error::RankOutOfRange { rank, len })
    }

    /// Removes the `count` entries at positions `start..start + count`,
    /// across duplicate groups and node boundaries alike.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RankOutOfRange`] if `start + count > len()`.
    ///
    /// ```
    /// use ranked_tree::RankedMultiMap;
    ///
    /// let mut map: RankedMultiMap<u8, u8> = (0..12).map(|v| (v / 4, v)).collect();
    /// map.remove_range(2, 8).unwrap();
    /// assert_eq!(map.values().copied().collect::<Vec<_>>(), [0, 1, 10, 11]);
    /// ```
    pub fn remove_range(&mut self, start: usize, count: usize) -> Result<()> {
        self.raw.remove_range(start, count)
    }
}

impl<K, V, C: Comparator<K>> RankedMultiMap<K, V, C> {
    /// Rank of the first entry with this key, or `Err` with the rank the key
    /// would be inserted at.
    pub fn rank_of(&self, key: &K) -> core::result::Result<usize, usize> {
        self.raw.rank_of(key)
    }
}

/// Indexes into the multimap by rank.
///
/// # Panics
///
/// Panics if `rank` is out of bounds.
impl<K, V, C> Index<Rank> for RankedMultiMap<K, V, C> {
    type Output = V;

    fn index(&self, rank: Rank) -> &V {
        self.get_by_rank(rank.0).map(|(_, v)| v).expect("index out of bounds")
    }
}

impl<K, V, C> IndexMut<Rank> for RankedMultiMap<K, V, C> {
    fn index_mut(&mut self, rank: Rank) -> &mut V {
        self.get_by_rank_mut(rank.0).map(|(_, v)| v).expect("index out of bounds")
    }
}
