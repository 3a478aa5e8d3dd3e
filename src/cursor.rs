//! Detached, change-tracking cursors.
//!
//! A [`Cursor`] remembers a position in a collection without borrowing it,
//! so the collection can still be mutated while the cursor is alive. The
//! cursor records the collection's generation when it is created; every
//! structural mutation bumps that generation, and the next
//! `advance` call on the collection then fails with
//! [`Error::StaleCursor`](crate::Error::StaleCursor) instead of returning
//! entries from a tree that has moved underneath it.
//!
//! # Examples
//!
//! ```
//! use ranked_tree::{Error, RankedSet};
//!
//! let mut set = RankedSet::from([1, 2, 3]);
//! let mut cursor = set.cursor();
//! assert_eq!(set.advance(&mut cursor), Ok(Some(&1)));
//!
//! set.insert(4);
//! assert_eq!(set.advance(&mut cursor), Err(Error::StaleCursor));
//! ```

use crate::error::{Error, Result};
use crate::raw::{Handle, RawTree, next_position, prev_position};

/// Traversal direction of a [`Cursor`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum Direction {
    /// Ascending key order.
    #[default]
    Forward,
    /// Descending key order.
    Reverse,
}

/// A position in a ranked collection that survives across borrows.
///
/// Created by `cursor`, `cursor_back` and `cursor_at` on each collection and
/// moved with the collection's `advance` method.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Cursor {
    position: Option<(Handle, usize)>,
    rank: usize,
    direction: Direction,
    generation: u64,
}

impl Cursor {
    /// Starts at `rank`, or finished if `rank` is past the last element.
    pub(crate) fn at<K, V, C>(tree: &RawTree<K, V, C>, rank: usize, direction: Direction) -> Self {
        Self {
            position: (rank < tree.len()).then(|| tree.locate(rank)),
            rank,
            direction,
            generation: tree.generation(),
        }
    }

    pub(crate) fn first<K, V, C>(tree: &RawTree<K, V, C>) -> Self {
        Self::at(tree, 0, Direction::Forward)
    }

    pub(crate) fn last<K, V, C>(tree: &RawTree<K, V, C>) -> Self {
        match tree.len().checked_sub(1) {
            Some(rank) => Self::at(tree, rank, Direction::Reverse),
            None => Self::at(tree, 0, Direction::Reverse),
        }
    }

    /// Direction the cursor moves in.
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Rank of the element the next advance returns, or `None` once the
    /// cursor has run off either end.
    #[must_use]
    pub fn rank(&self) -> Option<usize> {
        self.position.map(|_| self.rank)
    }

    /// Returns `true` once the cursor has run off either end.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.position.is_none()
    }

    /// Returns the entry under the cursor and steps past it.
    pub(crate) fn advance<'a, K, V, C>(&mut self, tree: &'a RawTree<K, V, C>) -> Result<Option<(&'a K, &'a V)>> {
        if self.generation != tree.generation() {
            return Err(Error::StaleCursor);
        }
        let Some((leaf, index)) = self.position else {
            return Ok(None);
        };
        // A cursor from another collection can carry a matching generation.
        let entry = tree.try_entry(leaf, index).ok_or(Error::StaleCursor)?;

        match self.direction {
            Direction::Forward => {
                self.position = next_position(tree.nodes(), leaf, index);
                self.rank += 1;
            }
            Direction::Reverse => {
                self.position = prev_position(tree.nodes(), leaf, index);
                self.rank = self.rank.saturating_sub(1);
            }
        }
        Ok(Some(entry))
    }
}
