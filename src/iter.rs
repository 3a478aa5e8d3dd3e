//! Iterators shared by the ranked collections.
//!
//! Every borrowing iterator here walks the leaf chain between two ranks.
//! [`Iterator::nth`] and [`DoubleEndedIterator::nth_back`] jump by rank
//! through the subtree counts, so `skip(n)` costs `O(log n)` rather than `n`
//! steps.

use alloc::vec;
use core::fmt;
use core::iter::FusedIterator;

use crate::raw::{Arena, Handle, Node, RawTree, locate, next_position, prev_position};

/// An iterator over the entries of a ranked collection, in order.
///
/// Created by `iter`, `range`, `elements_between`, `elements_from` and
/// `iter_from_rank` on [`RankedMap`](crate::RankedMap) and
/// [`RankedMultiMap`](crate::RankedMultiMap).
///
/// # Examples
///
/// ```
/// use ranked_tree::RankedMap;
///
/// let map = RankedMap::from([(1, "a"), (2, "b"), (3, "c")]);
/// let mut iter = map.iter();
/// assert_eq!(iter.next(), Some((&1, &"a")));
/// assert_eq!(iter.next_back(), Some((&3, &"c")));
/// assert_eq!(iter.len(), 1);
/// ```
pub struct Iter<'a, K, V> {
    nodes: Option<&'a Arena<Node<K, V>>>,
    root: Handle,
    front: (Handle, usize),
    back: (Handle, usize),
    /// Rank of the next element from the front.
    front_rank: usize,
    /// One past the rank of the next element from the back.
    back_rank: usize,
}

impl<'a, K, V> Iter<'a, K, V> {
    /// Iterates ranks `start..end` of `tree`.
    pub(crate) fn new<C>(tree: &'a RawTree<K, V, C>, start: usize, end: usize) -> Self {
        let end = end.min(tree.len());
        if start >= end {
            return Self::default();
        }

        let front = if start == 0 { (tree.first_leaf(), 0) } else { tree.locate(start) };
        let back = if end == tree.len() {
            let last = tree.last_leaf();
            (last, tree.nodes().get(last).as_leaf().key_count() - 1)
        } else {
            tree.locate(end - 1)
        };
        Self {
            nodes: Some(tree.nodes()),
            root: tree.root(),
            front,
            back,
            front_rank: start,
            back_rank: end,
        }
    }

    /// Rank of the element the next call to `next` returns, if any.
    #[must_use]
    pub fn next_rank(&self) -> Option<usize> {
        (self.front_rank < self.back_rank).then_some(self.front_rank)
    }

    fn exhaust(&mut self) {
        self.front_rank = self.back_rank;
    }
}

impl<'a, K: 'a, V: 'a> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.front_rank >= self.back_rank {
            return None;
        }
        let nodes = self.nodes?;
        let (leaf, index) = self.front;
        self.front_rank += 1;
        if self.front_rank < self.back_rank {
            self.front = next_position(nodes, leaf, index)?;
        }
        Some(nodes.get(leaf).as_leaf().entry(index))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.back_rank - self.front_rank;
        (len, Some(len))
    }

    fn nth(&mut self, n: usize) -> Option<Self::Item> {
        if n >= self.len() {
            self.exhaust();
            return None;
        }
        if n > 0 {
            let nodes = self.nodes?;
            let (leaf, index) = self.front;
            self.front = if index + n < nodes.get(leaf).as_leaf().key_count() {
                (leaf, index + n)
            } else {
                locate(nodes, self.root, self.front_rank + n)
            };
            self.front_rank += n;
        }
        self.next()
    }

    fn last(mut self) -> Option<Self::Item> {
        self.next_back()
    }

    fn count(self) -> usize {
        self.len()
    }
}

impl<'a, K: 'a, V: 'a> DoubleEndedIterator for Iter<'a, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.front_rank >= self.back_rank {
            return None;
        }
        let nodes = self.nodes?;
        let (leaf, index) = self.back;
        self.back_rank -= 1;
        if self.front_rank < self.back_rank {
            self.back = prev_position(nodes, leaf, index)?;
        }
        Some(nodes.get(leaf).as_leaf().entry(index))
    }

    fn nth_back(&mut self, n: usize) -> Option<Self::Item> {
        if n >= self.len() {
            self.exhaust();
            return None;
        }
        if n > 0 {
            let nodes = self.nodes?;
            let (leaf, index) = self.back;
            self.back = if n <= index {
                (leaf, index - n)
            } else {
                locate(nodes, self.root, self.back_rank - 1 - n)
            };
            self.back_rank -= n;
        }
        self.next_back()
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {
    fn len(&self) -> usize {
        self.back_rank - self.front_rank
    }
}

impl<K, V> FusedIterator for Iter<'_, K, V> {}

impl<K, V> Clone for Iter<'_, K, V> {
    fn clone(&self) -> Self {
        Self {
            nodes: self.nodes,
            root: self.root,
            front: self.front,
            back: self.back,
            front_rank: self.front_rank,
            back_rank: self.back_rank,
        }
    }
}

impl<K, V> Default for Iter<'_, K, V> {
    /// Creates an empty `iter::Iter`.
    ///
    /// ```
    /// # use ranked_tree::iter;
    /// let iter: iter::Iter<'_, u8, u8> = Default::default();
    /// assert_eq!(iter.len(), 0);
    /// ```
    fn default() -> Self {
        let nowhere = Handle::from_index(0);
        Self {
            nodes: None,
            root: nowhere,
            front: (nowhere, 0),
            back: (nowhere, 0),
            front_rank: 0,
            back_rank: 0,
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for Iter<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.clone()).finish()
    }
}

/// An iterator over the keys of a ranked collection, in order.
///
/// This is also the borrowing iterator of [`RankedSet`](crate::RankedSet)
/// and [`RankedBag`](crate::RankedBag).
pub struct Keys<'a, K, V>(pub(crate) Iter<'a, K, V>);

/// An iterator over the values of a ranked collection, in key order.
pub struct Values<'a, K, V>(pub(crate) Iter<'a, K, V>);

macro_rules! project {
    ($name:ident, $item:ty, |$k:ident, $v:ident| $project:expr) => {
        impl<'a, K: 'a, V: 'a> Iterator for $name<'a, K, V> {
            type Item = $item;

            fn next(&mut self) -> Option<Self::Item> {
                self.0.next().map(|($k, $v)| $project)
            }

            fn size_hint(&self) -> (usize, Option<usize>) {
                self.0.size_hint()
            }

            fn nth(&mut self, n: usize) -> Option<Self::Item> {
                self.0.nth(n).map(|($k, $v)| $project)
            }

            fn last(mut self) -> Option<Self::Item> {
                self.next_back()
            }

            fn count(self) -> usize {
                self.0.len()
            }
        }

        impl<'a, K: 'a, V: 'a> DoubleEndedIterator for $name<'a, K, V> {
            fn next_back(&mut self) -> Option<Self::Item> {
                self.0.next_back().map(|($k, $v)| $project)
            }

            fn nth_back(&mut self, n: usize) -> Option<Self::Item> {
                self.0.nth_back(n).map(|($k, $v)| $project)
            }
        }

        impl<K, V> ExactSizeIterator for $name<'_, K, V> {
            fn len(&self) -> usize {
                self.0.len()
            }
        }

        impl<K, V> FusedIterator for $name<'_, K, V> {}

        impl<K, V> Clone for $name<'_, K, V> {
            fn clone(&self) -> Self {
                Self(self.0.clone())
            }
        }

        impl<K, V> Default for $name<'_, K, V> {
            fn default() -> Self {
                Self(Iter::default())
            }
        }

        impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for $name<'_, K, V> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_list().entries(self.clone()).finish()
            }
        }
    };
}

project!(Keys, &'a K, |key, _value| key);
project!(Values, &'a V, |_key, value| value);

/// An owning iterator over the entries of a ranked collection, in order.
pub struct IntoIter<K, V>(pub(crate) vec::IntoIter<(K, V)>);

/// An owning iterator over the keys of a ranked collection, in order.
///
/// This is the owning iterator of [`RankedSet`](crate::RankedSet) and
/// [`RankedBag`](crate::RankedBag).
pub struct IntoKeys<K, V>(pub(crate) vec::IntoIter<(K, V)>);

/// An owning iterator over the values of a ranked collection, in key order.
pub struct IntoValues<K, V>(pub(crate) vec::IntoIter<(K, V)>);

macro_rules! owning {
    ($name:ident, $item:ty, |$entry:ident| $project:expr) => {
        impl<K, V> Iterator for $name<K, V> {
            type Item = $item;

            fn next(&mut self) -> Option<Self::Item> {
                self.0.next().map(|$entry| $project)
            }

            fn size_hint(&self) -> (usize, Option<usize>) {
                self.0.size_hint()
            }

            fn nth(&mut self, n: usize) -> Option<Self::Item> {
                self.0.nth(n).map(|$entry| $project)
            }
        }

        impl<K, V> DoubleEndedIterator for $name<K, V> {
            fn next_back(&mut self) -> Option<Self::Item> {
                self.0.next_back().map(|$entry| $project)
            }

            fn nth_back(&mut self, n: usize) -> Option<Self::Item> {
                self.0.nth_back(n).map(|$entry| $project)
            }
        }

        impl<K, V> ExactSizeIterator for $name<K, V> {
            fn len(&self) -> usize {
                self.0.len()
            }
        }

        impl<K, V> FusedIterator for $name<K, V> {}

        impl<K, V> Default for $name<K, V> {
            fn default() -> Self {
                Self(vec::IntoIter::default())
            }
        }

        impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for $name<K, V> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_tuple(stringify!($name)).field(&self.0.as_slice()).finish()
            }
        }
    };
}

owning!(IntoIter, (K, V), |entry| entry);
owning!(IntoKeys, K, |entry| entry.0);
owning!(IntoValues, V, |entry| entry.1);

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::comparator::Natural;
    use alloc::vec::Vec;
    use proptest::prelude::*;

    fn tree(capacity: usize, len: i32) -> RawTree<i32, i32, Natural> {
        let mut tree = RawTree::new(capacity, Natural).unwrap();
        for key in 0..len {
            tree.push_last(key, key * 10);
        }
        tree
    }

    #[test]
    fn empty_and_default_iterators() {
        let tree = tree(4, 0);
        let mut iter = Iter::new(&tree, 0, 0);
        assert_eq!(iter.next(), None);
        assert_eq!(iter.next_back(), None);
        assert_eq!(Iter::<u8, u8>::default().len(), 0);
        assert_eq!(Keys::<u8, u8>::default().next(), None);
    }

    #[test]
    fn front_and_back_meet_in_the_middle() {
        let tree = tree(4, 9);
        let mut iter = Iter::new(&tree, 2, 7);
        assert_eq!(iter.next().map(|(k, _)| *k), Some(2));
        assert_eq!(iter.next_back().map(|(k, _)| *k), Some(6));
        assert_eq!(iter.next_rank(), Some(3));
        let rest: Vec<i32> = iter.by_ref().map(|(k, _)| *k).collect();
        assert_eq!(rest, [3, 4, 5]);
        assert_eq!(iter.next(), None);
        assert_eq!(iter.next_back(), None);
        assert_eq!(iter.next_rank(), None);
    }

    #[test]
    fn values_follow_key_order() {
        let tree = tree(5, 6);
        let values: Vec<i32> = Values(Iter::new(&tree, 0, 6)).rev().copied().collect();
        assert_eq!(values, [50, 40, 30, 20, 10, 0]);
    }

    proptest! {
        #[test]
        fn nth_matches_stepping(capacity in 4usize..8, len in 0i32..120, start in 0usize..130, steps in prop::collection::vec(0usize..40, 0..10)) {
            let tree = tree(capacity, len);
            let expected: Vec<i32> = (0..len).skip(start).collect();
            let mut fast = Iter::new(&tree, start, tree.len());
            let mut slow = expected.iter();
            for (i, step) in steps.into_iter().enumerate() {
                if i % 2 == 0 {
                    prop_assert_eq!(fast.nth(step).map(|(k, _)| k), slow.nth(step));
                } else {
                    prop_assert_eq!(fast.nth_back(step).map(|(k, _)| k), slow.nth_back(step));
                }
                prop_assert_eq!(fast.len(), slow.len());
            }
            prop_assert_eq!(fast.map(|(k, _)| *k).collect::<Vec<_>>(), slow.copied().collect::<Vec<_>>());
        }
    }
}
