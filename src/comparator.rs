//! Pluggable key orderings.
//!
//! Every collection in this crate is parameterised by a [`Comparator`] that is
//! captured at construction and used for every key comparison the tree makes.
//! Comparators are plain values, so they are serialized alongside the tree
//! and a deserialized collection keeps the exact ordering it was saved with.

use core::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// A total order over keys of type `K`.
///
/// Implementations must be consistent for the lifetime of the collection:
/// the tree never re-sorts, so an ordering that changes its mind leaves the
/// collection in an unspecified (but memory-safe) state that
/// `check_invariants` will report.
///
/// # Examples
///
/// ```
/// use core::cmp::Ordering;
/// use ranked_tree::{Comparator, RankedSet};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Clone, Debug, Default, Serialize, Deserialize)]
/// struct ByLength;
///
/// impl Comparator<&'static str> for ByLength {
///     fn compare(&self, a: &&'static str, b: &&'static str) -> Ordering {
///         a.len().cmp(&b.len()).then_with(|| a.cmp(b))
///     }
/// }
///
/// let mut set = RankedSet::with_comparator(ByLength);
/// set.insert("ccc");
/// set.insert("a");
/// set.insert("bb");
/// assert_eq!(set.iter().copied().collect::<Vec<_>>(), ["a", "bb", "ccc"]);
/// ```
pub trait Comparator<K: ?Sized> {
    /// Compares two keys.
    fn compare(&self, a: &K, b: &K) -> Ordering;

    /// Returns `true` if `a` sorts strictly before `b`.
    #[inline]
    fn less(&self, a: &K, b: &K) -> bool {
        self.compare(a, b) == Ordering::Less
    }

    /// Returns `true` if `a` and `b` are equal under this ordering.
    #[inline]
    fn equal(&self, a: &K, b: &K) -> bool {
        self.compare(a, b) == Ordering::Equal
    }
}

/// The key type's own [`Ord`] implementation.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Natural;

impl<K: Ord + ?Sized> Comparator<K> for Natural {
    #[inline]
    fn compare(&self, a: &K, b: &K) -> Ordering {
        a.cmp(b)
    }
}

/// Reverses another comparator.
///
/// # Examples
///
/// ```
/// use ranked_tree::{Natural, RankedBag, Reverse};
///
/// let mut bag = RankedBag::with_comparator(Reverse(Natural));
/// bag.extend([1, 3, 2, 3]);
/// assert_eq!(bag.iter().copied().collect::<Vec<_>>(), [3, 3, 2, 1]);
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Reverse<C>(pub C);

impl<K: ?Sized, C: Comparator<K>> Comparator<K> for Reverse<C> {
    #[inline]
    fn compare(&self, a: &K, b: &K) -> Ordering {
        self.0.compare(b, a)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn natural_matches_ord() {
        assert_eq!(Natural.compare(&1, &2), Ordering::Less);
        assert!(Natural.equal("a", "a"));
        assert!(Natural.less(&-5i64, &0));
    }

    proptest! {
        #[test]
        fn reverse_flips_every_comparison(a in any::<i32>(), b in any::<i32>()) {
            prop_assert_eq!(Reverse(Natural).compare(&a, &b), Natural.compare(&a, &b).reverse());
            prop_assert_eq!(Reverse(Reverse(Natural)).compare(&a, &b), a.cmp(&b));
        }
    }
}
