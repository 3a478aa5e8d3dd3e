//! Serialized form of the ranked collections.
//!
//! Every collection serializes as a [`Snapshot`]: its capacity, its
//! comparator and its entries in order. Loading is two-phase. The snapshot
//! is first deserialized as plain data with no invariants checked, then
//! validated (capacity range, order under the comparator, and for unique
//! collections no equal neighbours) and rebuilt by appending the entries in
//! order. The rebuilt tree has the same entries, order and ranks as the one
//! that was saved, including the relative order of duplicate keys, though
//! its node layout may differ.
//!
//! # Examples
//!
//! ```
//! use ranked_tree::{RankedBag, Snapshot, Natural};
//!
//! let snapshot = Snapshot { capacity: 4, comparator: Natural, entries: vec![1, 1, 2] };
//! assert!(RankedBag::validate_snapshot(&snapshot).is_ok());
//! let bag = RankedBag::restore(snapshot).unwrap();
//! assert_eq!(bag.count_of(&1), 2);
//!
//! let unsorted = Snapshot { capacity: 4, comparator: Natural, entries: vec![2, 1] };
//! assert!(RankedBag::validate_snapshot(&unsorted).is_err());
//! ```

use alloc::format;
use alloc::vec::Vec;
use core::cmp::Ordering;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use tracing::debug;

use crate::comparator::Comparator;
use crate::error::{Error, Result};
use crate::raw::{RawTree, validate_capacity};

/// The persisted state of a ranked collection.
///
/// Entries are `(key, value)` pairs for maps and bare keys for sets and bags.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Snapshot<E, C> {
    pub capacity: usize,
    pub comparator: C,
    pub entries: Vec<E>,
}

impl<E, C> Snapshot<E, C> {
    /// Checks that the snapshot describes a valid collection. Pure, so calling
    /// it repeatedly gives the same answer.
    pub(crate) fn check<K>(&self, key_of: impl Fn(&E) -> &K, unique: bool) -> Result<()>
    where
        C: Comparator<K>,
    {
        validate_capacity(self.capacity)?;
        for (index, pair) in self.entries.windows(2).enumerate() {
            match self.comparator.compare(key_of(&pair[0]), key_of(&pair[1])) {
                Ordering::Greater => {
                    return Err(Error::InvalidSnapshot(format!(
                        "entry {} sorts after entry {}",
                        index,
                        index + 1
                    )));
                }
                Ordering::Equal if unique => {
                    return Err(Error::InvalidSnapshot(format!(
                        "entries {} and {} have equal keys",
                        index,
                        index + 1
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Rebuilds a tree by appending every entry. The snapshot must already
    /// have passed [`check`](Self::check).
    pub(crate) fn into_tree<K: Clone, V>(self, split: impl Fn(E) -> (K, V)) -> Result<RawTree<K, V, C>> {
        let capacity = self.capacity;
        let mut tree = RawTree::new(capacity, self.comparator)?;
        for entry in self.entries {
            let (key, value) = split(entry);
            tree.push_last(key, value);
        }
        debug!(len = tree.len(), capacity, "restored snapshot");
        Ok(tree)
    }
}

/// Serializes a tree in the [`Snapshot`] layout without copying its entries.
pub(crate) fn serialize_tree<S, C, I>(serializer: S, capacity: usize, comparator: &C, entries: I) -> core::result::Result<S::Ok, S::Error>
where
    S: Serializer,
    C: Serialize,
    I: Iterator + Clone,
    I::Item: Serialize,
{
    let mut state = serializer.serialize_struct("Snapshot", 3)?;
    state.serialize_field("capacity", &capacity)?;
    state.serialize_field("comparator", comparator)?;
    state.serialize_field("entries", &Entries(entries))?;
    state.end()
}

struct Entries<I>(I);

impl<I> Serialize for Entries<I>
where
    I: Iterator + Clone,
    I::Item: Serialize,
{
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.clone())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::comparator::{Natural, Reverse};
    use alloc::vec;

    fn snapshot(capacity: usize, entries: Vec<i32>) -> Snapshot<i32, Natural> {
        Snapshot {
            capacity,
            comparator: Natural,
            entries,
        }
    }

    #[test]
    fn check_is_idempotent() {
        let valid = snapshot(4, vec![1, 2, 2, 3]);
        assert_eq!(valid.check(|k| k, false), Ok(()));
        assert_eq!(valid.check(|k| k, false), Ok(()));

        let repeated = valid.check(|k| k, true);
        assert_eq!(repeated, Err(Error::InvalidSnapshot("entries 1 and 2 have equal keys".into())));
        assert_eq!(valid.check(|k| k, true), repeated);
    }

    #[test]
    fn check_rejects_bad_capacity_and_order() {
        assert!(matches!(snapshot(2, vec![]).check(|k| k, false), Err(Error::InvalidCapacity { capacity: 2, .. })));
        assert!(matches!(snapshot(4, vec![3, 1]).check(|k| k, false), Err(Error::InvalidSnapshot(_))));
    }

    #[test]
    fn order_follows_the_stored_comparator() {
        let descending = Snapshot {
            capacity: 5,
            comparator: Reverse(Natural),
            entries: vec![(9, 'a'), (4, 'b'), (1, 'c')],
        };
        descending.check(|(k, _)| k, true).unwrap();
        let tree = descending.into_tree(|entry| entry).unwrap();
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.first(), Some((&9, &'a')));
        tree.check_invariants(true).unwrap();
    }
}
