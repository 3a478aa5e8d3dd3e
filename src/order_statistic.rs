/// A zero-based rank into the sorted order of a ranked collection.
///
/// # Examples
///
/// ```
/// use ranked_tree::{RankedMap, Rank};
///
/// let mut map = RankedMap::new();
/// map.insert("a", 10);
/// map.insert("b", 20);
///
/// assert_eq!(map[Rank(0)], 10);
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Rank(pub usize);
