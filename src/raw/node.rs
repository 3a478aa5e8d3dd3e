use core::iter::Zip;

use smallvec::SmallVec;

use super::handle::Handle;
use crate::comparator::Comparator;

/// Entries kept inline before a node spills to the heap. Capacities above
/// this still work, they just allocate.
pub(crate) const INLINE: usize = 16;

type Keys<K> = SmallVec<[K; INLINE]>;
type Children = SmallVec<[Handle; INLINE + 1]>;
type ChildSizes = SmallVec<[usize; INLINE + 1]>;

#[allow(clippy::large_enum_variant)]
#[derive(Clone)]
pub(crate) enum Node<K, V> {
    Branch(BranchNode<K>),
    Leaf(LeafNode<K, V>),
}

// B+Tree: branches store separator keys, child handles and subtree counts.
//
// Separator rule: every key under children[..=i] is <= keys[i] and every key
// under children[i + 1..] is >= keys[i]. Equal keys may sit on both sides,
// which duplicate-key collections rely on.
#[derive(Clone)]
pub(crate) struct BranchNode<K> {
    // Number of entries in the subtree rooted here; always the sum of `child_sizes`.
    size: usize,
    keys: Keys<K>,
    children: Children,
    child_sizes: ChildSizes,
}

// B+Tree: leaves store the entries and the doubly-linked leaf chain.
#[derive(Clone)]
pub(crate) struct LeafNode<K, V> {
    prev: Option<Handle>,
    next: Option<Handle>,
    keys: Keys<K>,
    values: SmallVec<[V; INLINE]>,
}

impl<K, V> Node<K, V> {
    /// Returns the leaf node, panicking if this is a branch.
    pub(crate) fn as_leaf(&self) -> &LeafNode<K, V> {
        match self {
            Node::Leaf(leaf) => leaf,
            Node::Branch(_) => panic!("expected leaf node"),
        }
    }

    /// Returns the leaf node mutably, panicking if this is a branch.
    pub(crate) fn as_leaf_mut(&mut self) -> &mut LeafNode<K, V> {
        match self {
            Node::Leaf(leaf) => leaf,
            Node::Branch(_) => panic!("expected leaf node"),
        }
    }

    /// Returns the branch node, panicking if this is a leaf.
    pub(crate) fn as_branch(&self) -> &BranchNode<K> {
        match self {
            Node::Branch(branch) => branch,
            Node::Leaf(_) => panic!("expected branch node"),
        }
    }

    /// Returns the branch node mutably, panicking if this is a leaf.
    pub(crate) fn as_branch_mut(&mut self) -> &mut BranchNode<K> {
        match self {
            Node::Branch(branch) => branch,
            Node::Leaf(_) => panic!("expected branch node"),
        }
    }

    /// Number of entries under this node.
    pub(crate) fn size(&self) -> usize {
        match self {
            Node::Branch(branch) => branch.size(),
            Node::Leaf(leaf) => leaf.key_count(),
        }
    }

    /// Occupancy measured against capacity: children for branches, entries for leaves.
    pub(crate) fn fill(&self) -> usize {
        match self {
            Node::Branch(branch) => branch.child_count(),
            Node::Leaf(leaf) => leaf.key_count(),
        }
    }
}

impl<K> BranchNode<K> {
    /// Creates a branch over two children, as needed when the root splits.
    pub(crate) fn with_children(left: Handle, left_size: usize, separator: K, right: Handle, right_size: usize) -> Self {
        let mut keys = SmallVec::new();
        keys.push(separator);
        let mut children = SmallVec::new();
        children.push(left);
        children.push(right);
        let mut child_sizes = SmallVec::new();
        child_sizes.push(left_size);
        child_sizes.push(right_size);
        Self {
            size: left_size + right_size,
            keys,
            children,
            child_sizes,
        }
    }

    pub(crate) fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub(crate) fn child_count(&self) -> usize {
        self.children.len()
    }

    pub(crate) fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub(crate) fn key(&self, index: usize) -> &K {
        &self.keys[index]
    }

    pub(crate) fn keys(&self) -> &[K] {
        &self.keys
    }

    #[inline]
    pub(crate) fn child(&self, index: usize) -> Handle {
        self.children[index]
    }

    pub(crate) fn children(&self) -> &[Handle] {
        &self.children
    }

    #[inline]
    pub(crate) fn child_size(&self, index: usize) -> usize {
        self.child_sizes[index]
    }

    pub(crate) fn child_sizes(&self) -> &[usize] {
        &self.child_sizes
    }

    /// Overwrites one child count, keeping the subtree total in step.
    pub(crate) fn set_child_size(&mut self, index: usize, size: usize) {
        self.size = self.size - self.child_sizes[index] + size;
        self.child_sizes[index] = size;
    }

    pub(crate) fn add_to_child(&mut self, index: usize, delta: usize) {
        self.child_sizes[index] += delta;
        self.size += delta;
    }

    pub(crate) fn sub_from_child(&mut self, index: usize, delta: usize) {
        self.child_sizes[index] -= delta;
        self.size -= delta;
    }

    /// Index of the first child that may hold a key `>= key`.
    #[inline]
    pub(crate) fn lower_child<C: Comparator<K>>(&self, comparator: &C, key: &K) -> usize {
        self.keys.partition_point(|k| comparator.less(k, key))
    }

    /// Index of the child that holds the position just after every key `<= key`.
    #[inline]
    pub(crate) fn upper_child<C: Comparator<K>>(&self, comparator: &C, key: &K) -> usize {
        self.keys.partition_point(|k| !comparator.less(key, k))
    }

    /// Finds the child containing `rank`, returning its index and the rank
    /// relative to that child.
    #[inline]
    pub(crate) fn child_for_rank(&self, mut rank: usize) -> (usize, usize) {
        let last = self.child_sizes.len() - 1;
        for (i, &size) in self.child_sizes[..last].iter().enumerate() {
            if rank < size {
                return (i, rank);
            }
            rank -= size;
        }
        (last, rank)
    }

    /// Sum of the counts of the children before `index`.
    pub(crate) fn size_before(&self, index: usize) -> usize {
        self.child_sizes[..index].iter().sum()
    }

    /// Inserts `child` right after `children[index]`, with `key` separating them.
    pub(crate) fn insert_child(&mut self, index: usize, key: K, child: Handle, child_size: usize) {
        self.keys.insert(index, key);
        self.children.insert(index + 1, child);
        self.child_sizes.insert(index + 1, child_size);
        self.size += child_size;
    }

    /// Removes `children[index + 1]` and the separator in front of it.
    pub(crate) fn remove_child(&mut self, index: usize) -> (K, Handle) {
        let key = self.keys.remove(index);
        let child = self.children.remove(index + 1);
        self.size -= self.child_sizes.remove(index + 1);
        (key, child)
    }

    /// Keeps the first `left_children` children and returns the separator
    /// between the halves together with the right half.
    pub(crate) fn split(&mut self, left_children: usize) -> (K, BranchNode<K>) {
        let mut right = BranchNode {
            size: 0,
            keys: self.keys.drain(left_children..).collect(),
            children: self.children.drain(left_children..).collect(),
            child_sizes: self.child_sizes.drain(left_children..).collect(),
        };
        right.size = right.child_sizes.iter().sum();
        self.size -= right.size;
        let median = self.keys.pop().expect("branch split leaves the left half without a separator");
        (median, right)
    }

    /// Detaches the first `count` children, returning the separator that
    /// followed them and the detached front part.
    pub(crate) fn split_front(&mut self, count: usize) -> (K, BranchNode<K>) {
        let mut keys: Keys<K> = self.keys.drain(..count).collect();
        let median = keys.pop().expect("branch split leaves the front half without a separator");
        let mut front = BranchNode {
            size: 0,
            keys,
            children: self.children.drain(..count).collect(),
            child_sizes: self.child_sizes.drain(..count).collect(),
        };
        front.size = front.child_sizes.iter().sum();
        self.size -= front.size;
        (median, front)
    }

    /// Puts every child of `left` in front of this branch's children, joined by `separator`.
    pub(crate) fn prepend(&mut self, mut left: BranchNode<K>, separator: K) {
        left.keys.push(separator);
        left.keys.append(&mut self.keys);
        left.children.append(&mut self.children);
        left.child_sizes.append(&mut self.child_sizes);
        left.size += self.size;
        *self = left;
    }

    pub(crate) fn set_key(&mut self, index: usize, key: K) {
        self.keys[index] = key;
    }

    /// Appends every child of `right`, joined by `separator`.
    pub(crate) fn merge_with_right(&mut self, separator: K, mut right: BranchNode<K>) {
        self.keys.push(separator);
        self.keys.append(&mut right.keys);
        self.children.append(&mut right.children);
        self.child_sizes.append(&mut right.child_sizes);
        self.size += right.size;
    }
}

impl<K, V> LeafNode<K, V> {
    pub(crate) fn new() -> Self {
        Self {
            prev: None,
            next: None,
            keys: SmallVec::new(),
            values: SmallVec::new(),
        }
    }

    pub(crate) fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub(crate) fn prev(&self) -> Option<Handle> {
        self.prev
    }

    pub(crate) fn set_prev(&mut self, prev: Option<Handle>) {
        self.prev = prev;
    }

    pub(crate) fn next(&self) -> Option<Handle> {
        self.next
    }

    pub(crate) fn set_next(&mut self, next: Option<Handle>) {
        self.next = next;
    }

    #[inline]
    pub(crate) fn key(&self, index: usize) -> &K {
        &self.keys[index]
    }

    pub(crate) fn keys(&self) -> &[K] {
        &self.keys
    }

    #[inline]
    pub(crate) fn value_mut(&mut self, index: usize) -> &mut V {
        &mut self.values[index]
    }

    #[inline]
    pub(crate) fn entry(&self, index: usize) -> (&K, &V) {
        (&self.keys[index], &self.values[index])
    }

    /// Key and mutable value at `index`; the key stays shared so ordering cannot be broken.
    #[inline]
    pub(crate) fn entry_mut(&mut self, index: usize) -> (&K, &mut V) {
        (&self.keys[index], &mut self.values[index])
    }

    pub(crate) fn last_key(&self) -> Option<&K> {
        self.keys.last()
    }

    /// Position of the first key `>= key`.
    #[inline]
    pub(crate) fn lower<C: Comparator<K>>(&self, comparator: &C, key: &K) -> usize {
        self.keys.partition_point(|k| comparator.less(k, key))
    }

    /// Position of the first key `> key`.
    #[inline]
    pub(crate) fn upper<C: Comparator<K>>(&self, comparator: &C, key: &K) -> usize {
        self.keys.partition_point(|k| !comparator.less(key, k))
    }

    pub(crate) fn insert(&mut self, index: usize, key: K, value: V) {
        self.keys.insert(index, key);
        self.values.insert(index, value);
    }

    pub(crate) fn remove(&mut self, index: usize) -> (K, V) {
        let key = self.keys.remove(index);
        let value = self.values.remove(index);
        (key, value)
    }

    #[cfg(test)]
    pub(crate) fn push(&mut self, key: K, value: V) {
        self.keys.push(key);
        self.values.push(value);
    }

    /// Drops `count` entries starting at `start`.
    pub(crate) fn remove_span(&mut self, start: usize, count: usize) {
        self.keys.drain(start..start + count);
        self.values.drain(start..start + count);
    }

    /// Moves every entry from `at` onwards into a new, unlinked leaf.
    pub(crate) fn split_off(&mut self, at: usize) -> LeafNode<K, V> {
        LeafNode {
            prev: None,
            next: None,
            keys: self.keys.drain(at..).collect(),
            values: self.values.drain(at..).collect(),
        }
    }

    /// Appends the entries of `other`, leaving the chain links alone.
    pub(crate) fn append_entries(&mut self, mut other: LeafNode<K, V>) {
        self.keys.append(&mut other.keys);
        self.values.append(&mut other.values);
    }

    /// Detaches the first `count` entries into a new, unlinked leaf.
    pub(crate) fn take_front(&mut self, count: usize) -> LeafNode<K, V> {
        LeafNode {
            prev: None,
            next: None,
            keys: self.keys.drain(..count).collect(),
            values: self.values.drain(..count).collect(),
        }
    }

    /// Inserts the entries of `other` in front of this leaf's entries.
    pub(crate) fn prepend_entries(&mut self, mut other: LeafNode<K, V>) {
        other.keys.append(&mut self.keys);
        other.values.append(&mut self.values);
        self.keys = other.keys;
        self.values = other.values;
    }

    /// Takes every entry out of the leaf, in order.
    pub(crate) fn take_entries(&mut self) -> Zip<smallvec::IntoIter<[K; INLINE]>, smallvec::IntoIter<[V; INLINE]>> {
        let keys = core::mem::take(&mut self.keys);
        let values = core::mem::take(&mut self.values);
        keys.into_iter().zip(values)
    }

    /// Merges with the right sibling, taking over its `next` link.
    pub(crate) fn merge_with_right(&mut self, right: LeafNode<K, V>) {
        self.next = right.next;
        self.append_entries(right);
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::comparator::Natural;
    use alloc::vec::Vec;

    fn leaf(keys: &[i32]) -> LeafNode<i32, ()> {
        let mut leaf = LeafNode::new();
        for &k in keys {
            leaf.push(k, ());
        }
        leaf
    }

    #[test]
    fn leaf_bounds_straddle_duplicates() {
        let leaf = leaf(&[1, 3, 3, 3, 5]);
        assert_eq!(leaf.lower(&Natural, &3), 1);
        assert_eq!(leaf.upper(&Natural, &3), 4);
        assert_eq!(leaf.lower(&Natural, &4), 4);
        assert_eq!(leaf.upper(&Natural, &0), 0);
        assert_eq!(leaf.lower(&Natural, &9), 5);
    }

    #[test]
    fn leaf_split_and_prepend_keep_order() {
        let mut left = leaf(&[1, 2, 3, 4, 5]);
        let right = left.split_off(3);
        assert_eq!(left.keys(), [1, 2, 3]);
        assert_eq!(right.keys(), [4, 5]);

        let mut tail = leaf(&[6, 7]);
        tail.prepend_entries(right);
        assert_eq!(tail.keys(), [4, 5, 6, 7]);
        tail.remove_span(1, 2);
        assert_eq!(tail.keys(), [4, 7]);
    }

    fn branch(children: usize) -> BranchNode<i32> {
        let mut node = BranchNode::with_children(Handle::from_index(0), 10, 10, Handle::from_index(1), 10);
        for i in 2..children {
            let separator = i32::try_from(i * 10).unwrap();
            node.insert_child(i - 1, separator, Handle::from_index(i), 10);
        }
        node
    }

    #[test]
    fn branch_split_moves_sizes_with_children() {
        let mut left = branch(5);
        assert_eq!(left.keys(), [10, 20, 30, 40]);
        assert_eq!(left.size(), 50);

        let (median, right) = left.split(3);
        assert_eq!(median, 30);
        assert_eq!(left.keys(), [10, 20]);
        assert_eq!(right.keys(), [40]);
        assert_eq!(left.size(), 30);
        assert_eq!(right.size(), 20);

        left.merge_with_right(median, right);
        assert_eq!(left.keys(), [10, 20, 30, 40]);
        assert_eq!(left.size(), 50);
        assert_eq!(left.child_count(), 5);
    }

    #[test]
    fn branch_rotations_through_split_front_and_prepend() {
        let mut right = branch(5);
        let (median, front) = right.split_front(2);
        assert_eq!(median, 20);
        assert_eq!(front.keys(), [10]);
        assert_eq!(front.size(), 20);
        assert_eq!(right.keys(), [30, 40]);
        assert_eq!(right.size(), 30);

        right.prepend(front, median);
        assert_eq!(right.keys(), [10, 20, 30, 40]);
        assert_eq!(right.size(), 50);
        assert_eq!(right.child(0), Handle::from_index(0));
    }

    #[test]
    fn branch_child_selection() {
        let mut node = branch(4);
        node.set_child_size(1, 3);
        assert_eq!(node.child_sizes(), [10, 3, 10, 10]);
        assert_eq!(node.size(), 33);
        assert_eq!(node.child_for_rank(0), (0, 0));
        assert_eq!(node.child_for_rank(12), (1, 2));
        assert_eq!(node.child_for_rank(13), (2, 0));
        assert_eq!(node.child_for_rank(32), (3, 9));
        assert_eq!(node.size_before(2), 13);
        assert_eq!(node.lower_child(&Natural, &20), 1);
        assert_eq!(node.upper_child(&Natural, &20), 2);

        let (key, child) = node.remove_child(0);
        assert_eq!((key, child), (10, Handle::from_index(1)));
        assert_eq!(node.size(), 30);
        let children: Vec<_> = node.children().iter().map(|h| h.to_index()).collect();
        assert_eq!(children, [0, 2, 3]);
    }
}
