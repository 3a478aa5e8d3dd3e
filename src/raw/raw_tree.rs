use alloc::vec::Vec;
use core::cmp::Ordering;
use core::ops::{Bound, RangeBounds};

use smallvec::SmallVec;
use tracing::trace;

use super::arena::Arena;
use super::handle::Handle;
use super::node::{BranchNode, LeafNode, Node};
use crate::comparator::Comparator;
use crate::error::{Error, Result};

/// Smallest accepted node capacity.
pub const MIN_CAPACITY: usize = 4;
/// Largest accepted node capacity.
pub const MAX_CAPACITY: usize = 256;
/// Node capacity used by the `new()` constructors.
pub const DEFAULT_CAPACITY: usize = 128;

/// The counted B+Tree backing every ranked collection.
///
/// A branch holds up to `capacity` children and a leaf up to `capacity - 1`
/// entries. The tree always has a root; the empty tree is a single empty leaf.
#[derive(Clone)]
pub(crate) struct RawTree<K, V, C> {
    /// Arena storing all tree nodes.
    nodes: Arena<Node<K, V>>,
    root: Handle,
    /// Leftmost leaf, for forward iteration.
    first_leaf: Handle,
    /// Rightmost leaf, for reverse iteration and appends.
    last_leaf: Handle,
    /// Total number of entries in the tree.
    len: usize,
    capacity: usize,
    comparator: C,
    /// Bumped by every mutation that moves entries around.
    generation: u64,
}

/// Path element for tracking traversal during mutations.
struct PathElement {
    /// Handle to the branch at this level.
    node: Handle,
    /// Index of the child we descended into.
    child_index: usize,
}

/// Stack of branches from the root down to (but excluding) a leaf.
type Path = SmallVec<[PathElement; 16]>;

/// What to do when a unique insert finds its key already present.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum OnDuplicate {
    Replace,
    Reject,
}

/// Outcome of [`RawTree::insert_unique`].
pub(crate) enum Insertion<V> {
    Inserted { rank: usize },
    Replaced { rank: usize, old: V },
    Rejected { rank: usize },
}

pub(crate) fn validate_capacity(capacity: usize) -> Result<()> {
    if (MIN_CAPACITY..=MAX_CAPACITY).contains(&capacity) {
        Ok(())
    } else {
        Err(Error::InvalidCapacity {
            capacity,
            min: MIN_CAPACITY,
            max: MAX_CAPACITY,
        })
    }
}

/// Finds the leaf position holding `rank` below `root`.
pub(crate) fn locate<K, V>(nodes: &Arena<Node<K, V>>, root: Handle, mut rank: usize) -> (Handle, usize) {
    let mut current = root;
    while let Node::Branch(branch) = nodes.get(current) {
        let (index, rest) = branch.child_for_rank(rank);
        current = branch.child(index);
        rank = rest;
    }
    (current, rank)
}

/// Position after `(leaf, index)` in key order, following the leaf chain.
pub(crate) fn next_position<K, V>(nodes: &Arena<Node<K, V>>, leaf: Handle, index: usize) -> Option<(Handle, usize)> {
    let node = nodes.get(leaf).as_leaf();
    if index + 1 < node.key_count() {
        Some((leaf, index + 1))
    } else {
        node.next().map(|next| (next, 0))
    }
}

/// Position before `(leaf, index)` in key order, following the leaf chain.
pub(crate) fn prev_position<K, V>(nodes: &Arena<Node<K, V>>, leaf: Handle, index: usize) -> Option<(Handle, usize)> {
    if index > 0 {
        return Some((leaf, index - 1));
    }
    let prev = nodes.get(leaf).as_leaf().prev()?;
    Some((prev, nodes.get(prev).as_leaf().key_count() - 1))
}

impl<K, V, C> RawTree<K, V, C> {
    /// Creates an empty tree, rejecting capacities outside `MIN_CAPACITY..=MAX_CAPACITY`.
    pub(crate) fn new(capacity: usize, comparator: C) -> Result<Self> {
        validate_capacity(capacity)?;
        Ok(Self::build(capacity, comparator))
    }

    /// Creates an empty tree with [`DEFAULT_CAPACITY`].
    pub(crate) fn with_comparator(comparator: C) -> Self {
        Self::build(DEFAULT_CAPACITY, comparator)
    }

    fn build(capacity: usize, comparator: C) -> Self {
        let mut nodes = Arena::new();
        let root = nodes.alloc(Node::Leaf(LeafNode::new()));
        Self {
            nodes,
            root,
            first_leaf: root,
            last_leaf: root,
            len: 0,
            capacity,
            comparator,
            generation: 0,
        }
    }

    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    pub(crate) const fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) const fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) const fn comparator(&self) -> &C {
        &self.comparator
    }

    pub(crate) const fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) const fn root(&self) -> Handle {
        self.root
    }

    pub(crate) const fn first_leaf(&self) -> Handle {
        self.first_leaf
    }

    pub(crate) const fn last_leaf(&self) -> Handle {
        self.last_leaf
    }

    pub(crate) const fn nodes(&self) -> &Arena<Node<K, V>> {
        &self.nodes
    }

    /// Most children a branch may hold.
    pub(crate) const fn max_children(&self) -> usize {
        self.capacity
    }

    /// Fewest children a non-root, non-rightmost branch may hold.
    pub(crate) const fn min_children(&self) -> usize {
        self.capacity.div_ceil(2)
    }

    /// Most entries a leaf may hold.
    pub(crate) const fn max_entries(&self) -> usize {
        self.capacity - 1
    }

    /// Fewest entries a non-root, non-rightmost leaf may hold.
    pub(crate) const fn min_entries(&self) -> usize {
        (self.capacity - 1).div_ceil(2)
    }

    /// Number of levels, counting the leaf level.
    pub(crate) fn height(&self) -> usize {
        let mut height = 1;
        let mut current = self.root;
        while let Node::Branch(branch) = self.nodes.get(current) {
            current = branch.child(0);
            height += 1;
        }
        height
    }

    fn bump_generation(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    /// Removes every entry, leaving a single empty leaf.
    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
        self.root = self.nodes.alloc(Node::Leaf(LeafNode::new()));
        self.first_leaf = self.root;
        self.last_leaf = self.root;
        self.len = 0;
        self.bump_generation();
    }

    /// Moves every entry out in key order by walking the leaf chain, without rebalancing.
    pub(crate) fn into_entries(mut self) -> Vec<(K, V)> {
        let mut entries = Vec::with_capacity(self.len);
        let mut current = Some(self.first_leaf);
        while let Some(handle) = current {
            let leaf = self.nodes.get_mut(handle).as_leaf_mut();
            current = leaf.next();
            entries.extend(leaf.take_entries());
        }
        entries
    }

    /// Leaf position of `rank`, which must be `< len`.
    pub(crate) fn locate(&self, rank: usize) -> (Handle, usize) {
        locate(&self.nodes, self.root, rank)
    }

    /// Entry at a live leaf position, or `None` if the position no longer exists.
    pub(crate) fn try_entry(&self, leaf: Handle, index: usize) -> Option<(&K, &V)> {
        match self.nodes.try_get(leaf)? {
            Node::Leaf(node) if index < node.key_count() => Some(node.entry(index)),
            _ => None,
        }
    }

    /// Like [`locate`](Self::locate), also recording the branches passed on the way down.
    fn path_to_rank(&self, mut rank: usize) -> (Path, Handle, usize) {
        let mut path = Path::new();
        let mut current = self.root;
        while let Node::Branch(branch) = self.nodes.get(current) {
            let (index, rest) = branch.child_for_rank(rank);
            path.push(PathElement {
                node: current,
                child_index: index,
            });
            current = branch.child(index);
            rank = rest;
        }
        (path, current, rank)
    }

    pub(crate) fn get_by_rank(&self, rank: usize) -> Option<(&K, &V)> {
        if rank >= self.len {
            return None;
        }
        let (leaf, index) = self.locate(rank);
        Some(self.nodes.get(leaf).as_leaf().entry(index))
    }

    pub(crate) fn get_by_rank_mut(&mut self, rank: usize) -> Option<(&K, &mut V)> {
        if rank >= self.len {
            return None;
        }
        let (leaf, index) = self.locate(rank);
        Some(self.nodes.get_mut(leaf).as_leaf_mut().entry_mut(index))
    }

    pub(crate) fn first(&self) -> Option<(&K, &V)> {
        let leaf = self.nodes.get(self.first_leaf).as_leaf();
        (leaf.key_count() > 0).then(|| leaf.entry(0))
    }

    pub(crate) fn last(&self) -> Option<(&K, &V)> {
        let leaf = self.nodes.get(self.last_leaf).as_leaf();
        leaf.key_count().checked_sub(1).map(|index| leaf.entry(index))
    }
}

impl<K: Clone, V, C> RawTree<K, V, C> {
    /// Appends an entry after every existing one. The caller guarantees the
    /// key does not sort before the current last key.
    pub(crate) fn push_last(&mut self, key: K, value: V) {
        let mut path = Path::new();
        let mut current = self.root;
        while let Node::Branch(branch) = self.nodes.get(current) {
            let index = branch.child_count() - 1;
            path.push(PathElement {
                node: current,
                child_index: index,
            });
            current = branch.child(index);
        }
        let index = self.nodes.get(current).as_leaf().key_count();
        self.insert_at(&mut path, current, index, key, value);
    }

    /// Inserts into the leaf reached through `path` and splits upwards as needed.
    fn insert_at(&mut self, path: &mut Path, leaf_handle: Handle, index: usize, key: K, value: V) {
        self.len += 1;
        self.bump_generation();
        for element in path.iter() {
            self.nodes.get_mut(element.node).as_branch_mut().add_to_child(element.child_index, 1);
        }

        let max_entries = self.max_entries();
        let leaf = self.nodes.get_mut(leaf_handle).as_leaf_mut();
        leaf.insert(index, key, value);
        if leaf.key_count() > max_entries {
            // Inserting past the current maximum splits off a single-entry
            // leaf so ascending loads end up with full nodes.
            let appending = leaf.next().is_none() && index + 1 == leaf.key_count();
            self.split_leaf(path, leaf_handle, appending);
        }
    }

    fn split_leaf(&mut self, path: &mut Path, leaf_handle: Handle, appending: bool) {
        let leaf = self.nodes.get_mut(leaf_handle).as_leaf_mut();
        let at = if appending { leaf.key_count() - 1 } else { leaf.key_count() / 2 };
        let mut right = leaf.split_off(at);
        let separator = leaf.last_key().expect("split leaves the left leaf empty").clone();
        let left_size = leaf.key_count();
        let old_next = leaf.next();

        right.set_prev(Some(leaf_handle));
        right.set_next(old_next);
        let right_size = right.key_count();
        let right_handle = self.nodes.alloc(Node::Leaf(right));

        self.nodes.get_mut(leaf_handle).as_leaf_mut().set_next(Some(right_handle));
        match old_next {
            Some(next) => self.nodes.get_mut(next).as_leaf_mut().set_prev(Some(right_handle)),
            None => self.last_leaf = right_handle,
        }

        self.propagate_split(path, separator, right_handle, left_size, right_size, appending);
    }

    /// Hands a new right sibling to each parent in turn, splitting full
    /// branches, and grows a new root when the old one splits.
    fn propagate_split(
        &mut self,
        path: &mut Path,
        mut separator: K,
        mut new_child: Handle,
        mut left_size: usize,
        mut right_size: usize,
        appending: bool,
    ) {
        let max_children = self.max_children();
        while let Some(element) = path.pop() {
            let parent = self.nodes.get_mut(element.node).as_branch_mut();
            parent.set_child_size(element.child_index, left_size);
            parent.insert_child(element.child_index, separator, new_child, right_size);
            if parent.child_count() <= max_children {
                return;
            }

            // An appending split keeps the last two children together so the
            // new branch never starts out with a single child.
            let left_children = if appending {
                parent.child_count() - 2
            } else {
                parent.child_count().div_ceil(2)
            };
            let (median, right) = parent.split(left_children);
            left_size = parent.size();
            right_size = right.size();
            separator = median;
            new_child = self.nodes.alloc(Node::Branch(right));
        }

        let old_root = self.root;
        let root = BranchNode::with_children(old_root, left_size, separator, new_child, right_size);
        self.root = self.nodes.alloc(Node::Branch(root));
        trace!(height = self.height(), len = self.len, "root split");
    }

    /// Removes the entry at `rank`.
    pub(crate) fn remove_at(&mut self, rank: usize) -> Option<(K, V)> {
        if rank >= self.len {
            return None;
        }
        let (mut path, leaf, index) = self.path_to_rank(rank);
        let entry = self.nodes.get_mut(leaf).as_leaf_mut().remove(index);
        self.after_removal(&mut path, leaf, 1);
        Some(entry)
    }

    pub(crate) fn pop_first(&mut self) -> Option<(K, V)> {
        self.remove_at(0)
    }

    pub(crate) fn pop_last(&mut self) -> Option<(K, V)> {
        self.remove_at(self.len.checked_sub(1)?)
    }

    /// Removes `count` consecutive entries starting at rank `start`.
    ///
    /// Each round drains whatever the leaf holding `start` has left in the
    /// range and repairs that leaf before the next round, so the tree is
    /// valid between rounds and the cost is `O((count / capacity + 1) * log n)`.
    pub(crate) fn remove_range(&mut self, start: usize, count: usize) -> Result<()> {
        match start.checked_add(count) {
            Some(end) if end <= self.len => {}
            _ => {
                return Err(Error::RankOutOfRange {
                    rank: start.saturating_add(count),
                    len: self.len,
                });
            }
        }
        if count == 0 {
            return Ok(());
        }
        if count == self.len {
            self.clear();
            return Ok(());
        }

        trace!(start, count, "removing rank range");
        let mut remaining = count;
        while remaining > 0 {
            let (mut path, leaf, index) = self.path_to_rank(start);
            let node = self.nodes.get_mut(leaf).as_leaf_mut();
            let removed = remaining.min(node.key_count() - index);
            node.remove_span(index, removed);
            self.after_removal(&mut path, leaf, removed);
            remaining -= removed;
        }
        Ok(())
    }

    /// Keeps only the entries for which `keep` returns `true`.
    pub(crate) fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&K, &mut V) -> bool,
    {
        let mut rank = 0;
        while let Some((key, value)) = self.get_by_rank_mut(rank) {
            if keep(key, value) {
                rank += 1;
            } else {
                self.remove_at(rank);
            }
        }
    }

    /// Bookkeeping shared by every removal: counts along `path` drop by
    /// `removed`, then underfull nodes are repaired bottom-up.
    fn after_removal(&mut self, path: &mut Path, leaf: Handle, removed: usize) {
        self.len -= removed;
        self.bump_generation();
        for element in path.iter() {
            self.nodes.get_mut(element.node).as_branch_mut().sub_from_child(element.child_index, removed);
        }

        let mut node = leaf;
        while let Some(element) = path.pop() {
            if !self.is_underfull(node) || !self.rebalance_child(element.node, element.child_index) {
                break;
            }
            node = element.node;
        }
        self.collapse_root();
    }

    fn min_fill(&self, node: &Node<K, V>) -> usize {
        match node {
            Node::Branch(_) => self.min_children(),
            Node::Leaf(_) => self.min_entries(),
        }
    }

    fn is_underfull(&self, handle: Handle) -> bool {
        let node = self.nodes.get(handle);
        node.fill() < self.min_fill(node)
    }

    /// Restores the minimum fill of `children[index]` of `parent`, borrowing
    /// from a sibling that can spare the shortfall or merging otherwise.
    ///
    /// Returns `true` if a merge removed a child from `parent`, which may
    /// leave the parent underfull in turn.
    fn rebalance_child(&mut self, parent: Handle, index: usize) -> bool {
        let branch = self.nodes.get(parent).as_branch();
        let child_count = branch.child_count();
        let node = self.nodes.get(branch.child(index));
        let min = self.min_fill(node);
        let need = min - node.fill();
        let left_fill = (index > 0).then(|| self.nodes.get(branch.child(index - 1)).fill());
        let right_fill = (index + 1 < child_count).then(|| self.nodes.get(branch.child(index + 1)).fill());

        if left_fill.is_some_and(|fill| fill >= min + need) {
            self.borrow_from_left(parent, index, need);
            false
        } else if right_fill.is_some_and(|fill| fill >= min + need) {
            self.borrow_from_right(parent, index, need);
            false
        } else if left_fill.is_some() {
            self.merge_children(parent, index - 1);
            true
        } else if right_fill.is_some() {
            self.merge_children(parent, index);
            true
        } else {
            false
        }
    }

    /// Moves the last `count` entries (or children) of `children[index - 1]`
    /// to the front of `children[index]`.
    fn borrow_from_left(&mut self, parent: Handle, index: usize, count: usize) {
        let branch = self.nodes.get(parent).as_branch();
        let left = branch.child(index - 1);
        let node = branch.child(index);

        let separator = match self.nodes.get_mut(left) {
            Node::Leaf(left_leaf) => {
                let moved = left_leaf.split_off(left_leaf.key_count() - count);
                let separator = left_leaf.last_key().expect("borrow empties the left leaf").clone();
                self.nodes.get_mut(node).as_leaf_mut().prepend_entries(moved);
                separator
            }
            Node::Branch(left_branch) => {
                let (separator, moved) = left_branch.split(left_branch.child_count() - count);
                let old_separator = self.nodes.get(parent).as_branch().key(index - 1).clone();
                self.nodes.get_mut(node).as_branch_mut().prepend(moved, old_separator);
                separator
            }
        };

        self.refresh_pair(parent, index - 1, separator);
    }

    /// Moves the first `count` entries (or children) of `children[index + 1]`
    /// to the back of `children[index]`.
    fn borrow_from_right(&mut self, parent: Handle, index: usize, count: usize) {
        let branch = self.nodes.get(parent).as_branch();
        let node = branch.child(index);
        let right = branch.child(index + 1);

        let separator = match self.nodes.get_mut(right) {
            Node::Leaf(right_leaf) => {
                let moved = right_leaf.take_front(count);
                let leaf = self.nodes.get_mut(node).as_leaf_mut();
                leaf.append_entries(moved);
                leaf.last_key().expect("borrow leaves the leaf empty").clone()
            }
            Node::Branch(right_branch) => {
                let (separator, moved) = right_branch.split_front(count);
                let old_separator = self.nodes.get(parent).as_branch().key(index).clone();
                self.nodes.get_mut(node).as_branch_mut().merge_with_right(old_separator, moved);
                separator
            }
        };

        self.refresh_pair(parent, index, separator);
    }

    /// Stores the new separator between `children[index]` and
    /// `children[index + 1]` and re-reads both of their counts.
    fn refresh_pair(&mut self, parent: Handle, index: usize, separator: K) {
        let branch = self.nodes.get(parent).as_branch();
        let left_size = self.nodes.get(branch.child(index)).size();
        let right_size = self.nodes.get(branch.child(index + 1)).size();

        let branch = self.nodes.get_mut(parent).as_branch_mut();
        branch.set_key(index, separator);
        branch.set_child_size(index, left_size);
        branch.set_child_size(index + 1, right_size);
    }

    /// Merges `children[index + 1]` into `children[index]`.
    fn merge_children(&mut self, parent: Handle, index: usize) {
        let (separator, right) = self.nodes.get_mut(parent).as_branch_mut().remove_child(index);
        let left = self.nodes.get(parent).as_branch().child(index);

        match self.nodes.take(right) {
            Node::Leaf(right_leaf) => {
                let next = right_leaf.next();
                self.nodes.get_mut(left).as_leaf_mut().merge_with_right(right_leaf);
                match next {
                    Some(next) => self.nodes.get_mut(next).as_leaf_mut().set_prev(Some(left)),
                    None => self.last_leaf = left,
                }
            }
            Node::Branch(right_branch) => {
                self.nodes.get_mut(left).as_branch_mut().merge_with_right(separator, right_branch);
            }
        }

        let size = self.nodes.get(left).size();
        self.nodes.get_mut(parent).as_branch_mut().set_child_size(index, size);
    }

    /// Replaces a root branch that has a single child with that child.
    fn collapse_root(&mut self) {
        while let Node::Branch(branch) = self.nodes.get(self.root) {
            if branch.child_count() > 1 {
                break;
            }
            let child = branch.child(0);
            self.nodes.free(self.root);
            self.root = child;
            trace!(height = self.height(), len = self.len, "root collapsed");
        }
    }
}

impl<K, V, C: Comparator<K>> RawTree<K, V, C> {
    /// Rank of the first entry `>= key`, plus the leaf position the descent ended on.
    fn descend_lower(&self, key: &K) -> (usize, Handle, usize) {
        let mut current = self.root;
        let mut rank = 0;
        while let Node::Branch(branch) = self.nodes.get(current) {
            let index = branch.lower_child(&self.comparator, key);
            rank += branch.size_before(index);
            current = branch.child(index);
        }
        let index = self.nodes.get(current).as_leaf().lower(&self.comparator, key);
        (rank + index, current, index)
    }

    /// Number of entries `< key`.
    pub(crate) fn lower_rank(&self, key: &K) -> usize {
        self.descend_lower(key).0
    }

    /// Number of entries `<= key`.
    pub(crate) fn upper_rank(&self, key: &K) -> usize {
        let mut current = self.root;
        let mut rank = 0;
        while let Node::Branch(branch) = self.nodes.get(current) {
            let index = branch.upper_child(&self.comparator, key);
            rank += branch.size_before(index);
            current = branch.child(index);
        }
        rank + self.nodes.get(current).as_leaf().upper(&self.comparator, key)
    }

    /// Finds the first entry equal to `key`. On a miss the error carries the
    /// rank `key` would be inserted at.
    fn find(&self, key: &K) -> core::result::Result<(usize, Handle, usize), usize> {
        let (rank, mut leaf, mut index) = self.descend_lower(key);
        let mut node = self.nodes.get(leaf).as_leaf();
        if index == node.key_count() {
            // Separators may equal keys in the left subtree, so the first
            // match can be the head of the next leaf.
            leaf = node.next().ok_or(rank)?;
            node = self.nodes.get(leaf).as_leaf();
            index = 0;
        }
        if self.comparator.equal(node.key(index), key) {
            Ok((rank, leaf, index))
        } else {
            Err(rank)
        }
    }

    pub(crate) fn rank_of(&self, key: &K) -> core::result::Result<usize, usize> {
        self.find(key).map(|(rank, ..)| rank)
    }

    pub(crate) fn get(&self, key: &K) -> Option<(&K, &V)> {
        let (_, leaf, index) = self.find(key).ok()?;
        Some(self.nodes.get(leaf).as_leaf().entry(index))
    }

    pub(crate) fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let (_, leaf, index) = self.find(key).ok()?;
        Some(self.nodes.get_mut(leaf).as_leaf_mut().value_mut(index))
    }

    pub(crate) fn contains(&self, key: &K) -> bool {
        self.find(key).is_ok()
    }

    /// Number of entries equal to `key`.
    pub(crate) fn count_of(&self, key: &K) -> usize {
        self.upper_rank(key) - self.lower_rank(key)
    }

    /// Like [`rank_bounds`](Self::rank_bounds), for the `range` methods.
    ///
    /// # Panics
    ///
    /// Panics if the start bound sorts after the end bound, or if both are
    /// excluded and equal.
    pub(crate) fn checked_rank_bounds<R: RangeBounds<K>>(&self, range: &R) -> (usize, usize) {
        if let (Bound::Included(start) | Bound::Excluded(start), Bound::Included(end) | Bound::Excluded(end)) =
            (range.start_bound(), range.end_bound())
        {
            let both_excluded = matches!(range.start_bound(), Bound::Excluded(_)) && matches!(range.end_bound(), Bound::Excluded(_));
            let valid = match self.comparator.compare(start, end) {
                Ordering::Less => true,
                Ordering::Equal => !both_excluded,
                Ordering::Greater => false,
            };
            assert!(valid, "range start is greater than range end");
        }
        self.rank_bounds(range)
    }

    /// Resolves key bounds to a half-open rank interval. An inverted range
    /// resolves to an empty interval at its start.
    pub(crate) fn rank_bounds<R: RangeBounds<K>>(&self, range: &R) -> (usize, usize) {
        let start = match range.start_bound() {
            Bound::Included(key) => self.lower_rank(key),
            Bound::Excluded(key) => self.upper_rank(key),
            Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            Bound::Included(key) => self.upper_rank(key),
            Bound::Excluded(key) => self.lower_rank(key),
            Bound::Unbounded => self.len,
        };
        (start, end.max(start))
    }
}

impl<K: Clone, V, C: Comparator<K>> RawTree<K, V, C> {
    /// Descends to the position just after every key `<= key`, recording the
    /// path and the rank of the leaf's first entry.
    fn descend_upper(&self, key: &K) -> (Path, Handle, usize) {
        let mut path = Path::new();
        let mut current = self.root;
        let mut base = 0;
        while let Node::Branch(branch) = self.nodes.get(current) {
            let index = branch.upper_child(&self.comparator, key);
            base += branch.size_before(index);
            path.push(PathElement {
                node: current,
                child_index: index,
            });
            current = branch.child(index);
        }
        (path, current, base)
    }

    /// Inserts `key` unless an equal key is present, in which case
    /// `on_duplicate` decides between replacing its value and dropping `value`.
    pub(crate) fn insert_unique(&mut self, key: K, value: V, on_duplicate: OnDuplicate) -> Insertion<V> {
        let (mut path, leaf_handle, base) = self.descend_upper(&key);
        let leaf = self.nodes.get(leaf_handle).as_leaf();
        let index = leaf.upper(&self.comparator, &key);

        // The predecessor is the only entry that can equal `key`.
        let existing = if index > 0 {
            self.comparator.equal(leaf.key(index - 1), &key).then_some((leaf_handle, index - 1))
        } else {
            leaf.prev().and_then(|prev| {
                let prev_leaf = self.nodes.get(prev).as_leaf();
                let last = prev_leaf.key_count() - 1;
                self.comparator.equal(prev_leaf.key(last), &key).then_some((prev, last))
            })
        };

        if let Some((handle, position)) = existing {
            let rank = base + index - 1;
            return match on_duplicate {
                OnDuplicate::Replace => {
                    let slot = self.nodes.get_mut(handle).as_leaf_mut().value_mut(position);
                    Insertion::Replaced {
                        rank,
                        old: core::mem::replace(slot, value),
                    }
                }
                OnDuplicate::Reject => Insertion::Rejected { rank },
            };
        }

        self.insert_at(&mut path, leaf_handle, index, key, value);
        Insertion::Inserted { rank: base + index }
    }

    /// Inserts after every entry whose key is `<= key`, returning the new entry's rank.
    pub(crate) fn insert_multi(&mut self, key: K, value: V) -> usize {
        let (mut path, leaf, base) = self.descend_upper(&key);
        let index = self.nodes.get(leaf).as_leaf().upper(&self.comparator, &key);
        self.insert_at(&mut path, leaf, index, key, value);
        base + index
    }

    /// Removes the lowest-ranked entry equal to `key`.
    pub(crate) fn remove_first(&mut self, key: &K) -> Option<(usize, K, V)> {
        let rank = self.rank_of(key).ok()?;
        self.remove_at(rank).map(|(key, value)| (rank, key, value))
    }

    /// Removes every entry equal to `key`, returning how many there were.
    pub(crate) fn remove_all(&mut self, key: &K) -> usize {
        let start = self.lower_rank(key);
        let count = self.upper_rank(key) - start;
        if count > 0 {
            let removed = self.remove_range(start, count);
            debug_assert!(removed.is_ok());
        }
        count
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::comparator::Natural;
    use proptest::prelude::*;

    type Tree = RawTree<i32, i32, Natural>;

    fn tree(capacity: usize) -> Tree {
        RawTree::new(capacity, Natural).unwrap()
    }

    fn keys(tree: &Tree) -> Vec<i32> {
        (0..tree.len()).map(|rank| *tree.get_by_rank(rank).unwrap().0).collect()
    }

    #[test]
    fn capacity_bounds() {
        assert!(RawTree::<i32, (), _>::new(3, Natural).is_err());
        assert!(RawTree::<i32, (), _>::new(257, Natural).is_err());
        assert_eq!(
            RawTree::<i32, (), _>::new(0, Natural).err(),
            Some(Error::InvalidCapacity {
                capacity: 0,
                min: MIN_CAPACITY,
                max: MAX_CAPACITY
            })
        );
        assert!(RawTree::<i32, (), _>::new(MIN_CAPACITY, Natural).is_ok());
        assert!(RawTree::<i32, (), _>::new(MAX_CAPACITY, Natural).is_ok());
    }

    #[test]
    fn empty_tree_rank_operations() {
        let tree = tree(4);
        tree.check_invariants(true).unwrap();

        assert!(tree.get_by_rank(0).is_none());
        assert!(tree.first().is_none());
        assert!(tree.last().is_none());
        assert_eq!(tree.rank_of(&0), Err(0));
        assert_eq!(tree.lower_rank(&5), 0);
        assert_eq!(tree.upper_rank(&5), 0);
        assert_eq!(tree.height(), 1);
    }

    fn leaf_counts(tree: &Tree) -> Vec<usize> {
        let mut leaf = Some(tree.first_leaf());
        let mut counts = Vec::new();
        while let Some(handle) = leaf {
            let node = tree.nodes().get(handle).as_leaf();
            counts.push(node.key_count());
            leaf = node.next();
        }
        counts
    }

    #[test]
    fn ascending_load_fills_every_node() {
        let mut tree = tree(5);
        for key in (2..=40).step_by(2) {
            tree.insert_unique(key, key * 2, OnDuplicate::Reject);
        }
        tree.check_invariants(true).unwrap();
        assert_eq!(tree.height(), 2);
        assert_eq!(leaf_counts(&tree), [4, 4, 4, 4, 4]);
        assert_eq!(tree.nodes().get(tree.root()).as_branch().child_count(), 5);

        tree.insert_unique(42, 84, OnDuplicate::Reject);
        tree.check_invariants(true).unwrap();
        assert_eq!(tree.height(), 3);
        assert_eq!(leaf_counts(&tree), [4, 4, 4, 4, 4, 1]);
    }

    #[test]
    fn unique_insert_reports_duplicates() {
        let mut tree = tree(4);
        for key in [10, 20, 30, 40, 50, 60] {
            assert!(matches!(tree.insert_unique(key, key, OnDuplicate::Reject), Insertion::Inserted { .. }));
        }
        // Leaves are (10 20 30) (40 50 60): 30 is found through the previous leaf.
        for (key, rank) in [(10, 0), (30, 2), (40, 3), (60, 5)] {
            assert!(matches!(
                tree.insert_unique(key, 0, OnDuplicate::Reject),
                Insertion::Rejected { rank: r } if r == rank
            ));
        }
        assert!(matches!(
            tree.insert_unique(40, 7, OnDuplicate::Replace),
            Insertion::Replaced { rank: 3, old: 40 }
        ));
        assert_eq!(tree.get(&40), Some((&40, &7)));
        assert_eq!(tree.len(), 6);
        tree.check_invariants(true).unwrap();
    }

    #[test]
    fn duplicates_keep_insertion_order() {
        let mut tree = tree(4);
        for value in 0..20 {
            tree.insert_multi(7, value);
        }
        tree.insert_multi(3, -1);
        tree.insert_multi(9, -2);
        tree.check_invariants(false).unwrap();

        assert_eq!(tree.rank_of(&7), Ok(1));
        assert_eq!(tree.count_of(&7), 20);
        let values: Vec<i32> = (1..21).map(|rank| *tree.get_by_rank(rank).unwrap().1).collect();
        assert_eq!(values, (0..20).collect::<Vec<_>>());

        assert_eq!(tree.remove_first(&7), Some((1, 7, 0)));
        assert_eq!(tree.remove_all(&7), 19);
        assert_eq!(keys(&tree), [3, 9]);
        tree.check_invariants(false).unwrap();
    }

    #[test]
    fn generation_tracks_structural_changes() {
        let mut tree = tree(4);
        let start = tree.generation();
        tree.insert_unique(1, 1, OnDuplicate::Replace);
        assert_ne!(tree.generation(), start);

        let after_insert = tree.generation();
        tree.insert_unique(1, 2, OnDuplicate::Replace);
        assert_eq!(tree.generation(), after_insert);

        tree.remove_at(0);
        assert_ne!(tree.generation(), after_insert);
    }

    #[test]
    fn remove_range_rejects_overflow() {
        let mut tree = tree(4);
        for key in 0..10 {
            tree.push_last(key, key);
        }
        assert_eq!(tree.remove_range(5, 6), Err(Error::RankOutOfRange { rank: 11, len: 10 }));
        assert_eq!(
            tree.remove_range(usize::MAX, 2),
            Err(Error::RankOutOfRange { rank: usize::MAX, len: 10 })
        );
        assert_eq!(tree.remove_range(10, 0), Ok(()));
        assert_eq!(tree.len(), 10);
    }

    #[test]
    fn into_entries_walks_the_chain() {
        let mut tree = tree(4);
        for key in (0..50).rev() {
            tree.insert_multi(key, -key);
        }
        let entries = tree.into_entries();
        assert_eq!(entries.len(), 50);
        assert!(entries.iter().enumerate().all(|(i, &(k, v))| k == i as i32 && v == -k));
    }

    #[test]
    fn root_collapses_back_to_a_leaf() {
        let mut tree = tree(4);
        for key in 0..100 {
            tree.insert_multi(key, key);
        }
        assert!(tree.height() > 2);
        while tree.pop_first().is_some() {
            tree.check_invariants(false).unwrap();
        }
        assert_eq!(tree.height(), 1);
        assert!(tree.is_empty());
    }

    #[test]
    fn merges_release_their_nodes() {
        let mut tree = tree(4);
        for key in (0..120).rev() {
            tree.insert_multi(key / 3, key);
        }
        tree.remove_range(10, 90).unwrap();
        tree.check_invariants(false).unwrap();

        // A slot nothing points at is reported as a leak.
        tree.nodes.alloc(Node::Leaf(LeafNode::new()));
        assert!(matches!(
            tree.check_invariants(false),
            Err(Error::Corrupt(message)) if message.contains("live nodes")
        ));
    }

    #[test]
    fn rejected_insert_keeps_the_stored_value() {
        let mut tree = tree(4);
        tree.insert_unique(5, 50, OnDuplicate::Reject);
        assert!(matches!(tree.insert_unique(5, 99, OnDuplicate::Reject), Insertion::Rejected { rank: 0 }));
        assert_eq!(tree.get(&5), Some((&5, &50)));
        assert_eq!(tree.generation(), 1);
    }

    #[derive(Clone, Debug)]
    enum Op {
        Insert(i32),
        Remove(i32),
        RemoveAt(usize),
        RemoveRange(usize, usize),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            6 => (0i32..200).prop_map(Op::Insert),
            2 => (0i32..200).prop_map(Op::Remove),
            1 => any::<usize>().prop_map(Op::RemoveAt),
            1 => (any::<usize>(), 0usize..40).prop_map(|(start, count)| Op::RemoveRange(start, count)),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn tree_matches_sorted_vec(capacity in 4usize..8, ops in prop::collection::vec(op_strategy(), 0..400)) {
            let mut tree = tree(capacity);
            let mut model: Vec<i32> = Vec::new();

            for op in ops {
                match op {
                    Op::Insert(key) => {
                        let rank = tree.insert_multi(key, key);
                        let expected = model.partition_point(|&k| k <= key);
                        prop_assert_eq!(rank, expected);
                        model.insert(expected, key);
                    }
                    Op::Remove(key) => {
                        let removed = tree.remove_first(&key).map(|(rank, _, _)| rank);
                        let expected = model.iter().position(|&k| k == key);
                        if let Some(index) = expected {
                            model.remove(index);
                        }
                        prop_assert_eq!(removed, expected);
                    }
                    Op::RemoveAt(which) => {
                        if model.is_empty() {
                            prop_assert!(tree.remove_at(0).is_none());
                            continue;
                        }
                        let rank = which % model.len();
                        prop_assert_eq!(tree.remove_at(rank).map(|(k, _)| k), Some(model.remove(rank)));
                    }
                    Op::RemoveRange(start, count) => {
                        let start = start % (model.len() + 1);
                        let count = count.min(model.len() - start);
                        tree.remove_range(start, count).unwrap();
                        model.drain(start..start + count);
                    }
                }
                prop_assert!(tree.check_invariants(false).is_ok(), "{:?}", tree.check_invariants(false));
                prop_assert_eq!(tree.len(), model.len());
            }

            prop_assert_eq!(keys(&tree), model.clone());
            for &key in &model {
                prop_assert_eq!(tree.lower_rank(&key), model.partition_point(|&k| k < key));
                prop_assert_eq!(tree.upper_rank(&key), model.partition_point(|&k| k <= key));
            }
        }

        #[test]
        fn unique_inserts_match_btree_set(capacity in 4usize..8, keys in prop::collection::vec(0i32..300, 0..300)) {
            let mut tree = tree(capacity);
            let mut model = alloc::collections::BTreeSet::new();
            for key in keys {
                let inserted = matches!(tree.insert_unique(key, key, OnDuplicate::Reject), Insertion::Inserted { .. });
                prop_assert_eq!(inserted, model.insert(key));
            }
            tree.check_invariants(true).unwrap();
            for (rank, key) in model.iter().enumerate() {
                prop_assert_eq!(tree.rank_of(key), Ok(rank));
            }
        }
    }
}
