//! Structural self-checks for [`RawTree`].

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use core::cmp::Ordering;
use core::fmt::{Debug, Write};

use tracing::warn;

use super::handle::Handle;
use super::node::Node;
use super::raw_tree::RawTree;
use crate::comparator::Comparator;
use crate::error::{Error, Result};

/// Where a subtree sits: its key bounds from the separators above it and
/// whether it lies on the right spine, which is exempt from minimum fill.
struct Frame<'a, K> {
    handle: Handle,
    depth: usize,
    lower: Option<&'a K>,
    upper: Option<&'a K>,
    rightmost: bool,
}

struct Walk {
    leaf_depth: Option<usize>,
    reachable: usize,
    leaves: Vec<Handle>,
}

impl<K, V, C: Comparator<K>> RawTree<K, V, C> {
    /// Verifies every structural invariant, returning the first violation found.
    ///
    /// Checks uniform leaf depth, node fill bounds, key order within nodes,
    /// the separator rule, subtree counts, the leaf chain, the total
    /// length and that every live arena slot belongs to the tree. With `unique` set, equal adjacent keys are also a violation.
    pub(crate) fn check_invariants(&self, unique: bool) -> Result<()> {
        let mut walk = Walk {
            leaf_depth: None,
            reachable: 0,
            leaves: Vec::new(),
        };
        let root = Frame {
            handle: self.root(),
            depth: 0,
            lower: None,
            upper: None,
            rightmost: true,
        };

        let outcome = self
            .check_node(&root, unique, &mut walk)
            .and_then(|size| {
                if size == self.len() {
                    Ok(())
                } else {
                    Err(format!("root counts {size} entries but len is {}", self.len()))
                }
            })
            .and_then(|()| self.check_leaf_chain(&walk.leaves, unique))
            .and_then(|()| {
                let live = self.nodes().len();
                if live == walk.reachable {
                    Ok(())
                } else {
                    Err(format!("arena holds {live} live nodes but {} are reachable", walk.reachable))
                }
            });

        outcome.map_err(|message| {
            warn!(%message, "tree invariant violated");
            Error::Corrupt(message)
        })
    }

    fn check_node(&self, frame: &Frame<'_, K>, unique: bool, walk: &mut Walk) -> core::result::Result<usize, String> {
        let handle = frame.handle.to_index();
        let is_root = frame.depth == 0;
        let node = self
            .nodes()
            .try_get(frame.handle)
            .ok_or_else(|| format!("node {handle} is referenced but not allocated"))?;
        walk.reachable += 1;

        match node {
            Node::Leaf(leaf) => {
                match walk.leaf_depth {
                    None => walk.leaf_depth = Some(frame.depth),
                    Some(depth) if depth != frame.depth => {
                        return Err(format!("leaf {handle} at depth {} but leaves start at depth {depth}", frame.depth));
                    }
                    Some(_) => {}
                }
                walk.leaves.push(frame.handle);

                let count = leaf.key_count();
                if count > self.max_entries() {
                    return Err(format!("leaf {handle} holds {count} entries, more than {}", self.max_entries()));
                }
                if !is_root && count == 0 {
                    return Err(format!("non-root leaf {handle} is empty"));
                }
                if !is_root && !frame.rightmost && count < self.min_entries() {
                    return Err(format!("leaf {handle} holds {count} entries, fewer than {}", self.min_entries()));
                }
                self.check_keys(handle, leaf.keys(), frame, unique)?;
                Ok(count)
            }
            Node::Branch(branch) => {
                let children = branch.child_count();
                if branch.key_count() + 1 != children || branch.child_sizes().len() != children {
                    return Err(format!(
                        "branch {handle} has {} separators, {children} children and {} counts",
                        branch.key_count(),
                        branch.child_sizes().len()
                    ));
                }
                if children > self.max_children() {
                    return Err(format!("branch {handle} has {children} children, more than {}", self.max_children()));
                }
                if children < 2 {
                    return Err(format!("branch {handle} has a single child"));
                }
                if !is_root && !frame.rightmost && children < self.min_children() {
                    return Err(format!("branch {handle} has {children} children, fewer than {}", self.min_children()));
                }
                // Separators may repeat when duplicates straddle a split.
                self.check_keys(handle, branch.keys(), frame, false)?;

                let mut total = 0;
                for (index, &child) in branch.children().iter().enumerate() {
                    let child_frame = Frame {
                        handle: child,
                        depth: frame.depth + 1,
                        lower: if index == 0 { frame.lower } else { Some(branch.key(index - 1)) },
                        upper: if index + 1 == children { frame.upper } else { Some(branch.key(index)) },
                        rightmost: frame.rightmost && index + 1 == children,
                    };
                    let size = self.check_node(&child_frame, unique, walk)?;
                    if size != branch.child_size(index) {
                        return Err(format!(
                            "branch {handle} records {} entries under child {index}, found {size}",
                            branch.child_size(index)
                        ));
                    }
                    total += size;
                }
                if total != branch.size() {
                    return Err(format!("branch {handle} records size {}, children hold {total}", branch.size()));
                }
                Ok(total)
            }
        }
    }

    /// Keys must be sorted and lie within the bounds inherited from the separators above.
    fn check_keys(&self, handle: usize, keys: &[K], frame: &Frame<'_, K>, unique: bool) -> core::result::Result<(), String> {
        let comparator = self.comparator();
        for (index, pair) in keys.windows(2).enumerate() {
            match comparator.compare(&pair[0], &pair[1]) {
                Ordering::Greater => return Err(format!("node {handle} keys out of order at {index}")),
                Ordering::Equal if unique => return Err(format!("node {handle} repeats a key at {index}")),
                _ => {}
            }
        }
        if let (Some(lower), Some(first)) = (frame.lower, keys.first()) {
            if comparator.less(first, lower) {
                return Err(format!("node {handle} has a key below its left separator"));
            }
        }
        if let (Some(upper), Some(last)) = (frame.upper, keys.last()) {
            if comparator.less(upper, last) {
                return Err(format!("node {handle} has a key above its right separator"));
            }
        }
        Ok(())
    }

    fn check_leaf_chain(&self, leaves: &[Handle], unique: bool) -> core::result::Result<(), String> {
        if leaves.first() != Some(&self.first_leaf()) || leaves.last() != Some(&self.last_leaf()) {
            return Err(String::from("first or last leaf does not match the leftmost or rightmost leaf"));
        }
        let comparator = self.comparator();
        for (index, &handle) in leaves.iter().enumerate() {
            let leaf = self.nodes().get(handle).as_leaf();
            let expected_prev = index.checked_sub(1).map(|i| leaves[i]);
            let expected_next = leaves.get(index + 1).copied();
            if leaf.prev() != expected_prev || leaf.next() != expected_next {
                return Err(format!("leaf chain broken at leaf {}", handle.to_index()));
            }
            // Adjacent leaves must also be ordered across the boundary.
            if let (Some(next), Some(last)) = (expected_next, leaf.last_key()) {
                let next_leaf = self.nodes().get(next).as_leaf();
                if next_leaf.key_count() > 0 {
                    match comparator.compare(last, next_leaf.key(0)) {
                        Ordering::Greater => return Err(format!("leaf {} sorts after its successor", handle.to_index())),
                        Ordering::Equal if unique => {
                            return Err(format!("leaf {} repeats a key of its successor", handle.to_index()));
                        }
                        _ => {}
                    }
                }
            }
        }
        Ok(())
    }
}

impl<K: Debug, V, C> RawTree<K, V, C> {
    /// Renders the tree one level per line: branches as `[separators]`,
    /// leaves as `(keys)`.
    pub(crate) fn dump_structure(&self) -> String {
        let mut out = String::new();
        let mut level = alloc::vec![self.root()];
        while !level.is_empty() {
            let mut next_level = Vec::new();
            let rendered: Vec<String> = level
                .iter()
                .map(|&handle| match self.nodes().get(handle) {
                    Node::Branch(branch) => {
                        next_level.extend_from_slice(branch.children());
                        format!("[{}]", join(branch.keys()))
                    }
                    Node::Leaf(leaf) => format!("({})", join(leaf.keys())),
                })
                .collect();
            let _ = writeln!(out, "{}", rendered.join(" "));
            level = next_level;
        }
        out
    }
}

fn join<K: Debug>(keys: &[K]) -> String {
    let parts: Vec<String> = keys.iter().map(|key| format!("{key:?}")).collect();
    parts.join(" ")
}
