//! Rank-indexable ordered collections for Rust.
//!
//! This crate provides four ordered collections built on one counted B+Tree:
//!
//! - [`RankedMap`] - unique keys with values
//! - [`RankedMultiMap`] - duplicate keys with values, equal keys in insertion order
//! - [`RankedSet`] - unique items
//! - [`RankedBag`] - a multiset, equal items in insertion order
//!
//! Besides the usual ordered-collection operations, each one answers
//! order-statistic queries in `O(log n)`:
//!
//! - `get_by_rank` - the element at a given sorted position
//! - `rank_of` - the sorted position of a key
//! - `remove_at` and `remove_range` - deletion by position
//! - Indexing by [`Rank`], e.g. `map[Rank(0)]` for the first value
//!
//! # Example
//!
//! ```
//! use ranked_tree::{RankedMap, Rank};
//!
//! let mut scores = RankedMap::new();
//! scores.insert("Alice", 100);
//! scores.insert("Bob", 85);
//! scores.insert("Carol", 92);
//!
//! assert_eq!(scores.get(&"Bob"), Some(&85));
//! assert_eq!(scores.len(), 3);
//!
//! let (name, score) = scores.get_by_rank(1).unwrap();
//! assert_eq!((*name, *score), ("Bob", 85));
//! assert_eq!(scores.rank_of(&"Carol"), Ok(2));
//! assert_eq!(scores[Rank(0)], 100);
//! ```
//!
//! # Features
//!
//! - **`no_std` compatible** - Only requires `alloc`
//! - **Pluggable ordering** - Any [`Comparator`], not just [`Ord`]
//! - **Detached cursors** - [`Cursor`]s survive mutation and report [`Error::StaleCursor`] instead of misbehaving
//! - **Persistence** - Every collection serializes through serde as a [`Snapshot`] and is validated on load
//!
//! # Implementation
//!
//! The collections are B+Trees (all entries in leaves, linked leaf chain)
//! whose branches record the entry count below each child. Nodes live in an
//! arena and refer to each other by index. The node capacity is chosen per
//! collection between [`MIN_CAPACITY`] and [`MAX_CAPACITY`].

#![no_std]
// These forbid rules and lint groups are meant to be very restrictive.
#![forbid(unsafe_code)]
#![forbid(keyword_idents)]
#![forbid(non_ascii_idents)]
#![forbid(unreachable_pub)]
#![warn(clippy::all)]
#![warn(clippy::cargo)]
#![warn(clippy::pedantic)]
// Enable coverage attributes for nightly builds.
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

extern crate alloc;

mod order_statistic;
mod raw;

pub mod comparator;
pub mod cursor;
pub mod error;
pub mod iter;
pub mod persist;
pub mod ranked_bag;
pub mod ranked_map;
pub mod ranked_multimap;
pub mod ranked_set;

pub use comparator::{Comparator, Natural, Reverse};
pub use cursor::{Cursor, Direction};
pub use error::{Error, Result};
pub use order_statistic::Rank;
pub use persist::Snapshot;
pub use ranked_bag::RankedBag;
pub use ranked_map::RankedMap;
pub use ranked_multimap::RankedMultiMap;
pub use ranked_set::RankedSet;
pub use raw::{DEFAULT_CAPACITY, MAX_CAPACITY, MIN_CAPACITY};
