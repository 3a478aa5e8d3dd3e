mod arena;
mod diagnostics;
mod handle;
mod node;
mod raw_tree;

pub(crate) use arena::Arena;
pub(crate) use handle::Handle;
pub(crate) use node::Node;
pub(crate) use raw_tree::{Insertion, OnDuplicate, RawTree, locate, next_position, prev_position, validate_capacity};
pub use raw_tree::{DEFAULT_CAPACITY, MAX_CAPACITY, MIN_CAPACITY};
