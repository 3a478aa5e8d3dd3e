use alloc::string::String;

use thiserror::Error;

/// Errors returned by the ranked collections.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum Error {
    #[error("invalid capacity: {capacity} (must be within {min}..={max})")]
    InvalidCapacity { capacity: usize, min: usize, max: usize },

    #[error("rank out of range: rank {rank}, length {len}")]
    RankOutOfRange { rank: usize, len: usize },

    #[error("duplicate key at rank {rank}")]
    DuplicateKey { rank: usize },

    #[error("collection was modified after the cursor was created")]
    StaleCursor,

    #[error("structural corruption: {0}")]
    Corrupt(String),

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

pub type Result<T> = core::result::Result<T, Error>;
