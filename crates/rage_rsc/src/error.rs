//! Error types that can be emitted from this library

use miette::Diagnostic;
use thiserror::Error;

/// Error type for library
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// Transparent warpper for [`std::io::Error`]
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    /// Transparent warpper for [`binrw::Error`]
    #[error(transparent)]
    BinRWError(#[from] binrw::Error),

    /// data does not start with a resource frame
    #[error("data does not start with a RSC7 resource frame")]
    InvalidFrame,

    /// no page layout fits the blocks
    #[error("no page layout up to base shift {max_shift:#x} fits a {largest} byte block in {blocks} blocks")]
    PackingOverflow {
        /// Number of blocks being packed
        blocks: usize,
        /// Length of the largest block
        largest: u64,
        /// The base shift limit that was exceeded
        max_shift: u32,
    },

    /// positional invariants were broken while serializing
    #[error("resource layout is inconsistent")]
    Consistency(#[from] ConsistencyError),
}

/// Error type describing a block whose serialized bytes disagree with its layout
#[derive(Error, Diagnostic, Debug)]
pub enum ConsistencyError {
    /// block at {position:#x} declared {declared} bytes but wrote {written}
    #[error("block at {position:#x} declared {declared} bytes but wrote {written}")]
    LengthMismatch {
        /// Absolute position of the block
        position: u64,
        /// Length the block reported while packing
        declared: u64,
        /// Bytes the block actually wrote
        written: u64,
    },

    /// block was never assigned a position
    #[error("block was never assigned a position")]
    Unplaced,

    /// pointer slot at {offset:#x} overlaps another slot or runs past the block
    #[error("pointer slot at {offset:#x} overlaps another slot or runs past a {length} byte block")]
    PointerSlot {
        /// Offset of the slot inside the block
        offset: u64,
        /// Length of the block's data
        length: u64,
    },

    /// block at {position:#x} lies outside of its arena
    #[error("block at {position:#x} lies outside of its arena")]
    OutsideArena {
        /// Absolute position of the block
        position: u64,
    },
}

/// Generic result type with crate's Error as its error variant
pub type Result<T> = core::result::Result<T, Error>;
