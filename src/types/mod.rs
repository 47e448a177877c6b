#![forbid(unsafe_code)]
//! Error types shared by the primitives and the microcache codec.

/// Errors raised while decoding or encoding a microcache.
#[derive(thiserror::Error, Debug)]
pub enum TileError {
    /// Underlying I/O failure (tile files, CLI).
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    /// The stream or an intermediate record is internally inconsistent.
    #[error("corruption: {0}")]
    Corruption(&'static str),
    /// The stream or record ended before a value was complete.
    #[error("truncated input: need {needed} more, {remaining} remaining")]
    Truncated {
        /// Units (bits or bytes) the reader asked for.
        needed: usize,
        /// Units that were still available.
        remaining: usize,
    },
    /// The caller supplied an argument the codec cannot accept.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
    /// An internal link points at a coordinate that is not a node of the cell.
    #[error("internal link target ({lon}, {lat}) not found in cell")]
    TargetNotFound {
        /// Absolute longitude of the missing target.
        lon: i32,
        /// Absolute latitude of the missing target.
        lat: i32,
    },
    /// An internal link resolves to the node it starts from.
    #[error("internal link of node {node} refers to itself")]
    SelfReference {
        /// Index of the offending node.
        node: usize,
    },
    /// A tag set reached the emit phase without being collected first.
    #[error("tag set missing from frozen dictionary")]
    UnknownTagSet,
    /// A sealed tile failed its CRC check.
    #[error("checksum mismatch: expected {expected:#010x}, actual {actual:#010x}")]
    Checksum {
        /// CRC stored in the tile trailer.
        expected: u32,
        /// CRC computed over the payload.
        actual: u32,
    },
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, TileError>;
