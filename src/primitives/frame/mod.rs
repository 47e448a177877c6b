#![forbid(unsafe_code)]
//! CRC32 trailer for encoded tiles.

use crate::types::{Result, TileError};

/// Bytes appended by [`seal`].
pub const TRAILER_LEN: usize = 4;

/// CRC32 over an encoded tile payload.
pub fn tile_crc32(payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(payload);
    hasher.finalize()
}

/// Returns `payload` followed by its big-endian CRC32.
pub fn seal(payload: &[u8]) -> Vec<u8> {
    let mut sealed = Vec::with_capacity(payload.len() + TRAILER_LEN);
    sealed.extend_from_slice(payload);
    sealed.extend_from_slice(&tile_crc32(payload).to_be_bytes());
    sealed
}

/// Verifies the trailer written by [`seal`] and returns the payload.
pub fn open(sealed: &[u8]) -> Result<&[u8]> {
    if sealed.len() < TRAILER_LEN {
        return Err(TileError::Truncated {
            needed: TRAILER_LEN,
            remaining: sealed.len(),
        });
    }
    let (payload, trailer) = sealed.split_at(sealed.len() - TRAILER_LEN);
    let expected = u32::from_be_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    let actual = tile_crc32(payload);
    if expected != actual {
        return Err(TileError::Checksum { expected, actual });
    }
    Ok(payload)
}
