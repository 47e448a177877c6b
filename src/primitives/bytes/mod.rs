#![forbid(unsafe_code)]
//! Varint and cursor utilities for the intermediate link-record format.

pub mod var {
    //! Unsigned varints and sign-magnitude signed integers.
    //!
    //! Unsigned values use little-endian base-128 groups with a continuation
    //! bit. Signed values are mapped to `|v| << 1 | sign` before that, so a
    //! negative zero never appears and `-1` costs the same as `1`.

    use crate::types::{Result, TileError};

    #[allow(clippy::inline_always)]
    #[inline]
    fn push_byte(byte: u8, out: &mut Vec<u8>) {
        out.push(byte);
    }

    /// Encodes a u64 as an unsigned varint.
    pub fn encode_u64(mut v: u64, out: &mut Vec<u8>) {
        loop {
            let byte = (v & 0x7f) as u8;
            v >>= 7;
            if v == 0 {
                push_byte(byte, out);
                break;
            } else {
                push_byte(byte | 0x80, out);
            }
        }
    }

    /// Number of bytes [`encode_u64`] emits for `v`.
    pub fn encoded_len(mut v: u64) -> usize {
        let mut len = 1;
        while v >= 0x80 {
            v >>= 7;
            len += 1;
        }
        len
    }

    /// Decodes a u64 varint from a slice, updating the offset.
    pub fn decode_u64(src: &[u8], off: &mut usize) -> Result<u64> {
        let mut result = 0u64;
        let mut shift = 0u32;
        for i in 0..10 {
            let idx = *off;
            if idx >= src.len() {
                return Err(TileError::Truncated {
                    needed: 1,
                    remaining: 0,
                });
            }
            let byte = src[idx];
            *off += 1;
            let payload = (byte & 0x7f) as u64;
            if i == 9 && payload > 1 {
                return Err(TileError::Corruption("varint overflow (more than 64 bits)"));
            }
            result |= payload << shift;
            if (byte & 0x80) == 0 {
                return Ok(result);
            }
            shift += 7;
        }
        Err(TileError::Corruption("varint too long (exceeded 10 bytes)"))
    }

    /// Encodes an i64 in sign-magnitude form. `i64::MIN` has no magnitude
    /// representation and must not be passed.
    pub fn encode_i64(v: i64, out: &mut Vec<u8>) {
        encode_u64(to_sign_magnitude(v), out);
    }

    /// Decodes a sign-magnitude i64 varint from a slice, updating the offset.
    pub fn decode_i64(src: &[u8], off: &mut usize) -> Result<i64> {
        decode_u64(src, off).map(from_sign_magnitude)
    }

    fn to_sign_magnitude(v: i64) -> u64 {
        let magnitude = v.unsigned_abs();
        if v < 0 {
            (magnitude << 1) | 1
        } else {
            magnitude << 1
        }
    }

    fn from_sign_magnitude(raw: u64) -> i64 {
        let magnitude = (raw >> 1) as i64;
        if raw & 1 != 0 {
            magnitude.wrapping_neg()
        } else {
            magnitude
        }
    }
}

pub mod buf {
    //! A simple slice-backed cursor for ergonomic parsing.

    use core::fmt;

    use crate::types::{Result, TileError};

    /// A cursor for reading bytes from a slice with offset tracking.
    pub struct Cursor<'a> {
        /// The underlying byte slice.
        pub buf: &'a [u8],
        /// Current read offset.
        pub off: usize,
    }

    impl<'a> Cursor<'a> {
        /// Creates a new cursor starting at offset 0.
        pub fn new(buf: &'a [u8]) -> Self {
            Self { buf, off: 0 }
        }

        /// Takes the next `n` bytes from the cursor, advancing the offset.
        pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
            let remaining = self.remaining();
            if n > remaining {
                return Err(TileError::Truncated {
                    needed: n,
                    remaining,
                });
            }
            let end = self.off + n;
            let slice = &self.buf[self.off..end];
            self.off = end;
            Ok(slice)
        }

        /// Returns the number of bytes remaining in the buffer.
        pub fn remaining(&self) -> usize {
            self.buf.len().saturating_sub(self.off)
        }
    }

    impl<'a> fmt::Debug for Cursor<'a> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("Cursor")
                .field("off", &self.off)
                .field("remaining", &self.remaining())
                .finish()
        }
    }
}
