#![forbid(unsafe_code)]
//! Bit-level writer/reader with the statistical integer codes used by the
//! microcache wire format.
//!
//! Bits are packed least-significant first. On top of raw bits the writer
//! provides bounded values, bucketed variable-length values ("var bits"),
//! noisy numbers and diffs (raw low bits plus a var-bits high part),
//! predicted values and the recursive sorted-array code used for node ids.

use crate::types::{Result, TileError};

/// Largest bucket range accepted by the var-bits decoder.
const MAX_VAR_BITS_RANGE: u64 = (1 << 40) - 1;

/// Appends bits to an owned byte buffer.
#[derive(Debug, Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    bit_pos: usize,
}

impl BitWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reuses `buffer` as backing storage, discarding its contents.
    pub fn with_buffer(mut buffer: Vec<u8>) -> Self {
        buffer.clear();
        Self {
            bytes: buffer,
            bit_pos: 0,
        }
    }

    /// Number of bits written so far.
    pub fn bit_len(&self) -> usize {
        self.bit_pos
    }

    /// Number of bytes touched so far.
    pub fn encoded_len(&self) -> usize {
        self.bytes.len()
    }

    /// Consumes the writer, returning the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Writes a single bit.
    pub fn encode_bit(&mut self, bit: bool) {
        let byte_idx = self.bit_pos / 8;
        if byte_idx == self.bytes.len() {
            self.bytes.push(0);
        }
        if bit {
            self.bytes[byte_idx] |= 1 << (self.bit_pos % 8);
        }
        self.bit_pos += 1;
    }

    /// Writes `value` using only as many bits as `max` allows.
    ///
    /// `value` must not exceed `max`.
    pub fn encode_bounded(&mut self, max: u32, value: u32) {
        self.put_bounded(u64::from(max), u64::from(value));
    }

    fn put_bounded(&mut self, mut max: u64, value: u64) {
        debug_assert!(value <= max, "bounded value {value} exceeds {max}");
        let mut im = 1u64;
        while im <= max {
            if value & im != 0 {
                self.encode_bit(true);
                max -= im;
            } else {
                self.encode_bit(false);
            }
            im <<= 1;
        }
    }

    /// Writes an unsigned value with a unary bucket prefix; 0 costs one bit.
    pub fn encode_var_bits(&mut self, value: u32) {
        self.put_var_bits(u64::from(value));
    }

    fn put_var_bits(&mut self, mut value: u64) {
        let mut range = 0u64;
        while value > range {
            self.encode_bit(false);
            value -= range + 1;
            range = 2 * range + 1;
        }
        self.encode_bit(true);
        self.put_bounded(range, value);
    }

    /// Writes an unsigned value whose low `noisy_bits` bits are incompressible.
    pub fn encode_noisy_number(&mut self, value: u32, noisy_bits: u32) {
        debug_assert!(noisy_bits < 32);
        let mut value = u64::from(value);
        if noisy_bits > 0 {
            let mask = (1u64 << noisy_bits) - 1;
            self.put_bounded(mask, value & mask);
            value >>= noisy_bits;
        }
        self.put_var_bits(value);
    }

    /// Writes a signed value whose low `noisy_bits` bits are incompressible.
    pub fn encode_noisy_diff(&mut self, value: i32, noisy_bits: u32) {
        self.put_noisy_diff(i64::from(value), noisy_bits);
    }

    fn put_noisy_diff(&mut self, mut value: i64, noisy_bits: u32) {
        debug_assert!(noisy_bits < 32);
        if noisy_bits > 0 {
            value += 1 << (noisy_bits - 1);
            let mask = (1i64 << noisy_bits) - 1;
            self.put_bounded(mask as u64, (value & mask) as u64);
            value >>= noisy_bits;
        }
        self.put_var_bits(value.unsigned_abs());
        if value != 0 {
            self.encode_bit(value < 0);
        }
    }

    /// Writes `value` as a deviation from `predictor`.
    pub fn encode_predicted_value(&mut self, value: i32, predictor: i32) {
        let noisy_bits = predictor_noise_bits(predictor);
        self.put_noisy_diff(i64::from(value) - i64::from(predictor), noisy_bits);
    }

    /// Writes an ascending, duplicate-free array whose values fit below
    /// `2 * top_bit`.
    pub fn encode_sorted_array(&mut self, values: &[u32], top_bit: u32) {
        if values.is_empty() {
            return;
        }
        self.put_sorted(values, top_bit, 0);
    }

    fn put_sorted(&mut self, values: &[u32], next_bit: u32, mask: u32) {
        if values.len() == 1 {
            let mut bit = next_bit;
            while bit != 0 {
                self.encode_bit(values[0] & bit != 0);
                bit >>= 1;
            }
            return;
        }
        if next_bit == 0 {
            return;
        }
        let data = mask & values[0];
        let mask = mask | next_bit;
        let lower = values.iter().take_while(|v| **v & mask == data).count();
        self.encode_bounded(values.len() as u32, lower as u32);
        if lower > 0 {
            self.put_sorted(&values[..lower], next_bit >> 1, mask);
        }
        if lower < values.len() {
            self.put_sorted(&values[lower..], next_bit >> 1, mask);
        }
    }
}

/// Reads bits from a borrowed byte slice.
#[derive(Debug)]
pub struct BitReader<'a> {
    bytes: &'a [u8],
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    /// Creates a reader positioned at the first bit of `bytes`.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, bit_pos: 0 }
    }

    /// Number of bits consumed so far.
    pub fn bit_pos(&self) -> usize {
        self.bit_pos
    }

    /// Number of unread bits.
    pub fn remaining_bits(&self) -> usize {
        self.bytes.len() * 8 - self.bit_pos
    }

    /// Reads a single bit.
    pub fn decode_bit(&mut self) -> Result<bool> {
        let byte_idx = self.bit_pos / 8;
        let Some(byte) = self.bytes.get(byte_idx) else {
            return Err(TileError::Truncated {
                needed: 1,
                remaining: 0,
            });
        };
        let bit = byte & (1 << (self.bit_pos % 8)) != 0;
        self.bit_pos += 1;
        Ok(bit)
    }

    /// Discards `count` bits.
    pub fn skip_bits(&mut self, count: usize) -> Result<()> {
        let remaining = self.remaining_bits();
        if count > remaining {
            return Err(TileError::Truncated {
                needed: count,
                remaining,
            });
        }
        self.bit_pos += count;
        Ok(())
    }

    /// Reads a value written by [`BitWriter::encode_bounded`] with the same `max`.
    pub fn decode_bounded(&mut self, max: u32) -> Result<u32> {
        self.get_bounded(u64::from(max)).map(|v| v as u32)
    }

    fn get_bounded(&mut self, max: u64) -> Result<u64> {
        let mut value = 0u64;
        let mut im = 1u64;
        while (value | im) <= max {
            if self.decode_bit()? {
                value |= im;
            }
            im <<= 1;
        }
        Ok(value)
    }

    /// Reads `count` raw bits (at most 32), least significant first.
    pub fn decode_bits(&mut self, count: u32) -> Result<u32> {
        debug_assert!(count <= 32);
        if count == 0 {
            return Ok(0);
        }
        self.get_bounded((1u64 << count) - 1).map(|v| v as u32)
    }

    /// Reads a value written by [`BitWriter::encode_var_bits`].
    pub fn decode_var_bits(&mut self) -> Result<u32> {
        let value = self.get_var_bits()?;
        u32::try_from(value).map_err(|_| TileError::Corruption("var-bits value exceeds 32 bits"))
    }

    fn get_var_bits(&mut self) -> Result<u64> {
        let mut range = 0u64;
        let mut value = 0u64;
        while !self.decode_bit()? {
            value += range + 1;
            range = 2 * range + 1;
            if range > MAX_VAR_BITS_RANGE {
                return Err(TileError::Corruption("var-bits prefix too long"));
            }
        }
        Ok(value + self.get_bounded(range)?)
    }

    /// Reads a value written by [`BitWriter::encode_noisy_number`].
    pub fn decode_noisy_number(&mut self, noisy_bits: u32) -> Result<u32> {
        let low = u64::from(self.decode_bits(noisy_bits)?);
        let high = self.get_var_bits()?;
        let value = low | (high << noisy_bits);
        u32::try_from(value).map_err(|_| TileError::Corruption("noisy number exceeds 32 bits"))
    }

    /// Reads a value written by [`BitWriter::encode_noisy_diff`].
    pub fn decode_noisy_diff(&mut self, noisy_bits: u32) -> Result<i32> {
        let value = self.get_noisy_diff(noisy_bits)?;
        i32::try_from(value).map_err(|_| TileError::Corruption("noisy diff exceeds 32 bits"))
    }

    fn get_noisy_diff(&mut self, noisy_bits: u32) -> Result<i64> {
        let mut value = 0i64;
        if noisy_bits > 0 {
            value = i64::from(self.decode_bits(noisy_bits)?) - (1 << (noisy_bits - 1));
        }
        let mut high = i128::from(self.get_var_bits()?) << noisy_bits;
        if high != 0 && self.decode_bit()? {
            high = -high;
        }
        i64::try_from(i128::from(value) + high)
            .map_err(|_| TileError::Corruption("noisy diff exceeds 64 bits"))
    }

    /// Reads a value written by [`BitWriter::encode_predicted_value`].
    pub fn decode_predicted_value(&mut self, predictor: i32) -> Result<i32> {
        let noisy_bits = predictor_noise_bits(predictor);
        let value = i64::from(predictor)
            .checked_add(self.get_noisy_diff(noisy_bits)?)
            .ok_or(TileError::Corruption("predicted value exceeds 32 bits"))?;
        i32::try_from(value).map_err(|_| TileError::Corruption("predicted value exceeds 32 bits"))
    }

    /// Fills `out` with an array written by [`BitWriter::encode_sorted_array`].
    pub fn decode_sorted_array(&mut self, out: &mut [u32], top_bit: u32) -> Result<()> {
        self.get_sorted(out, top_bit, 0)
    }

    fn get_sorted(&mut self, out: &mut [u32], next_bit: u32, value: u32) -> Result<()> {
        if out.len() == 1 {
            let mut bit = next_bit;
            let mut v = value;
            while bit != 0 {
                if self.decode_bit()? {
                    v |= bit;
                }
                bit >>= 1;
            }
            out[0] = v;
            return Ok(());
        }
        if next_bit == 0 {
            out.fill(value);
            return Ok(());
        }
        let lower = self.decode_bounded(out.len() as u32)? as usize;
        let (low, high) = out.split_at_mut(lower);
        if !low.is_empty() {
            self.get_sorted(low, next_bit >> 1, value)?;
        }
        if !high.is_empty() {
            self.get_sorted(high, next_bit >> 1, value | next_bit)?;
        }
        Ok(())
    }
}

/// Noise bits used for a predicted value: larger predictions tolerate
/// proportionally larger deviations.
fn predictor_noise_bits(predictor: i32) -> u32 {
    let mut p = predictor.unsigned_abs();
    let mut noisy_bits = 0;
    while p > 2 {
        noisy_bits += 1;
        p >>= 1;
    }
    noisy_bits
}
