//! Statistical coders for signed deltas and tag sets.
//!
//! Both coders are two-phase on the encode side: values are first
//! collected into a stats object, which is then frozen into an immutable
//! model that writes the dictionary header and emits codes. The decode
//! side reads the header back into the matching model.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};

use rustc_hash::FxHashMap;

use crate::codec::hooks::WayTagValidator;
use crate::primitives::bits::{BitReader, BitWriter};
use crate::types::{Result, TileError};

/// Largest noise-bit hint considered when freezing delta statistics.
pub const MAX_DELTA_NOISE_BITS: u32 = 24;

/// Largest noise-bit hint accepted from a stream header.
const MAX_HEADER_NOISE_BITS: u32 = 30;

/// Deepest tag dictionary accepted or produced.
pub const MAX_TAG_TREE_DEPTH: usize = 64;

/// Bits [`BitWriter::encode_var_bits`] spends on `value`.
pub(crate) fn var_bits_cost(value: u64) -> u64 {
    2 * u64::from(63 - (value + 1).leading_zeros()) + 1
}

/// Bits [`BitWriter::encode_noisy_diff`] spends on `value` with hint `noisy_bits`.
pub(crate) fn noisy_diff_cost(value: i64, noisy_bits: u32) -> u64 {
    let mut value = value;
    let mut cost = 0;
    if noisy_bits > 0 {
        value += 1 << (noisy_bits - 1);
        value >>= noisy_bits;
        cost += u64::from(noisy_bits);
    }
    cost + var_bits_cost(value.unsigned_abs()) + u64::from(value != 0)
}

/// Histogram of the signed deltas one coder will emit.
#[derive(Debug, Default, Clone)]
pub struct DeltaStats {
    counts: FxHashMap<i32, u64>,
}

impl DeltaStats {
    /// Creates empty statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one value.
    pub fn collect(&mut self, value: i32) {
        *self.counts.entry(value).or_insert(0) += 1;
    }

    /// Number of values recorded.
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Picks the noise-bit hint with the smallest total cost.
    pub fn freeze(&self) -> DeltaModel {
        let mut best = (u64::MAX, 0);
        for noisy_bits in 0..=MAX_DELTA_NOISE_BITS {
            let cost: u64 = self
                .counts
                .iter()
                .map(|(v, n)| n * noisy_diff_cost(i64::from(*v), noisy_bits))
                .sum();
            if cost < best.0 {
                best = (cost, noisy_bits);
            }
        }
        DeltaModel { noisy_bits: best.1 }
    }
}

/// Frozen signed-delta coder: a noisy diff with a fixed hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeltaModel {
    noisy_bits: u32,
}

impl DeltaModel {
    /// Noise-bit hint applied to every value.
    pub fn noisy_bits(&self) -> u32 {
        self.noisy_bits
    }

    /// Writes the dictionary header.
    pub fn write_header(&self, w: &mut BitWriter) {
        w.encode_var_bits(self.noisy_bits);
    }

    /// Reads a dictionary header.
    pub fn read_header(r: &mut BitReader<'_>) -> Result<Self> {
        let noisy_bits = r.decode_var_bits()?;
        if noisy_bits > MAX_HEADER_NOISE_BITS {
            return Err(TileError::Corruption("delta coder noise bits out of range"));
        }
        Ok(Self { noisy_bits })
    }

    /// Emits one value.
    pub fn emit(&self, w: &mut BitWriter, value: i32) {
        w.encode_noisy_diff(value, self.noisy_bits);
    }

    /// Decodes one value.
    pub fn decode(&self, r: &mut BitReader<'_>) -> Result<i32> {
        r.decode_noisy_diff(self.noisy_bits)
    }
}

/// Frequencies of the tag sets one coder will emit. Absent and empty sets
/// count as the same null symbol.
#[derive(Debug, Default, Clone)]
pub struct TagStats {
    counts: BTreeMap<Vec<u8>, u64>,
}

#[derive(Debug, Clone, Copy)]
enum TreeNode {
    Leaf(usize),
    Branch(usize, usize),
}

impl TagStats {
    /// Creates empty statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one tag set.
    pub fn collect(&mut self, tags: Option<&[u8]>) {
        let key = tags.unwrap_or_default();
        match self.counts.get_mut(key) {
            Some(count) => *count += 1,
            None => {
                self.counts.insert(key.to_vec(), 1);
            }
        }
    }

    /// Number of distinct tag sets recorded.
    pub fn distinct(&self) -> usize {
        self.counts.len()
    }

    /// Builds the Huffman tree. Ties are broken by symbol order, so equal
    /// statistics always produce the same dictionary.
    pub fn freeze(&self) -> Result<TagModel> {
        let symbols: Vec<Vec<u8>> = if self.counts.is_empty() {
            vec![Vec::new()]
        } else {
            self.counts.keys().cloned().collect()
        };
        let mut nodes: Vec<TreeNode> = (0..symbols.len()).map(TreeNode::Leaf).collect();
        let mut heap: BinaryHeap<Reverse<(u64, usize)>> = self
            .counts
            .values()
            .enumerate()
            .map(|(idx, weight)| Reverse((*weight, idx)))
            .collect();
        if heap.is_empty() {
            heap.push(Reverse((0, 0)));
        }
        while heap.len() > 1 {
            let (Some(Reverse((wa, a))), Some(Reverse((wb, b)))) = (heap.pop(), heap.pop()) else {
                break;
            };
            nodes.push(TreeNode::Branch(a, b));
            heap.push(Reverse((wa + wb, nodes.len() - 1)));
        }
        let root = nodes.len() - 1;

        let mut codes = FxHashMap::default();
        let mut stack = vec![(root, 0u64, 0usize)];
        while let Some((idx, code, len)) = stack.pop() {
            match nodes[idx] {
                TreeNode::Leaf(sym) => {
                    codes.insert(symbols[sym].clone(), (code, len as u8));
                }
                TreeNode::Branch(left, right) => {
                    if len >= MAX_TAG_TREE_DEPTH {
                        return Err(TileError::Invalid("tag dictionary deeper than 64 levels"));
                    }
                    stack.push((right, code | (1 << len), len + 1));
                    stack.push((left, code, len + 1));
                }
            }
        }
        Ok(TagModel {
            symbols,
            nodes,
            root,
            codes,
        })
    }
}

/// Frozen tag-set coder.
#[derive(Debug, Clone)]
pub struct TagModel {
    symbols: Vec<Vec<u8>>,
    nodes: Vec<TreeNode>,
    root: usize,
    codes: FxHashMap<Vec<u8>, (u64, u8)>,
}

impl TagModel {
    /// Writes the tree in pre-order.
    pub fn write_header(&self, w: &mut BitWriter) {
        self.write_node(w, self.root);
    }

    fn write_node(&self, w: &mut BitWriter, idx: usize) {
        match self.nodes[idx] {
            TreeNode::Branch(left, right) => {
                w.encode_bit(true);
                self.write_node(w, left);
                self.write_node(w, right);
            }
            TreeNode::Leaf(sym) => {
                w.encode_bit(false);
                let bytes = &self.symbols[sym];
                if bytes.is_empty() {
                    w.encode_bit(false);
                } else {
                    w.encode_bit(true);
                    w.encode_var_bits(bytes.len() as u32);
                    for b in bytes {
                        w.encode_bounded(255, u32::from(*b));
                    }
                }
            }
        }
    }

    /// Emits the code of `tags`, which must have been collected.
    pub fn emit(&self, w: &mut BitWriter, tags: Option<&[u8]>) -> Result<()> {
        let key = tags.unwrap_or_default();
        let (code, len) = self.codes.get(key).ok_or(TileError::UnknownTagSet)?;
        for i in 0..*len {
            w.encode_bit((code >> i) & 1 != 0);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum DictNode {
    Leaf(Option<(usize, usize)>),
    Branch(usize, usize),
}

/// Tag dictionary read from a stream header, reusable across cells.
#[derive(Debug, Default, Clone)]
pub struct TagDictionary {
    nodes: Vec<DictNode>,
    bytes: Vec<u8>,
}

impl TagDictionary {
    /// Creates an empty dictionary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the contents with the tree at the reader position.
    ///
    /// `validator` sees every non-null leaf once; leaves it rejects decode
    /// as null.
    pub fn read(
        &mut self,
        r: &mut BitReader<'_>,
        validator: Option<&dyn WayTagValidator>,
    ) -> Result<()> {
        self.nodes.clear();
        self.bytes.clear();
        self.read_node(r, validator, 0)?;
        Ok(())
    }

    fn read_node(
        &mut self,
        r: &mut BitReader<'_>,
        validator: Option<&dyn WayTagValidator>,
        depth: usize,
    ) -> Result<usize> {
        if depth > MAX_TAG_TREE_DEPTH {
            return Err(TileError::Corruption("tag dictionary deeper than 64 levels"));
        }
        let idx = self.nodes.len();
        if r.decode_bit()? {
            self.nodes.push(DictNode::Branch(0, 0));
            let left = self.read_node(r, validator, depth + 1)?;
            let right = self.read_node(r, validator, depth + 1)?;
            self.nodes[idx] = DictNode::Branch(left, right);
            return Ok(idx);
        }
        let leaf = if r.decode_bit()? {
            self.read_leaf(r, validator)?
        } else {
            None
        };
        self.nodes.push(DictNode::Leaf(leaf));
        Ok(idx)
    }

    fn read_leaf(
        &mut self,
        r: &mut BitReader<'_>,
        validator: Option<&dyn WayTagValidator>,
    ) -> Result<Option<(usize, usize)>> {
        let len = r.decode_var_bits()? as usize;
        let available = r.remaining_bits() / 8;
        if len > available {
            return Err(TileError::Truncated {
                needed: len,
                remaining: available,
            });
        }
        let start = self.bytes.len();
        for _ in 0..len {
            self.bytes.push(r.decode_bounded(255)? as u8);
        }
        let Some(validator) = validator else {
            return Ok((len > 0).then_some((start, len)));
        };
        let accepted = validator.validate(&self.bytes[start..]);
        self.bytes.truncate(start);
        match accepted {
            Some(tags) if !tags.is_empty() => {
                self.bytes.extend_from_slice(&tags);
                Ok(Some((start, tags.len())))
            }
            _ => Ok(None),
        }
    }

    /// Decodes one tag set; `None` is the null symbol.
    pub fn decode(&self, r: &mut BitReader<'_>) -> Result<Option<&[u8]>> {
        let mut idx = 0;
        loop {
            match self.nodes.get(idx) {
                Some(DictNode::Branch(left, right)) => {
                    idx = if r.decode_bit()? { *right } else { *left };
                }
                Some(DictNode::Leaf(Some((start, len)))) => {
                    return Ok(Some(&self.bytes[*start..*start + *len]));
                }
                Some(DictNode::Leaf(None)) => return Ok(None),
                None => return Err(TileError::Corruption("tag dictionary not initialised")),
            }
        }
    }
}
