//! Caller-owned buffers reused across decode calls.

use crate::codec::coders::TagDictionary;
use crate::codec::reverse::ReverseLinkIndex;

/// Working storage for [`super::MicroCache::decode`].
///
/// Decode borrows the scratch exclusively for one call and reinitialises
/// every buffer it touches, so a scratch left behind by a failed decode is
/// safe to pass to the next one. Buffers too small for a cell are replaced
/// by freshly sized ones instead of being extended.
#[derive(Debug, Default)]
pub struct DecodeScratch {
    pub(crate) ids: Vec<u32>,
    pub(crate) ends: Vec<usize>,
    pub(crate) lons: Vec<i32>,
    pub(crate) lats: Vec<i32>,
    pub(crate) valid: Vec<bool>,
    pub(crate) records: Vec<u8>,
    pub(crate) reverse: ReverseLinkIndex,
    pub(crate) way_tags: TagDictionary,
    pub(crate) node_tags: TagDictionary,
}

impl DecodeScratch {
    /// Creates a scratch with no preallocated storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a scratch sized for cells of up to `nodes` nodes and
    /// `record_bytes` bytes of link data.
    pub fn with_capacity(nodes: usize, record_bytes: usize) -> Self {
        Self {
            ids: Vec::with_capacity(nodes),
            ends: Vec::with_capacity(nodes),
            lons: Vec::with_capacity(nodes),
            lats: Vec::with_capacity(nodes),
            valid: Vec::with_capacity(nodes),
            records: Vec::with_capacity(record_bytes),
            ..Self::default()
        }
    }

    /// Node capacity currently available without reallocation.
    pub fn node_capacity(&self) -> usize {
        self.ids.capacity()
    }

    /// Sizes the per-node buffers for `nodes` entries and clears the rest.
    pub(crate) fn prepare(&mut self, nodes: usize) {
        reset_to(&mut self.ids, nodes);
        reset_to(&mut self.ends, nodes);
        reset_to(&mut self.lons, nodes);
        reset_to(&mut self.lats, nodes);
        reset_to(&mut self.valid, nodes);
        self.records.clear();
        self.reverse.reset(nodes);
    }

    /// Makes room for `bytes` of link records, replacing a smaller buffer.
    pub(crate) fn reserve_records(&mut self, bytes: usize) {
        if self.records.capacity() < bytes {
            self.records = Vec::with_capacity(bytes);
        }
    }
}

/// Gives `buf` exactly `len` default entries, replacing it when too small.
fn reset_to<T: Clone + Default>(buf: &mut Vec<T>, len: usize) {
    if buf.capacity() < len {
        *buf = vec![T::default(); len];
    } else {
        buf.clear();
        buf.resize(len, T::default());
    }
}
