use std::ops::Range;

use crate::codec::cell::CellGeometry;
use crate::codec::record::{GeometryIter, GeometryPoint, LinkIter, LinkRecord, NodeRecord, RecordWriter};
use crate::types::{Result, TileError};

/// The nodes and links of one grid cell.
///
/// Nodes are kept in ascending compact-id order. `offsets[n]` is the end of
/// node `n`'s record in `data`; its start is `offsets[n - 1]` (0 for the
/// first node).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MicroCache {
    pub(crate) cell: CellGeometry,
    pub(crate) ids: Vec<u32>,
    pub(crate) offsets: Vec<usize>,
    pub(crate) data: Vec<u8>,
}

impl MicroCache {
    /// Empty cache for `cell`, ready to be filled with [`MicroCache::begin_node`].
    pub fn for_encode(cell: CellGeometry, capacity: usize) -> Self {
        Self {
            cell,
            ids: Vec::with_capacity(capacity),
            offsets: Vec::with_capacity(capacity),
            data: Vec::new(),
        }
    }

    /// Wraps records produced elsewhere with [`RecordWriter`].
    ///
    /// `ids` must be strictly ascending compact ids and `offsets` the
    /// non-decreasing record ends, the last one equal to `data.len()`.
    pub fn from_parts(
        cell: CellGeometry,
        ids: Vec<u32>,
        offsets: Vec<usize>,
        data: Vec<u8>,
    ) -> Result<Self> {
        if ids.len() != offsets.len() {
            return Err(TileError::Invalid("ids and offsets differ in length"));
        }
        if ids.windows(2).any(|w| w[0] >= w[1]) {
            return Err(TileError::Invalid("node ids must be strictly ascending"));
        }
        if ids.last().is_some_and(|id| *id >= 2 * super::cell::ID_TOP_BIT) {
            return Err(TileError::Invalid("node id exceeds 30 bits"));
        }
        if offsets.windows(2).any(|w| w[0] > w[1]) {
            return Err(TileError::Invalid("record offsets must not decrease"));
        }
        if offsets.last().copied().unwrap_or(0) != data.len() {
            return Err(TileError::Invalid("last offset must equal the data length"));
        }
        Ok(Self {
            cell,
            ids,
            offsets,
            data,
        })
    }

    /// Cell this cache covers.
    pub fn cell(&self) -> &CellGeometry {
        &self.cell
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the cache holds no node.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Compact ids in ascending order.
    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    /// Record end offset of every node.
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// Concatenated node records.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Byte range of node `n`'s record.
    pub fn node_range(&self, n: usize) -> Range<usize> {
        let start = if n == 0 { 0 } else { self.offsets[n - 1] };
        start..self.offsets[n]
    }

    /// See [`CellGeometry::is_internal`].
    pub fn is_internal(&self, lon: i32, lat: i32) -> bool {
        self.cell.is_internal(lon, lat)
    }

    /// See [`CellGeometry::expand_id`].
    pub fn expand_id(&self, id: u32) -> (i32, i32) {
        self.cell.expand_id(id)
    }

    /// See [`CellGeometry::shrink_id`].
    pub fn shrink_id(&self, lon: i32, lat: i32) -> u32 {
        self.cell.shrink_id(lon, lat)
    }

    /// Index of the node at `(lon, lat)`.
    pub fn find_node(&self, lon: i32, lat: i32) -> Option<usize> {
        if !self.cell.is_internal(lon, lat) {
            return None;
        }
        self.ids.binary_search(&self.cell.shrink_id(lon, lat)).ok()
    }

    /// Parsed view of node `n`.
    pub fn node(&self, n: usize) -> Result<NodeView<'_>> {
        if n >= self.ids.len() {
            return Err(TileError::Invalid("node index out of range"));
        }
        let id = self.ids[n];
        let (lon, lat) = self.cell.expand_id(id);
        let range = self.node_range(n);
        let record = self
            .data
            .get(range)
            .ok_or(TileError::Corruption("node record outside data"))?;
        Ok(NodeView {
            cell: &self.cell,
            index: n,
            id,
            lon,
            lat,
            record: NodeRecord::parse(record)?,
        })
    }

    /// Views of all nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = Result<NodeView<'_>>> + '_ {
        (0..self.len()).map(move |n| self.node(n))
    }

    /// Starts the record of a node at `(lon, lat)`.
    ///
    /// Nodes must be added in strictly ascending compact-id order and lie
    /// inside the cell.
    pub fn begin_node(
        &mut self,
        lon: i32,
        lat: i32,
        elevation: i16,
        tags: Option<&[u8]>,
    ) -> Result<NodeWriter<'_>> {
        if !self.cell.is_internal(lon, lat) {
            return Err(TileError::Invalid("node outside the cell"));
        }
        let id = self.cell.shrink_id(lon, lat);
        if self.ids.last().is_some_and(|last| *last >= id) {
            return Err(TileError::Invalid("node ids must be strictly ascending"));
        }
        let start = self.data.len();
        let mut w = RecordWriter::new(&mut self.data);
        w.write_short(elevation);
        w.write_var_bytes(tags);
        Ok(NodeWriter {
            cache: self,
            id,
            lon,
            lat,
            start,
            finished: false,
        })
    }
}

/// Appends the links of one node; see [`MicroCache::begin_node`].
///
/// Dropping the writer without calling [`NodeWriter::finish`] discards
/// the node.
#[derive(Debug)]
pub struct NodeWriter<'a> {
    cache: &'a mut MicroCache,
    id: u32,
    lon: i32,
    lat: i32,
    start: usize,
    finished: bool,
}

impl<'a> NodeWriter<'a> {
    /// Adds a link to the absolute target `(lon, lat)`.
    ///
    /// `geometry` holds the intermediate points as steps from the previous
    /// point; reverse links carry none.
    pub fn link(
        &mut self,
        lon: i32,
        lat: i32,
        reverse: bool,
        tags: Option<&[u8]>,
        geometry: &[GeometryPoint],
    ) -> Result<&mut Self> {
        if reverse && !geometry.is_empty() {
            return Err(TileError::Invalid("reverse links carry no geometry"));
        }
        let dlon = lon
            .checked_sub(self.lon)
            .ok_or(TileError::Invalid("link longitude delta exceeds 32 bits"))?;
        let dlat = lat
            .checked_sub(self.lat)
            .ok_or(TileError::Invalid("link latitude delta exceeds 32 bits"))?;
        let mut w = RecordWriter::new(&mut self.cache.data);
        let slot = w.reserve_size();
        w.write_var_signed(dlon);
        w.write_var_signed(dlat);
        w.write_mode_and_desc(reverse, tags);
        for point in geometry {
            w.write_var_signed(point.dlon);
            w.write_var_signed(point.dlat);
            w.write_var_signed(point.dele);
        }
        w.patch_size(slot);
        Ok(self)
    }

    /// Commits the node.
    pub fn finish(mut self) {
        self.finished = true;
        self.cache.ids.push(self.id);
        let end = self.cache.data.len();
        self.cache.offsets.push(end);
    }
}

impl Drop for NodeWriter<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.cache.data.truncate(self.start);
        }
    }
}

/// Read-only view of one node.
#[derive(Debug, Clone, Copy)]
pub struct NodeView<'a> {
    cell: &'a CellGeometry,
    index: usize,
    id: u32,
    lon: i32,
    lat: i32,
    record: NodeRecord<'a>,
}

impl<'a> NodeView<'a> {
    /// Position of the node in the cache.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Compact id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Absolute longitude.
    pub fn lon(&self) -> i32 {
        self.lon
    }

    /// Absolute latitude.
    pub fn lat(&self) -> i32 {
        self.lat
    }

    /// Elevation.
    pub fn elevation(&self) -> i16 {
        self.record.elevation
    }

    /// Node tags, `None` when absent.
    pub fn tags(&self) -> Option<&'a [u8]> {
        self.record.tags
    }

    /// Links in record order.
    pub fn links(&self) -> LinkViews<'a> {
        LinkViews {
            cell: self.cell,
            lon: self.lon,
            lat: self.lat,
            inner: self.record.links(),
        }
    }
}

/// Iterator returned by [`NodeView::links`].
#[derive(Debug)]
pub struct LinkViews<'a> {
    cell: &'a CellGeometry,
    lon: i32,
    lat: i32,
    inner: LinkIter<'a>,
}

impl<'a> Iterator for LinkViews<'a> {
    type Item = Result<LinkView<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = match self.inner.next()? {
            Ok(record) => record,
            Err(err) => return Some(Err(err)),
        };
        let target_lon = self.lon.wrapping_add(record.dlon);
        let target_lat = self.lat.wrapping_add(record.dlat);
        Some(Ok(LinkView {
            target_lon,
            target_lat,
            internal: self.cell.is_internal(target_lon, target_lat),
            record,
        }))
    }
}

/// Read-only view of one link.
#[derive(Debug, Clone, Copy)]
pub struct LinkView<'a> {
    target_lon: i32,
    target_lat: i32,
    internal: bool,
    record: LinkRecord<'a>,
}

impl<'a> LinkView<'a> {
    /// Absolute target longitude.
    pub fn target_lon(&self) -> i32 {
        self.target_lon
    }

    /// Absolute target latitude.
    pub fn target_lat(&self) -> i32 {
        self.target_lat
    }

    /// Whether the target lies inside the cell.
    pub fn is_internal(&self) -> bool {
        self.internal
    }

    /// Whether this is a reverse link.
    pub fn is_reverse(&self) -> bool {
        self.record.reverse
    }

    /// Way tags, `None` when absent.
    pub fn tags(&self) -> Option<&'a [u8]> {
        self.record.tags
    }

    /// Intermediate points as steps from the previous point.
    pub fn geometry(&self) -> GeometryIter<'a> {
        self.record.geometry()
    }

    /// Bytes the link occupies in the node record.
    pub fn encoded_len(&self) -> usize {
        self.record.encoded_len()
    }
}
