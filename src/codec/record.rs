//! Intermediate link-record format shared by decode output and encode input.
//!
//! A node record is `[i16 elevation][var bytes node tags][link records..]`.
//! A link record is `[var size][var dlon][var dlat][var sizecode][desc]
//! [geometry triples..]` where `sizecode = desc_len << 1 | reverse` and
//! each geometry triple is `(dlon, dlat, dele)` as signed varints. The
//! size prefix counts the bytes after itself.

use crate::primitives::bytes::{buf::Cursor, var};
use crate::types::{Result, TileError};

/// Bytes reserved for a size prefix before the body length is known.
pub const SIZE_PLACEHOLDER_LEN: usize = 4;

/// Position of a reserved size prefix.
///
/// Must be handed back to [`RecordWriter::patch_size`] or discarded with
/// [`RecordWriter::rewind`] before another record is reserved after it.
#[must_use = "a size placeholder must be patched or rewound"]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeSlot(usize);

impl SizeSlot {
    /// Offset of the record start, usable with [`RecordWriter::rewind`].
    pub fn start(self) -> usize {
        self.0
    }
}

/// Appends intermediate records to a caller-owned buffer.
#[derive(Debug)]
pub struct RecordWriter<'a> {
    buf: &'a mut Vec<u8>,
}

impl<'a> RecordWriter<'a> {
    /// Writes at the end of `buf`, keeping its contents.
    pub fn new(buf: &'a mut Vec<u8>) -> Self {
        Self { buf }
    }

    /// Current end of the buffer.
    pub fn position(&self) -> usize {
        self.buf.len()
    }

    /// Reserves room for a size prefix.
    pub fn reserve_size(&mut self) -> SizeSlot {
        let at = self.buf.len();
        self.buf.resize(at + SIZE_PLACEHOLDER_LEN, 0);
        SizeSlot(at)
    }

    /// Replaces the placeholder with the varint length of everything
    /// written after it.
    pub fn patch_size(&mut self, slot: SizeSlot) {
        let body_start = slot.0 + SIZE_PLACEHOLDER_LEN;
        let body_len = self.buf.len() - body_start;
        let mut prefix = Vec::with_capacity(var::encoded_len(body_len as u64));
        var::encode_u64(body_len as u64, &mut prefix);
        self.buf.splice(slot.0..body_start, prefix);
    }

    /// Drops everything from `pos` on.
    pub fn rewind(&mut self, pos: usize) {
        self.buf.truncate(pos);
    }

    /// Writes a big-endian 16-bit value.
    pub fn write_short(&mut self, value: i16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Writes a sign-magnitude varint.
    pub fn write_var_signed(&mut self, value: i32) {
        var::encode_i64(i64::from(value), self.buf);
    }

    /// Writes an unsigned varint.
    pub fn write_var_unsigned(&mut self, value: u32) {
        var::encode_u64(u64::from(value), self.buf);
    }

    /// Writes a length-prefixed blob; `None` and empty both become length 0.
    pub fn write_var_bytes(&mut self, bytes: Option<&[u8]>) {
        let bytes = bytes.unwrap_or_default();
        var::encode_u64(bytes.len() as u64, self.buf);
        self.buf.extend_from_slice(bytes);
    }

    /// Writes the direction bit and the way-tag description of a link.
    pub fn write_mode_and_desc(&mut self, reverse: bool, desc: Option<&[u8]>) {
        let desc = desc.unwrap_or_default();
        let sizecode = ((desc.len() as u64) << 1) | u64::from(reverse);
        var::encode_u64(sizecode, self.buf);
        self.buf.extend_from_slice(desc);
    }
}

/// Reads intermediate records from a byte range.
#[derive(Debug)]
pub struct RecordReader<'a> {
    cur: Cursor<'a>,
}

impl<'a> RecordReader<'a> {
    /// Reads `data` from its first byte.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            cur: Cursor::new(data),
        }
    }

    /// Whether unread bytes remain.
    pub fn has_more(&self) -> bool {
        self.cur.remaining() > 0
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.cur.off
    }

    /// Reads a big-endian 16-bit value.
    pub fn read_short(&mut self) -> Result<i16> {
        let b = self.cur.take(2)?;
        Ok(i16::from_be_bytes([b[0], b[1]]))
    }

    /// Reads a sign-magnitude varint that must fit in 32 bits.
    pub fn read_var_signed(&mut self) -> Result<i32> {
        let v = var::decode_i64(self.cur.buf, &mut self.cur.off)?;
        i32::try_from(v).map_err(|_| TileError::Corruption("signed record value exceeds 32 bits"))
    }

    /// Reads an unsigned varint that must fit in 32 bits.
    pub fn read_var_unsigned(&mut self) -> Result<u32> {
        let v = var::decode_u64(self.cur.buf, &mut self.cur.off)?;
        u32::try_from(v).map_err(|_| TileError::Corruption("unsigned record value exceeds 32 bits"))
    }

    /// Reads a length-prefixed blob; length 0 is `None`.
    pub fn read_var_bytes(&mut self) -> Result<Option<&'a [u8]>> {
        let len = self.read_var_unsigned()? as usize;
        if len == 0 {
            return Ok(None);
        }
        self.cur.take(len).map(Some)
    }

    /// Reads one `(dlon, dlat, dele)` geometry triple.
    pub fn read_point(&mut self) -> Result<GeometryPoint> {
        Ok(GeometryPoint {
            dlon: self.read_var_signed()?,
            dlat: self.read_var_signed()?,
            dele: self.read_var_signed()?,
        })
    }

    /// Reads a size-prefixed record and returns a reader over its body.
    pub fn read_record(&mut self) -> Result<RecordReader<'a>> {
        let len = self.read_var_unsigned()? as usize;
        self.cur.take(len).map(RecordReader::new)
    }
}

/// One geometry point of a forward link, relative to the previous point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GeometryPoint {
    /// Longitude step from the previous point.
    pub dlon: i32,
    /// Latitude step from the previous point.
    pub dlat: i32,
    /// Elevation delta carried by the point.
    pub dele: i32,
}

/// A parsed link record.
#[derive(Debug, Clone, Copy)]
pub struct LinkRecord<'a> {
    /// Target longitude minus source longitude.
    pub dlon: i32,
    /// Target latitude minus source latitude.
    pub dlat: i32,
    /// Direction bit.
    pub reverse: bool,
    /// Way tags, `None` when absent.
    pub tags: Option<&'a [u8]>,
    geometry: &'a [u8],
    encoded_len: usize,
}

impl<'a> LinkRecord<'a> {
    /// Bytes this link occupies in the node record, size prefix included.
    pub fn encoded_len(&self) -> usize {
        self.encoded_len
    }

    /// Whether the record carries geometry bytes.
    pub fn has_geometry(&self) -> bool {
        !self.geometry.is_empty()
    }

    /// Geometry points in link order.
    pub fn geometry(&self) -> GeometryIter<'a> {
        GeometryIter {
            reader: RecordReader::new(self.geometry),
        }
    }
}

/// Iterator over the geometry triples of a link.
#[derive(Debug)]
pub struct GeometryIter<'a> {
    reader: RecordReader<'a>,
}

impl<'a> Iterator for GeometryIter<'a> {
    type Item = Result<GeometryPoint>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.reader.has_more() {
            return None;
        }
        let point = self.reader.read_point();
        if point.is_err() {
            // stop after the first malformed triple
            self.reader = RecordReader::new(&[]);
        }
        Some(point)
    }
}

/// A parsed node record header.
#[derive(Debug, Clone, Copy)]
pub struct NodeRecord<'a> {
    /// Node elevation.
    pub elevation: i16,
    /// Node tags, `None` when absent.
    pub tags: Option<&'a [u8]>,
    links: &'a [u8],
}

impl<'a> NodeRecord<'a> {
    /// Parses the header of the node record `data`.
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        let mut reader = RecordReader::new(data);
        let elevation = reader.read_short()?;
        let tags = reader.read_var_bytes()?;
        Ok(Self {
            elevation,
            tags,
            links: &data[reader.position()..],
        })
    }

    /// Link records following the header.
    pub fn links(&self) -> LinkIter<'a> {
        LinkIter {
            reader: RecordReader::new(self.links),
        }
    }
}

/// Iterator over the link records of a node.
#[derive(Debug)]
pub struct LinkIter<'a> {
    reader: RecordReader<'a>,
}

impl<'a> LinkIter<'a> {
    fn read_link(&mut self) -> Result<LinkRecord<'a>> {
        let start = self.reader.position();
        let mut body = self.reader.read_record()?;
        let encoded_len = self.reader.position() - start;
        let dlon = body.read_var_signed()?;
        let dlat = body.read_var_signed()?;
        let sizecode = body.read_var_unsigned()?;
        let desc_len = (sizecode >> 1) as usize;
        let tags = if desc_len > 0 {
            Some(body.cur.take(desc_len)?)
        } else {
            None
        };
        let rest: &'a [u8] = body.cur.buf;
        Ok(LinkRecord {
            dlon,
            dlat,
            reverse: sizecode & 1 != 0,
            tags,
            geometry: &rest[body.cur.off..],
            encoded_len,
        })
    }
}

impl<'a> Iterator for LinkIter<'a> {
    type Item = Result<LinkRecord<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.reader.has_more() {
            return None;
        }
        let link = self.read_link();
        if link.is_err() {
            self.reader = RecordReader::new(&[]);
        }
        Some(link)
    }
}
