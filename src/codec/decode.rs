//! Bitstream to [`MicroCache`].
//!
//! Decoding runs in two steps. The first walks the stream node by node,
//! writing intermediate records into the scratch buffer, dropping links
//! whose way tags decode as null and registering a pending reverse link for
//! every accepted internal link. The second copies the records of valid
//! nodes into the final buffer and appends the synthesized reverse links
//! behind each node's own records.

use tracing::{debug, trace, warn};

use crate::codec::cell::{CellGeometry, ID_TOP_BIT};
use crate::codec::coders::DeltaModel;
use crate::codec::hooks::{WayTagValidator, WaypointMatcher};
use crate::codec::microcache::MicroCache;
use crate::codec::options::CodecOptions;
use crate::codec::predictor::GeometryPredictor;
use crate::codec::record::RecordWriter;
use crate::codec::scratch::DecodeScratch;
use crate::primitives::bits::BitReader;
use crate::types::{Result, TileError};

/// Noise-bit hint of the node count.
pub(crate) const NODE_COUNT_BITS: u32 = 5;
/// Noise-bit hint of the declared link-data size.
pub(crate) const LINK_DATA_SIZE_BITS: u32 = 10;
/// Noise-bit hint of the per-node link count.
pub(crate) const LINK_COUNT_BITS: u32 = 1;
/// Noise-bit hint of an escape block's bit length.
pub(crate) const ESCAPE_SIZE_BITS: u32 = 5;

struct DecodeOutcome {
    cache: MicroCache,
    nodes: usize,
    filtered: usize,
    synthesized: usize,
}

impl MicroCache {
    /// Decodes the cell `cell` from `data` with default options.
    ///
    /// `way_validator` filters way tag sets as the dictionary is read and
    /// `matcher` receives the polyline of every accepted forward link.
    pub fn decode(
        data: &[u8],
        cell: CellGeometry,
        scratch: &mut DecodeScratch,
        way_validator: Option<&dyn WayTagValidator>,
        matcher: Option<&mut dyn WaypointMatcher>,
    ) -> Result<Self> {
        Self::decode_with(
            &CodecOptions::default(),
            data,
            cell,
            scratch,
            way_validator,
            matcher,
        )
    }

    /// Decodes the cell `cell` from `data`.
    pub fn decode_with(
        options: &CodecOptions,
        data: &[u8],
        cell: CellGeometry,
        scratch: &mut DecodeScratch,
        way_validator: Option<&dyn WayTagValidator>,
        matcher: Option<&mut dyn WaypointMatcher>,
    ) -> Result<Self> {
        match decode_cell(options, data, cell, scratch, way_validator, matcher) {
            Ok(outcome) => {
                debug!(
                    lon_idx = cell.lon_idx(),
                    lat_idx = cell.lat_idx(),
                    nodes = outcome.nodes,
                    valid_nodes = outcome.cache.len(),
                    filtered_links = outcome.filtered,
                    reverse_links = outcome.synthesized,
                    bytes = outcome.cache.data.len(),
                    "codec.decode.cell"
                );
                options
                    .metrics
                    .cell_decoded(outcome.nodes, outcome.cache.len());
                options
                    .metrics
                    .reverse_links_synthesized(outcome.synthesized);
                Ok(outcome.cache)
            }
            Err(err) => {
                warn!(
                    lon_idx = cell.lon_idx(),
                    lat_idx = cell.lat_idx(),
                    error = %err,
                    "codec.decode.failed"
                );
                options.metrics.decode_failed();
                Err(err)
            }
        }
    }
}

fn decode_cell(
    options: &CodecOptions,
    data: &[u8],
    cell: CellGeometry,
    scratch: &mut DecodeScratch,
    way_validator: Option<&dyn WayTagValidator>,
    mut matcher: Option<&mut dyn WaypointMatcher>,
) -> Result<DecodeOutcome> {
    let mut r = BitReader::new(data);

    scratch.way_tags.read(&mut r, way_validator)?;
    scratch.node_tags.read(&mut r, None)?;
    let node_idx_diff = DeltaModel::read_header(&mut r)?;
    let node_ele_diff = DeltaModel::read_header(&mut r)?;
    let ext_lon_diff = DeltaModel::read_header(&mut r)?;
    let ext_lat_diff = DeltaModel::read_header(&mut r)?;
    let trans_ele_diff = DeltaModel::read_header(&mut r)?;

    let size = r.decode_noisy_number(NODE_COUNT_BITS)? as usize;
    // every node costs at least its escape terminator bit
    if size > r.remaining_bits() {
        return Err(TileError::Corruption("node count exceeds stream length"));
    }
    scratch.prepare(size);
    trace!(size, "codec.decode.nodes");

    r.decode_sorted_array(&mut scratch.ids[..], ID_TOP_BIT)?;
    let link_data_size = r.decode_noisy_number(LINK_DATA_SIZE_BITS)? as usize;
    if link_data_size > options.max_link_data_bytes {
        return Err(TileError::Corruption("declared link data size exceeds limit"));
    }
    scratch.reserve_records(link_data_size);

    let DecodeScratch {
        ids,
        ends,
        lons,
        lats,
        valid,
        records,
        reverse,
        way_tags,
        node_tags,
    } = scratch;

    for n in 0..size {
        if n > 0 && ids[n] <= ids[n - 1] {
            return Err(TileError::Corruption("node ids not strictly ascending"));
        }
        let (lon, lat) = cell.expand_id(ids[n]);
        lons[n] = lon;
        lats[n] = lat;
    }

    let mut elevation = 0i32;
    let mut filtered = 0usize;
    let mut reverse_hint = 0usize;
    for n in 0..size {
        let (lon, lat) = (lons[n], lats[n]);

        // escape blocks from newer writers
        loop {
            let feature = r.decode_var_bits()?;
            if feature == 0 {
                break;
            }
            let bits = r.decode_noisy_number(ESCAPE_SIZE_BITS)?;
            trace!(node = n, feature, bits, "codec.decode.escape_skipped");
            r.skip_bits(bits as usize)?;
        }

        let mut w = RecordWriter::new(records);
        elevation = elevation.wrapping_add(node_ele_diff.decode(&mut r)?);
        w.write_short(elevation as i16);
        w.write_var_bytes(node_tags.decode(&mut r)?);

        let links = r.decode_noisy_number(LINK_COUNT_BITS)?;
        trace!(node = n, links, "codec.decode.node");
        for _ in 0..links {
            let slot = w.reserve_size();
            let target = n as i64 + i64::from(node_idx_diff.decode(&mut r)?);
            if target < 0 || target >= size as i64 {
                return Err(TileError::Corruption("link target index out of range"));
            }
            let target = target as usize;
            let internal = target != n;

            let (is_reverse, dlon, dlat) = if internal {
                (
                    false,
                    lons[target].wrapping_sub(lon),
                    lats[target].wrapping_sub(lat),
                )
            } else {
                let is_reverse = r.decode_bit()?;
                (
                    is_reverse,
                    ext_lon_diff.decode(&mut r)?,
                    ext_lat_diff.decode(&mut r)?,
                )
            };
            w.write_var_signed(dlon);
            w.write_var_signed(dlat);

            let tags = way_tags.decode(&mut r)?;
            if tags.is_some() {
                valid[n] = true;
                if internal {
                    reverse.add(target, n);
                    reverse_hint += 1 + w.position() - slot.start();
                    valid[target] = true;
                }
            }
            w.write_mode_and_desc(is_reverse, tags);

            if !is_reverse {
                let mut matcher = if tags.is_some() {
                    matcher.as_deref_mut()
                } else {
                    None
                };
                if let Some(m) = matcher.as_deref_mut() {
                    m.start_node(lon, lat);
                }
                let target_lon = lon.wrapping_add(dlon);
                let target_lat = lat.wrapping_add(dlat);

                let points = r.decode_var_bits()?;
                trace!(node = n, points, "codec.decode.geometry");
                let mut predictor = GeometryPredictor::new(dlon, dlat, points);
                for _ in 0..points {
                    let (plon, plat) = predictor.predict();
                    let step_lon = r.decode_predicted_value(plon)?;
                    let step_lat = r.decode_predicted_value(plat)?;
                    predictor.advance(step_lon, step_lat);
                    w.write_var_signed(step_lon);
                    w.write_var_signed(step_lat);
                    w.write_var_signed(trans_ele_diff.decode(&mut r)?);
                    if let Some(m) = matcher.as_deref_mut() {
                        let (rem_lon, rem_lat) = predictor.remaining();
                        m.transfer_node(
                            target_lon.wrapping_sub(rem_lon),
                            target_lat.wrapping_sub(rem_lat),
                        );
                    }
                }
                if let Some(m) = matcher {
                    m.end_node(target_lon, target_lat);
                }
            }

            if tags.is_none() {
                w.rewind(slot.start());
                filtered += 1;
                options.metrics.link_filtered();
            } else {
                w.patch_size(slot);
            }
        }
        ends[n] = w.position();
    }

    // compaction: valid nodes plus their synthesized reverse links
    let mut final_size = reverse_hint;
    let mut valid_nodes = 0;
    let mut start = 0;
    for n in 0..size {
        if valid[n] {
            final_size += ends[n] - start;
            valid_nodes += 1;
        }
        start = ends[n];
    }

    let mut out_ids = Vec::with_capacity(valid_nodes);
    let mut out_offsets = Vec::with_capacity(valid_nodes);
    let mut out = Vec::with_capacity(final_size);
    let mut synthesized = 0;
    let mut start = 0;
    for n in 0..size {
        let end = ends[n];
        if valid[n] {
            out.extend_from_slice(&records[start..end]);
            let mut w = RecordWriter::new(&mut out);
            for source in reverse.sources(n) {
                let slot = w.reserve_size();
                w.write_var_signed(lons[source].wrapping_sub(lons[n]));
                w.write_var_signed(lats[source].wrapping_sub(lats[n]));
                w.write_mode_and_desc(true, None);
                w.patch_size(slot);
                synthesized += 1;
            }
            out_ids.push(ids[n]);
            out_offsets.push(out.len());
        } else {
            trace!(node = n, "codec.decode.node_dropped");
        }
        start = end;
    }

    Ok(DecodeOutcome {
        cache: MicroCache {
            cell,
            ids: out_ids,
            offsets: out_offsets,
            data: out,
        },
        nodes: size,
        filtered,
        synthesized,
    })
}
