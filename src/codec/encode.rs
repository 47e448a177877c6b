//! [`MicroCache`] to bitstream.
//!
//! The same walk over nodes and links runs three times against different
//! sinks: a counting pass that records link and geometry counts, a collect
//! pass that gathers coder statistics, and an emit pass that writes the
//! stream with the models frozen from those statistics.

use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::codec::cell::ID_TOP_BIT;
use crate::codec::coders::{DeltaModel, DeltaStats, TagModel, TagStats};
use crate::codec::decode::{LINK_COUNT_BITS, LINK_DATA_SIZE_BITS, NODE_COUNT_BITS};
use crate::codec::microcache::MicroCache;
use crate::codec::options::CodecOptions;
use crate::codec::predictor::{CountPredictor, GeometryPredictor};
use crate::primitives::bits::BitWriter;
use crate::types::{Result, TileError};

/// Parts of the stream that bit costs are reported for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    /// Way tag dictionary header.
    WayTagDictionary,
    /// Node tag dictionary header.
    NodeTagDictionary,
    /// Headers of the five delta coders.
    NoiseBits,
    /// Node count.
    NodeCount,
    /// Sorted node id array.
    NodePositions,
    /// Declared link-data size.
    LinkDataSize,
    /// Escape terminators.
    Escapes,
    /// Node elevation deltas.
    NodeElevation,
    /// Node tag sets.
    NodeTags,
    /// Per-node link counts.
    LinkCounts,
    /// Node index deltas of internal links.
    NodeIndex,
    /// Markers, direction bits and coordinates of external links.
    ExternalNodes,
    /// Way tag sets.
    WayTags,
    /// Geometry point counts.
    TransitionCounts,
    /// Geometry point positions.
    TransitionPositions,
    /// Geometry point elevation deltas.
    TransitionElevations,
}

impl Section {
    /// Every section in stream order.
    pub const ALL: [Section; 16] = [
        Section::WayTagDictionary,
        Section::NodeTagDictionary,
        Section::NoiseBits,
        Section::NodeCount,
        Section::NodePositions,
        Section::LinkDataSize,
        Section::Escapes,
        Section::NodeElevation,
        Section::NodeTags,
        Section::LinkCounts,
        Section::NodeIndex,
        Section::ExternalNodes,
        Section::WayTags,
        Section::TransitionCounts,
        Section::TransitionPositions,
        Section::TransitionElevations,
    ];

    /// Stable label used in reports.
    pub fn name(self) -> &'static str {
        match self {
            Section::WayTagDictionary => "way-tag-dictionary",
            Section::NodeTagDictionary => "node-tag-dictionary",
            Section::NoiseBits => "noise-bits",
            Section::NodeCount => "node-count",
            Section::NodePositions => "node-positions",
            Section::LinkDataSize => "link-data-size",
            Section::Escapes => "escapes",
            Section::NodeElevation => "node-elevation",
            Section::NodeTags => "node-tags",
            Section::LinkCounts => "link-counts",
            Section::NodeIndex => "node-index",
            Section::ExternalNodes => "external-nodes",
            Section::WayTags => "way-tags",
            Section::TransitionCounts => "transition-counts",
            Section::TransitionPositions => "transition-positions",
            Section::TransitionElevations => "transition-elevations",
        }
    }
}

/// Bits spent on one [`Section`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionBits {
    /// Section label.
    pub name: &'static str,
    /// Bits written for it.
    pub bits: u64,
}

/// Summary of one encode call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncodeReport {
    /// Bytes written.
    pub encoded_len: usize,
    /// Link-data size declared in the stream.
    pub link_data_size: usize,
    /// Nodes encoded.
    pub nodes: usize,
    /// Links encoded.
    pub links: usize,
    /// Internal reverse links left out.
    pub skipped_reverse_links: usize,
    /// Bit cost per section, in stream order.
    pub sections: Vec<SectionBits>,
}

#[derive(Debug, Clone, Copy)]
enum DeltaCoder {
    NodeIdx,
    NodeEle,
    ExtLon,
    ExtLat,
    TransEle,
}

#[derive(Debug, Clone, Copy)]
enum TagCoder {
    Way,
    Node,
}

/// Receiver of the values produced by one walk over a cell.
trait CellSink {
    fn noisy_number(&mut self, section: Section, value: u32, noisy_bits: u32);
    fn var_bits(&mut self, section: Section, value: u32);
    fn bit(&mut self, section: Section, value: bool);
    fn sorted_ids(&mut self, section: Section, ids: &[u32]);
    fn predicted(&mut self, section: Section, value: i32, predictor: i32);
    fn delta(&mut self, coder: DeltaCoder, section: Section, value: i32);
    fn tags(&mut self, coder: TagCoder, section: Section, tags: Option<&[u8]>) -> Result<()>;
}

/// First pass: only the count predictors record anything.
struct CountSink;

impl CellSink for CountSink {
    fn noisy_number(&mut self, _: Section, _: u32, _: u32) {}
    fn var_bits(&mut self, _: Section, _: u32) {}
    fn bit(&mut self, _: Section, _: bool) {}
    fn sorted_ids(&mut self, _: Section, _: &[u32]) {}
    fn predicted(&mut self, _: Section, _: i32, _: i32) {}
    fn delta(&mut self, _: DeltaCoder, _: Section, _: i32) {}
    fn tags(&mut self, _: TagCoder, _: Section, _: Option<&[u8]>) -> Result<()> {
        Ok(())
    }
}

/// Second pass: coder statistics.
#[derive(Default)]
struct CollectSink {
    way_tags: TagStats,
    node_tags: TagStats,
    deltas: [DeltaStats; 5],
}

impl CollectSink {
    fn freeze(&self) -> Result<Models> {
        Ok(Models {
            way_tags: self.way_tags.freeze()?,
            node_tags: self.node_tags.freeze()?,
            deltas: [
                self.deltas[0].freeze(),
                self.deltas[1].freeze(),
                self.deltas[2].freeze(),
                self.deltas[3].freeze(),
                self.deltas[4].freeze(),
            ],
        })
    }
}

impl CellSink for CollectSink {
    fn noisy_number(&mut self, _: Section, _: u32, _: u32) {}
    fn var_bits(&mut self, _: Section, _: u32) {}
    fn bit(&mut self, _: Section, _: bool) {}
    fn sorted_ids(&mut self, _: Section, _: &[u32]) {}
    fn predicted(&mut self, _: Section, _: i32, _: i32) {}

    fn delta(&mut self, coder: DeltaCoder, _: Section, value: i32) {
        self.deltas[coder as usize].collect(value);
    }

    fn tags(&mut self, coder: TagCoder, _: Section, tags: Option<&[u8]>) -> Result<()> {
        match coder {
            TagCoder::Way => self.way_tags.collect(tags),
            TagCoder::Node => self.node_tags.collect(tags),
        }
        Ok(())
    }
}

struct Models {
    way_tags: TagModel,
    node_tags: TagModel,
    deltas: [DeltaModel; 5],
}

/// Third pass: the stream itself, with bits charged to sections.
struct EmitSink<'m> {
    w: BitWriter,
    models: &'m Models,
    bits: [u64; Section::ALL.len()],
    mark: usize,
}

impl<'m> EmitSink<'m> {
    fn new(buffer: Vec<u8>, models: &'m Models) -> Self {
        let mut sink = Self {
            w: BitWriter::with_buffer(buffer),
            models,
            bits: [0; Section::ALL.len()],
            mark: 0,
        };
        models.way_tags.write_header(&mut sink.w);
        sink.charge(Section::WayTagDictionary);
        models.node_tags.write_header(&mut sink.w);
        sink.charge(Section::NodeTagDictionary);
        for model in &models.deltas {
            model.write_header(&mut sink.w);
        }
        sink.charge(Section::NoiseBits);
        sink
    }

    fn charge(&mut self, section: Section) {
        let now = self.w.bit_len();
        self.bits[section as usize] += (now - self.mark) as u64;
        self.mark = now;
    }
}

impl CellSink for EmitSink<'_> {
    fn noisy_number(&mut self, section: Section, value: u32, noisy_bits: u32) {
        self.w.encode_noisy_number(value, noisy_bits);
        self.charge(section);
    }

    fn var_bits(&mut self, section: Section, value: u32) {
        self.w.encode_var_bits(value);
        self.charge(section);
    }

    fn bit(&mut self, section: Section, value: bool) {
        self.w.encode_bit(value);
        self.charge(section);
    }

    fn sorted_ids(&mut self, section: Section, ids: &[u32]) {
        self.w.encode_sorted_array(ids, ID_TOP_BIT);
        self.charge(section);
    }

    fn predicted(&mut self, section: Section, value: i32, predictor: i32) {
        self.w.encode_predicted_value(value, predictor);
        self.charge(section);
    }

    fn delta(&mut self, coder: DeltaCoder, section: Section, value: i32) {
        self.models.deltas[coder as usize].emit(&mut self.w, value);
        self.charge(section);
    }

    fn tags(&mut self, coder: TagCoder, section: Section, tags: Option<&[u8]>) -> Result<()> {
        let model = match coder {
            TagCoder::Way => &self.models.way_tags,
            TagCoder::Node => &self.models.node_tags,
        };
        model.emit(&mut self.w, tags)?;
        self.charge(section);
        Ok(())
    }
}

/// State shared by the three walks.
struct Walk {
    node_index: FxHashMap<(i32, i32), usize>,
    link_counts: CountPredictor,
    transition_counts: CountPredictor,
    link_data_size: u32,
    links: usize,
    skipped: usize,
}

impl Walk {
    fn new(cache: &MicroCache) -> Result<Self> {
        let mut node_index = FxHashMap::default();
        node_index.reserve(cache.len());
        for (n, id) in cache.ids.iter().enumerate() {
            node_index.insert(cache.cell.expand_id(*id), n);
        }

        let mut link_data_size = cache.data.len();
        for node in cache.nodes() {
            let node = node?;
            for link in node.links() {
                let link = link?;
                if link.is_reverse() && link.is_internal() {
                    link_data_size -= link.encoded_len();
                }
            }
        }
        let link_data_size = u32::try_from(link_data_size)
            .map_err(|_| TileError::Invalid("link data exceeds 32-bit size"))?;

        Ok(Self {
            node_index,
            link_counts: CountPredictor::new(),
            transition_counts: CountPredictor::new(),
            link_data_size,
            links: 0,
            skipped: 0,
        })
    }

    fn run<S: CellSink>(&mut self, cache: &MicroCache, sink: &mut S) -> Result<()> {
        self.link_counts.begin_pass();
        self.transition_counts.begin_pass();
        self.links = 0;
        self.skipped = 0;

        sink.noisy_number(Section::NodeCount, cache.len() as u32, NODE_COUNT_BITS);
        sink.sorted_ids(Section::NodePositions, &cache.ids);
        sink.noisy_number(Section::LinkDataSize, self.link_data_size, LINK_DATA_SIZE_BITS);

        let mut last_elevation = 0i32;
        for n in 0..cache.len() {
            let node = cache.node(n)?;
            let (lon, lat) = (node.lon(), node.lat());

            sink.var_bits(Section::Escapes, 0);
            let elevation = i32::from(node.elevation());
            sink.delta(DeltaCoder::NodeEle, Section::NodeElevation, elevation - last_elevation);
            last_elevation = elevation;
            sink.tags(TagCoder::Node, Section::NodeTags, node.tags())?;
            sink.noisy_number(Section::LinkCounts, self.link_counts.next(), LINK_COUNT_BITS);

            let mut emitted = 0u32;
            for link in node.links() {
                let link = link?;
                let (target_lon, target_lat) = (link.target_lon(), link.target_lat());
                if link.is_reverse() && link.is_internal() {
                    trace!(node = n, target_lon, target_lat, "codec.encode.reverse_skipped");
                    self.skipped += 1;
                    continue;
                }
                emitted += 1;
                let dlon = target_lon.wrapping_sub(lon);
                let dlat = target_lat.wrapping_sub(lat);

                if link.is_internal() {
                    let target = *self.node_index.get(&(target_lon, target_lat)).ok_or(
                        TileError::TargetNotFound {
                            lon: target_lon,
                            lat: target_lat,
                        },
                    )?;
                    if target == n {
                        return Err(TileError::SelfReference { node: n });
                    }
                    sink.delta(DeltaCoder::NodeIdx, Section::NodeIndex, target as i32 - n as i32);
                } else {
                    sink.delta(DeltaCoder::NodeIdx, Section::ExternalNodes, 0);
                    sink.bit(Section::ExternalNodes, link.is_reverse());
                    sink.delta(DeltaCoder::ExtLon, Section::ExternalNodes, dlon);
                    sink.delta(DeltaCoder::ExtLat, Section::ExternalNodes, dlat);
                }
                sink.tags(TagCoder::Way, Section::WayTags, link.tags())?;

                if !link.is_reverse() {
                    let count = self.transition_counts.next();
                    sink.var_bits(Section::TransitionCounts, count);
                    let mut predictor = GeometryPredictor::new(dlon, dlat, count);
                    let mut points = 0u32;
                    for point in link.geometry() {
                        let point = point?;
                        points += 1;
                        let (plon, plat) = predictor.predict();
                        sink.predicted(Section::TransitionPositions, point.dlon, plon);
                        sink.predicted(Section::TransitionPositions, point.dlat, plat);
                        predictor.advance(point.dlon, point.dlat);
                        sink.delta(
                            DeltaCoder::TransEle,
                            Section::TransitionElevations,
                            point.dele,
                        );
                    }
                    self.transition_counts.record(points);
                }
            }
            self.link_counts.record(emitted);
            self.links += emitted as usize;
        }
        Ok(())
    }
}

impl MicroCache {
    /// Encodes the cache into `out`, returning the encoded length.
    ///
    /// `out` is overwritten; it is left empty when encoding fails.
    pub fn encode(&self, out: &mut Vec<u8>) -> Result<usize> {
        self.encode_with_report(&CodecOptions::default(), out)
            .map(|report| report.encoded_len)
    }

    /// Encodes the cache into `out` and reports where the bits went.
    pub fn encode_with_report(
        &self,
        options: &CodecOptions,
        out: &mut Vec<u8>,
    ) -> Result<EncodeReport> {
        match self.encode_passes(out) {
            Ok(report) => {
                debug!(
                    lon_idx = self.cell.lon_idx(),
                    lat_idx = self.cell.lat_idx(),
                    nodes = report.nodes,
                    links = report.links,
                    skipped_reverse_links = report.skipped_reverse_links,
                    bytes = report.encoded_len,
                    "codec.encode.cell"
                );
                options.metrics.cell_encoded(report.encoded_len);
                options
                    .metrics
                    .reverse_links_skipped(report.skipped_reverse_links);
                Ok(report)
            }
            Err(err) => {
                warn!(
                    lon_idx = self.cell.lon_idx(),
                    lat_idx = self.cell.lat_idx(),
                    error = %err,
                    "codec.encode.failed"
                );
                Err(err)
            }
        }
    }

    fn encode_passes(&self, out: &mut Vec<u8>) -> Result<EncodeReport> {
        let buffer = std::mem::take(out);
        let mut walk = Walk::new(self)?;

        walk.run(self, &mut CountSink)?;

        let mut collect = CollectSink::default();
        walk.run(self, &mut collect)?;
        let models = collect.freeze()?;

        let mut emit = EmitSink::new(buffer, &models);
        walk.run(self, &mut emit)?;

        let sections = Section::ALL
            .iter()
            .map(|s| SectionBits {
                name: s.name(),
                bits: emit.bits[*s as usize],
            })
            .collect();
        *out = emit.w.into_bytes();
        Ok(EncodeReport {
            encoded_len: out.len(),
            link_data_size: walk.link_data_size as usize,
            nodes: self.len(),
            links: walk.links,
            skipped_reverse_links: walk.skipped,
            sections,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::cell::CellGeometry;
    use crate::codec::record::GeometryPoint;
    use crate::codec::scratch::DecodeScratch;

    fn cell() -> CellGeometry {
        CellGeometry::new(180 * 32 + 8, 90 * 32 + 52, 32).unwrap()
    }

    #[test]
    fn empty_cache_encodes_and_decodes() {
        let c = cell();
        let cache = MicroCache::for_encode(c, 0);
        let mut out = Vec::new();
        let report = cache
            .encode_with_report(&CodecOptions::default(), &mut out)
            .unwrap();
        assert_eq!(report.encoded_len, out.len());
        assert_eq!(report.link_data_size, 0);
        let back = MicroCache::decode(&out, c, &mut DecodeScratch::new(), None, None).unwrap();
        assert!(back.is_empty());
    }

    #[test]
    fn self_reference_aborts_encode() {
        let c = cell();
        let (lon, lat) = (c.lon_base() + 1, c.lat_base() + 1);
        let mut cache = MicroCache::for_encode(c, 1);
        let mut w = cache.begin_node(lon, lat, 0, None).unwrap();
        w.link(lon, lat, false, Some(&b"highway=track"[..]), &[]).unwrap();
        w.finish();
        let err = cache.encode(&mut Vec::new()).unwrap_err();
        assert!(matches!(err, TileError::SelfReference { node: 0 }));
    }

    #[test]
    fn missing_internal_target_aborts_encode() {
        let c = cell();
        let (lon, lat) = (c.lon_base() + 1, c.lat_base() + 1);
        let mut cache = MicroCache::for_encode(c, 1);
        let mut w = cache.begin_node(lon, lat, 0, None).unwrap();
        w.link(lon + 5, lat + 5, false, Some(&b"highway=track"[..]), &[]).unwrap();
        w.finish();
        let err = cache.encode(&mut Vec::new()).unwrap_err();
        assert!(matches!(
            err,
            TileError::TargetNotFound { lon: l, lat: t } if l == lon + 5 && t == lat + 5
        ));
    }

    #[test]
    fn report_accounts_for_every_bit() {
        let c = cell();
        let (lon, lat) = (c.lon_base() + 200, c.lat_base() + 300);
        let mut cache = MicroCache::for_encode(c, 2);
        let mut a = cache.begin_node(lon, lat, 100, Some(&b"crossing"[..])).unwrap();
        a.link(
            lon + 500,
            lat + 40,
            false,
            Some(&b"highway=service"[..]),
            &[
                GeometryPoint { dlon: 100, dlat: 10, dele: 2 },
                GeometryPoint { dlon: 150, dlat: 12, dele: -1 },
            ],
        )
        .unwrap();
        a.link(lon - 40_000, lat, false, Some(&b"highway=service"[..]), &[])
            .unwrap();
        a.finish();
        let mut b = cache.begin_node(lon + 500, lat + 40, 103, None).unwrap();
        b.link(lon, lat, true, None, &[]).unwrap();
        b.finish();

        let mut out = Vec::new();
        let report = cache
            .encode_with_report(&CodecOptions::default(), &mut out)
            .unwrap();
        let total: u64 = report.sections.iter().map(|s| s.bits).sum();
        assert_eq!((total + 7) / 8, out.len() as u64);
        assert_eq!(report.nodes, 2);
        assert_eq!(report.links, 2);
        assert_eq!(report.skipped_reverse_links, 1);
        assert!(report.link_data_size < cache.data().len());
        let positions = report
            .sections
            .iter()
            .find(|s| s.name == "transition-positions")
            .unwrap();
        assert!(positions.bits > 0);
    }

    #[test]
    fn encoding_is_deterministic() {
        let c = cell();
        let mut cache = MicroCache::for_encode(c, 3);
        for i in 0..3 {
            let (lon, lat) = (c.lon_base() + 10 * i, c.lat_base() + 7 * i);
            let mut w = cache.begin_node(lon, lat, i as i16, None).unwrap();
            w.link(lon + 90_000, lat, false, Some(&b"highway=primary"[..]), &[])
                .unwrap();
            w.finish();
        }
        let (mut first, mut second) = (Vec::new(), Vec::new());
        cache.encode(&mut first).unwrap();
        cache.encode(&mut second).unwrap();
        assert_eq!(first, second);
    }
}
