//! JSON interchange model for a single cell.
//!
//! Targets are stored as absolute coordinates so documents can be edited by
//! hand. Tag sets are UTF-8 strings; byte strings that are not valid UTF-8
//! (or that would be mistaken for the escape) are written as `hex:` plus
//! their hex encoding.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::{CellGeometry, GeometryPoint, MicroCache};
use crate::types::TileError;

const HEX_PREFIX: &str = "hex:";

/// Errors raised while converting or moving documents.
#[derive(Error, Debug)]
pub enum CliError {
    /// Generic error message.
    #[error("{0}")]
    Message(String),
    /// Codec failure.
    #[error(transparent)]
    Tile(#[from] TileError),
    /// File could not be read or written.
    #[error("{path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying failure.
        source: std::io::Error,
    },
    /// Document is not valid JSON for the model.
    #[error("{path}: {source}")]
    Json {
        /// File involved.
        path: PathBuf,
        /// Underlying failure.
        source: serde_json::Error,
    },
}

/// One cell and its nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellDocument {
    /// Cell column.
    pub lon_idx: i32,
    /// Cell row.
    pub lat_idx: i32,
    /// Cells per degree.
    pub divisor: i32,
    /// Nodes in any order.
    #[serde(default)]
    pub nodes: Vec<NodeDocument>,
}

/// A node and its outgoing links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDocument {
    /// Absolute longitude in micro-degrees.
    pub lon: i32,
    /// Absolute latitude in micro-degrees.
    pub lat: i32,
    /// Elevation in quarter meters.
    #[serde(default)]
    pub elevation: i16,
    /// Node tag set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
    /// Links in record order.
    #[serde(default)]
    pub links: Vec<LinkDocument>,
}

/// A link to another node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkDocument {
    /// Absolute target longitude.
    pub lon: i32,
    /// Absolute target latitude.
    pub lat: i32,
    /// Whether the link is the reverse side of a way.
    #[serde(default)]
    pub reverse: bool,
    /// Way tag set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
    /// Intermediate points, forward links only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub geometry: Vec<PointDocument>,
}

/// Geometry step relative to the previous point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointDocument {
    /// Longitude step.
    pub dlon: i32,
    /// Latitude step.
    pub dlat: i32,
    /// Elevation step.
    pub dele: i32,
}

/// Counts reported by `inspect`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CellSummary {
    /// Nodes in the cell.
    pub nodes: usize,
    /// Forward links.
    pub forward_links: usize,
    /// Reverse links.
    pub reverse_links: usize,
    /// Links whose target lies in the cell.
    pub internal_links: usize,
    /// Links leaving the cell.
    pub external_links: usize,
    /// Intermediate geometry points.
    pub geometry_points: usize,
    /// Bytes of node records.
    pub record_bytes: usize,
}

impl CellDocument {
    /// Geometry of the described cell.
    pub fn cell(&self) -> Result<CellGeometry, CliError> {
        Ok(CellGeometry::new(self.lon_idx, self.lat_idx, self.divisor)?)
    }

    /// Builds the cache, ordering nodes by id.
    pub fn to_cache(&self) -> Result<MicroCache, CliError> {
        let cell = self.cell()?;
        let mut order: Vec<(u32, &NodeDocument)> = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            if !cell.is_internal(node.lon, node.lat) {
                return Err(CliError::Message(format!(
                    "node ({}, {}) lies outside cell ({}, {})",
                    node.lon, node.lat, self.lon_idx, self.lat_idx
                )));
            }
            order.push((cell.shrink_id(node.lon, node.lat), node));
        }
        order.sort_by_key(|(id, _)| *id);
        if let Some(pair) = order.windows(2).find(|pair| pair[0].0 == pair[1].0) {
            return Err(CliError::Message(format!(
                "duplicate node at ({}, {})",
                pair[1].1.lon, pair[1].1.lat
            )));
        }

        let mut cache = MicroCache::for_encode(cell, order.len());
        let mut geometry = Vec::new();
        for (_, node) in order {
            let node_tags = parse_tags(node.tags.as_deref())?;
            let mut writer =
                cache.begin_node(node.lon, node.lat, node.elevation, node_tags.as_deref())?;
            for link in &node.links {
                let way_tags = parse_tags(link.tags.as_deref())?;
                geometry.clear();
                geometry.extend(link.geometry.iter().map(|p| GeometryPoint {
                    dlon: p.dlon,
                    dlat: p.dlat,
                    dele: p.dele,
                }));
                writer.link(link.lon, link.lat, link.reverse, way_tags.as_deref(), &geometry)?;
            }
            writer.finish();
        }
        Ok(cache)
    }

    /// Describes `cache`.
    pub fn from_cache(cache: &MicroCache) -> Result<Self, CliError> {
        let cell = cache.cell();
        let mut nodes = Vec::with_capacity(cache.len());
        for node in cache.nodes() {
            let node = node?;
            let mut links = Vec::new();
            for link in node.links() {
                let link = link?;
                let geometry = link
                    .geometry()
                    .map(|p| {
                        p.map(|p| PointDocument {
                            dlon: p.dlon,
                            dlat: p.dlat,
                            dele: p.dele,
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                links.push(LinkDocument {
                    lon: link.target_lon(),
                    lat: link.target_lat(),
                    reverse: link.is_reverse(),
                    tags: link.tags().map(format_tags),
                    geometry,
                });
            }
            nodes.push(NodeDocument {
                lon: node.lon(),
                lat: node.lat(),
                elevation: node.elevation(),
                tags: node.tags().map(format_tags),
                links,
            });
        }
        Ok(Self {
            lon_idx: cell.lon_idx(),
            lat_idx: cell.lat_idx(),
            divisor: cell.divisor(),
            nodes,
        })
    }
}

impl CellSummary {
    /// Counts nodes, links and points of `cache`.
    pub fn of(cache: &MicroCache) -> Result<Self, CliError> {
        let mut summary = Self {
            nodes: cache.len(),
            record_bytes: cache.data().len(),
            ..Self::default()
        };
        for node in cache.nodes() {
            for link in node?.links() {
                let link = link?;
                if link.is_reverse() {
                    summary.reverse_links += 1;
                } else {
                    summary.forward_links += 1;
                }
                if link.is_internal() {
                    summary.internal_links += 1;
                } else {
                    summary.external_links += 1;
                }
                for point in link.geometry() {
                    point?;
                    summary.geometry_points += 1;
                }
            }
        }
        Ok(summary)
    }
}

/// Text form of a tag set.
pub fn format_tags(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) if !text.starts_with(HEX_PREFIX) => text.to_owned(),
        _ => format!("{HEX_PREFIX}{}", hex::encode(bytes)),
    }
}

/// Bytes of a tag set written by [`format_tags`]. Empty strings are null.
pub fn parse_tags(text: Option<&str>) -> Result<Option<Vec<u8>>, CliError> {
    let Some(text) = text.filter(|t| !t.is_empty()) else {
        return Ok(None);
    };
    match text.strip_prefix(HEX_PREFIX) {
        Some(encoded) => hex::decode(encoded)
            .map(Some)
            .map_err(|e| CliError::Message(format!("bad hex tag set '{text}': {e}"))),
        None => Ok(Some(text.as_bytes().to_vec())),
    }
}

/// Reads a document from `path`.
pub fn read_document(path: &Path) -> Result<CellDocument, CliError> {
    let contents = fs::read(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&contents).map_err(|source| CliError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes `doc` to `path` as pretty JSON.
pub fn write_document(path: &Path, doc: &CellDocument) -> Result<(), CliError> {
    let json = serde_json::to_vec_pretty(doc).map_err(|source| CliError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, json).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })
}
