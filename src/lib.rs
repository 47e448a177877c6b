//! Compact storage for the routing graph of one map cell.
//!
//! A [`codec::MicroCache`] holds the nodes of a cell with their links,
//! tags and intermediate geometry. It encodes into a statistical bitstream
//! and decodes back, optionally filtering links through a way-tag
//! validator and streaming link geometry to a waypoint matcher.
//!
//! ```
//! use microtile::codec::{CellGeometry, DecodeScratch, MicroCache};
//!
//! let cell = CellGeometry::new(2000, 1100, 80)?;
//! let (lon, lat) = (cell.lon_base() + 10, cell.lat_base() + 20);
//! let mut cache = MicroCache::for_encode(cell, 2);
//! let mut a = cache.begin_node(lon, lat, 40, None)?;
//! a.link(lon + 300, lat + 5, false, Some(b"highway=track".as_slice()), &[])?;
//! a.finish();
//! cache.begin_node(lon + 300, lat + 5, 44, None)?.finish();
//!
//! let mut bytes = Vec::new();
//! cache.encode(&mut bytes)?;
//! let decoded = MicroCache::decode(&bytes, cell, &mut DecodeScratch::new(), None, None)?;
//! assert_eq!(decoded.len(), 2);
//! # Ok::<(), microtile::types::TileError>(())
//! ```

#![warn(missing_docs)]

pub mod cli;
pub mod codec;
pub mod logging;
pub mod primitives;
pub mod types;

pub use codec::{CellGeometry, DecodeScratch, MicroCache};
pub use types::{Result, TileError};
