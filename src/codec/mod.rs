//! Microcache codec.
//!
//! A microcache holds the routing nodes of one square map cell as a sorted
//! id array plus a byte buffer of per-node records. This module converts
//! between that in-memory form and the compact statistical bitstream stored
//! in tiles.
//!
//! Decoding is the hot path: it takes a caller-owned [`DecodeScratch`],
//! optional [`WayTagValidator`] and [`WaypointMatcher`] hooks, drops nodes
//! that no valid link touches, and synthesizes the reverse links that the
//! stream leaves implicit. Encoding runs three passes over the cache so the
//! coders can be fitted to the data before anything is written.

/// Cell geometry and Morton-interleaved node ids.
pub mod cell;
/// Delta and tag-set coders with collect/freeze/emit phases.
pub mod coders;
mod decode;
mod encode;
/// Decode callbacks and their provided implementations.
pub mod hooks;
/// Codec counters.
pub mod metrics;
mod microcache;
mod options;
/// Link-count and geometry predictors shared by both directions.
pub mod predictor;
/// Intermediate per-node record format.
pub mod record;
mod reverse;
mod scratch;

pub use cell::CellGeometry;
pub use encode::{EncodeReport, Section, SectionBits};
pub use hooks::{DenyListValidator, Polyline, PolylineRecorder, WayTagValidator, WaypointMatcher};
pub use metrics::{CodecMetrics, CounterMetrics, NoopMetrics};
pub use microcache::{LinkView, LinkViews, MicroCache, NodeView, NodeWriter};
pub use options::{CodecOptions, DEFAULT_MAX_LINK_DATA_BYTES};
pub use record::GeometryPoint;
pub use reverse::ReverseLinkIndex;
pub use scratch::DecodeScratch;
