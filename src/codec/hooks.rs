//! Caller-supplied collaborators invoked while a cell is decoded.

use rustc_hash::FxHashSet;
use smallvec::SmallVec;

/// Filters or rewrites way tag sets as the way-tag dictionary is read.
///
/// Called once per non-null dictionary entry. Returning `None` (or an
/// empty set) turns every link carrying that entry into a filtered link,
/// which decode drops together with its geometry.
pub trait WayTagValidator {
    /// Accepted form of `tags`, or `None` to filter it out.
    fn validate(&self, tags: &[u8]) -> Option<Vec<u8>>;
}

impl<F> WayTagValidator for F
where
    F: Fn(&[u8]) -> Option<Vec<u8>>,
{
    fn validate(&self, tags: &[u8]) -> Option<Vec<u8>> {
        self(tags)
    }
}

/// Streaming view of the polyline of every accepted forward link.
///
/// For each such link decode calls `start_node` with the source, then
/// `transfer_node` for each intermediate point and `end_node` with the
/// target, all in absolute coordinates and in decode order.
pub trait WaypointMatcher {
    /// Link source.
    fn start_node(&mut self, lon: i32, lat: i32);
    /// Intermediate point.
    fn transfer_node(&mut self, lon: i32, lat: i32);
    /// Link target.
    fn end_node(&mut self, lon: i32, lat: i32);
}

/// Drops way tag sets found in a fixed deny list.
#[derive(Debug, Default, Clone)]
pub struct DenyListValidator {
    denied: FxHashSet<Vec<u8>>,
}

impl DenyListValidator {
    /// Validator rejecting exactly the given tag sets.
    pub fn new(denied: impl IntoIterator<Item = Vec<u8>>) -> Self {
        Self {
            denied: denied.into_iter().collect(),
        }
    }

    /// Number of denied tag sets.
    pub fn len(&self) -> usize {
        self.denied.len()
    }

    /// Whether nothing is denied.
    pub fn is_empty(&self) -> bool {
        self.denied.is_empty()
    }
}

impl WayTagValidator for DenyListValidator {
    fn validate(&self, tags: &[u8]) -> Option<Vec<u8>> {
        if self.denied.contains(tags) {
            None
        } else {
            Some(tags.to_vec())
        }
    }
}

/// Absolute points of one link, source and target included.
pub type Polyline = SmallVec<[(i32, i32); 4]>;

/// Records matcher callbacks as one polyline per link.
#[derive(Debug, Default, Clone)]
pub struct PolylineRecorder {
    lines: Vec<Polyline>,
    current: Option<Polyline>,
}

impl PolylineRecorder {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Completed polylines in decode order.
    pub fn polylines(&self) -> &[Polyline] {
        &self.lines
    }

    /// Takes the completed polylines, leaving the recorder empty.
    pub fn take(&mut self) -> Vec<Polyline> {
        self.current = None;
        std::mem::take(&mut self.lines)
    }
}

impl WaypointMatcher for PolylineRecorder {
    fn start_node(&mut self, lon: i32, lat: i32) {
        let mut line = Polyline::new();
        line.push((lon, lat));
        self.current = Some(line);
    }

    fn transfer_node(&mut self, lon: i32, lat: i32) {
        if let Some(line) = self.current.as_mut() {
            line.push((lon, lat));
        }
    }

    fn end_node(&mut self, lon: i32, lat: i32) {
        if let Some(mut line) = self.current.take() {
            line.push((lon, lat));
            self.lines.push(line);
        }
    }
}
