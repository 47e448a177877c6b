//! Count replay across encode passes and the shared geometry predictor.

/// Records a sequence of counts in the first encode pass and replays it in
/// the following passes.
///
/// The counting pass sees `0` from [`CountPredictor::next`]; later passes
/// see the value recorded at the same position, so statistics and the
/// final emission agree on every count.
#[derive(Debug, Default, Clone)]
pub struct CountPredictor {
    values: Vec<u32>,
    pos: usize,
    pass: u8,
}

impl CountPredictor {
    /// Creates a predictor with no recorded values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the next pass, rewinding the replay position.
    pub fn begin_pass(&mut self) {
        self.pass = self.pass.saturating_add(1);
        self.pos = 0;
    }

    /// Count expected at the current position.
    pub fn next(&mut self) -> u32 {
        if self.pass <= 1 {
            return 0;
        }
        let value = self.values.get(self.pos).copied().unwrap_or(0);
        self.pos += 1;
        value
    }

    /// Records the actual count; only the first pass keeps it.
    pub fn record(&mut self, value: u32) {
        if self.pass <= 1 {
            self.values.push(value);
        }
    }
}

/// Even-spacing predictor for the intermediate points of a link.
///
/// Each step predicts `remaining / count` on both axes with truncating
/// division, then subtracts the actual step and counts down, never below 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryPredictor {
    rem_lon: i32,
    rem_lat: i32,
    count: i32,
}

impl GeometryPredictor {
    /// Predictor for a link spanning `(dlon, dlat)` through `points`
    /// intermediate points.
    pub fn new(dlon: i32, dlat: i32, points: u32) -> Self {
        let count = i32::try_from(points).unwrap_or(i32::MAX - 1) + 1;
        Self {
            rem_lon: dlon,
            rem_lat: dlat,
            count,
        }
    }

    /// Predicted `(dlon, dlat)` of the next point.
    pub fn predict(&self) -> (i32, i32) {
        (self.rem_lon / self.count, self.rem_lat / self.count)
    }

    /// Consumes an actual step.
    pub fn advance(&mut self, dlon: i32, dlat: i32) {
        self.rem_lon = self.rem_lon.wrapping_sub(dlon);
        self.rem_lat = self.rem_lat.wrapping_sub(dlat);
        if self.count > 1 {
            self.count -= 1;
        }
    }

    /// Delta still to go from the last consumed point to the link target.
    pub fn remaining(&self) -> (i32, i32) {
        (self.rem_lon, self.rem_lat)
    }
}
