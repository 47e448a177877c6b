use std::fmt;
use std::sync::Arc;

use super::metrics::{default_metrics, CodecMetrics};

/// Default upper bound on the declared link-data size of one cell.
pub const DEFAULT_MAX_LINK_DATA_BYTES: usize = 64 * 1024 * 1024;

/// Configuration shared by decode and encode calls.
#[derive(Clone)]
pub struct CodecOptions {
    /// Metrics sink notified of decode and encode events.
    pub metrics: Arc<dyn CodecMetrics>,
    /// Largest link-data size a stream may declare before it is treated
    /// as corrupt.
    pub max_link_data_bytes: usize,
}

impl CodecOptions {
    /// Creates options with default settings.
    pub fn new() -> Self {
        Self {
            metrics: default_metrics(),
            max_link_data_bytes: DEFAULT_MAX_LINK_DATA_BYTES,
        }
    }

    /// Sets the metrics collection implementation.
    pub fn metrics(mut self, metrics: Arc<dyn CodecMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Sets the largest accepted declared link-data size.
    pub fn max_link_data_bytes(mut self, bytes: usize) -> Self {
        self.max_link_data_bytes = bytes;
        self
    }
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CodecOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecOptions")
            .field("max_link_data_bytes", &self.max_link_data_bytes)
            .finish_non_exhaustive()
    }
}
