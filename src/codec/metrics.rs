use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Trait for tracking codec activity.
///
/// Implementations receive one call per event while cells are decoded or
/// encoded. They must be cheap: decode calls into them from its inner loop.
pub trait CodecMetrics: Send + Sync {
    /// Records a successfully decoded cell.
    fn cell_decoded(&self, nodes: usize, valid_nodes: usize);

    /// Records a cell whose stream could not be decoded.
    fn decode_failed(&self);

    /// Records a link dropped because its way tags decoded as null.
    fn link_filtered(&self);

    /// Records the reverse links appended during compaction of one cell.
    fn reverse_links_synthesized(&self, count: usize);

    /// Records a successfully encoded cell and its encoded length.
    fn cell_encoded(&self, bytes: usize);

    /// Records internal reverse links left out of an encoded stream.
    fn reverse_links_skipped(&self, count: usize);
}

/// A no-op implementation of [`CodecMetrics`].
#[derive(Default)]
pub struct NoopMetrics;

impl CodecMetrics for NoopMetrics {
    fn cell_decoded(&self, _nodes: usize, _valid_nodes: usize) {}
    fn decode_failed(&self) {}
    fn link_filtered(&self) {}
    fn reverse_links_synthesized(&self, _count: usize) {}
    fn cell_encoded(&self, _bytes: usize) {}
    fn reverse_links_skipped(&self, _count: usize) {}
}

/// A thread-safe counter-based implementation of [`CodecMetrics`].
#[derive(Default, Debug)]
pub struct CounterMetrics {
    /// Cells decoded without error.
    pub cells_decoded: AtomicU64,

    /// Cells whose decode failed.
    pub decode_failures: AtomicU64,

    /// Links dropped by the way-tag validator.
    pub links_filtered: AtomicU64,

    /// Nodes dropped for having no valid link.
    pub invalid_nodes_dropped: AtomicU64,

    /// Reverse links appended during compaction.
    pub reverse_links_synthesized: AtomicU64,

    /// Cells encoded without error.
    pub cells_encoded: AtomicU64,

    /// Total bytes produced by encode.
    pub encoded_bytes: AtomicU64,

    /// Internal reverse links skipped by encode.
    pub reverse_links_skipped: AtomicU64,
}

impl CodecMetrics for CounterMetrics {
    fn cell_decoded(&self, nodes: usize, valid_nodes: usize) {
        self.cells_decoded.fetch_add(1, Ordering::Relaxed);
        self.invalid_nodes_dropped
            .fetch_add(nodes.saturating_sub(valid_nodes) as u64, Ordering::Relaxed);
    }

    fn decode_failed(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn link_filtered(&self) {
        self.links_filtered.fetch_add(1, Ordering::Relaxed);
    }

    fn reverse_links_synthesized(&self, count: usize) {
        self.reverse_links_synthesized
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    fn cell_encoded(&self, bytes: usize) {
        self.cells_encoded.fetch_add(1, Ordering::Relaxed);
        self.encoded_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    fn reverse_links_skipped(&self, count: usize) {
        self.reverse_links_skipped
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Returns the default metrics implementation wrapped in an [`Arc`].
///
/// The default is [`NoopMetrics`], which discards everything.
pub fn default_metrics() -> Arc<dyn CodecMetrics> {
    Arc::new(NoopMetrics)
}
