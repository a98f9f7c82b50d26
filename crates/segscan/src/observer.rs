//! Observability hooks for scans.
//!
//! A [`ScanObserver`] receives structured events as a scan progresses. It is
//! handed to the [`Scanner`](crate::Scanner) at construction time and is used
//! for diagnostics only. Nothing it does influences the scan.
//!
//! Observers are called concurrently from every worker task, so
//! implementations must be cheap and must not block.

use crate::{ScanConfig, ScanSummary, Segment, SegmentReport};

/// Receives progress events from a scan.
///
/// Every method has a no-op default, so implementors only override what they
/// care about.
pub trait ScanObserver: Send + Sync + 'static {
    /// Called once, before any worker is spawned.
    fn scan_started(&self, _config: &ScanConfig) {}

    /// Called by a worker before it requests its first page.
    fn segment_started(&self, _table: &str, _segment: Segment) {}

    /// Called by a worker for every page it has handed to the aggregator.
    fn page_received(&self, _table: &str, _segment: Segment, _items: usize) {}

    /// Called exactly once per segment with its final report, whether the
    /// segment completed or failed.
    fn segment_finished(&self, _table: &str, _report: &SegmentReport) {}

    /// Called once, after the aggregator has drained every page.
    fn scan_finished(&self, _summary: &ScanSummary) {}
}

/// An observer that ignores every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl ScanObserver for NoopObserver {}

/// An observer that emits every event through [`tracing`].
///
/// Segment failures are logged at `error` level, everything else at `info`
/// or `debug`.
#[cfg(feature = "tracing")]
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

#[cfg(feature = "tracing")]
impl ScanObserver for TracingObserver {
    fn scan_started(&self, config: &ScanConfig) {
        tracing::info!(
            table_name = config.table(),
            number_of_threads = config.parallelism(),
            item_limit = config.page_limit(),
            "Scanning items"
        );
    }

    fn segment_started(&self, table: &str, segment: Segment) {
        tracing::info!(
            table_name = table,
            segment = segment.index(),
            total_segments = segment.total(),
            "Scanning items from segment"
        );
    }

    fn page_received(&self, table: &str, segment: Segment, items: usize) {
        tracing::debug!(
            table_name = table,
            segment = segment.index(),
            total_segments = segment.total(),
            items,
            "Received page"
        );
    }

    fn segment_finished(&self, table: &str, report: &SegmentReport) {
        match report.error() {
            None => tracing::info!(
                table_name = table,
                segment = report.segment.index(),
                total_segments = report.segment.total(),
                total_scanned_item_count = report.items,
                pages = report.pages,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "Scanned items from segment"
            ),
            Some(err) => tracing::error!(
                table_name = table,
                segment = report.segment.index(),
                total_segments = report.segment.total(),
                total_scanned_item_count = report.items,
                error = %err,
                "Error while scanning pages"
            ),
        }
    }

    fn scan_finished(&self, summary: &ScanSummary) {
        if summary.failed_segments == 0 {
            tracing::info!(
                table_name = %summary.table,
                total_segments = summary.total_segments,
                items = summary.items,
                pages = summary.pages,
                elapsed_ms = summary.elapsed.as_millis() as u64,
                "Scan complete"
            );
        } else {
            tracing::warn!(
                table_name = %summary.table,
                total_segments = summary.total_segments,
                failed_segments = summary.failed_segments,
                items = summary.items,
                pages = summary.pages,
                elapsed_ms = summary.elapsed.as_millis() as u64,
                "Scan finished with failed segments"
            );
        }
    }
}
