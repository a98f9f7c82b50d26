use crate::telemetry::{
    increment_pages, increment_scans, increment_segment_failures, record_scan_duration,
};
use segscan::{ScanConfig, ScanObserver, ScanSummary, Segment, SegmentError, SegmentReport};

/// Feeds scan events into the binary's metrics and, with the `tracing`
/// feature, into the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct TelemetryObserver {
    #[cfg(feature = "tracing")]
    log: segscan::TracingObserver,
}

impl ScanObserver for TelemetryObserver {
    fn scan_started(&self, _config: &ScanConfig) {
        increment_scans();
        #[cfg(feature = "tracing")]
        self.log.scan_started(_config);
    }

    fn segment_started(&self, _table: &str, _segment: Segment) {
        #[cfg(feature = "tracing")]
        self.log.segment_started(_table, _segment);
    }

    fn page_received(&self, _table: &str, _segment: Segment, items: usize) {
        increment_pages(items as u64);
        #[cfg(feature = "tracing")]
        self.log.page_received(_table, _segment, items);
    }

    fn segment_finished(&self, _table: &str, report: &SegmentReport) {
        if let Some(err) = report.error() {
            increment_segment_failures(failure_reason(err));
        }
        #[cfg(feature = "tracing")]
        self.log.segment_finished(_table, report);
    }

    fn scan_finished(&self, summary: &ScanSummary) {
        record_scan_duration(summary.elapsed.as_secs_f64() * 1000.0);
        #[cfg(feature = "tracing")]
        self.log.scan_finished(summary);
    }
}

/// Low-cardinality label for a segment failure.
pub fn failure_reason(err: &SegmentError) -> &'static str {
    match err {
        SegmentError::Client(_) => "client",
        SegmentError::Cancelled => "cancelled",
        SegmentError::DeadlineExceeded => "deadline",
        SegmentError::ChannelClosed => "channel_closed",
        SegmentError::WorkerPanicked { .. } => "panic",
        _ => "other",
    }
}
