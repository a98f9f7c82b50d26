use crate::{Error, Item, Result, Segment, SegmentError};
use core::time::Duration;

/// Terminal state of a segment worker.
#[derive(Clone, Debug)]
pub enum SegmentStatus {
    /// The store returned the segment's last page.
    Completed,
    /// The segment stopped early. Pages received before the failure are
    /// still part of the result.
    Failed(SegmentError),
}

/// What one worker did for its segment.
#[derive(Clone, Debug)]
pub struct SegmentReport {
    pub segment: Segment,
    /// Pages received from the store and forwarded to the aggregator.
    pub pages: usize,
    /// Items across those pages.
    pub items: usize,
    pub elapsed: Duration,
    pub status: SegmentStatus,
}

impl SegmentReport {
    pub const fn is_completed(&self) -> bool {
        matches!(self.status, SegmentStatus::Completed)
    }

    pub const fn error(&self) -> Option<&SegmentError> {
        match &self.status {
            SegmentStatus::Completed => None,
            SegmentStatus::Failed(err) => Some(err),
        }
    }
}

/// A failed segment and the reason it failed.
#[derive(Clone, Debug)]
pub struct SegmentFailure {
    pub segment: Segment,
    pub error: SegmentError,
}

/// Totals for a finished scan, handed to
/// [`ScanObserver::scan_finished`](crate::ScanObserver::scan_finished).
#[derive(Clone, Debug)]
pub struct ScanSummary {
    pub table: String,
    pub total_segments: usize,
    pub items: usize,
    pub pages: usize,
    pub failed_segments: usize,
    pub elapsed: Duration,
}

/// The merged result of a parallel scan.
///
/// Failed segments do not fail the scan. Their errors are kept next to
/// whatever items were gathered, so callers always get the partial result
/// plus an explicit list of what is missing. Use
/// [`is_complete`](Self::is_complete) or
/// [`into_complete`](Self::into_complete) when only a full result will do.
///
/// Items carry no ordering across segments. Within a segment they keep the
/// order the store produced them in.
#[derive(Clone, Debug)]
pub struct ScanOutcome {
    items: Vec<Item>,
    // one per segment, sorted by segment index
    segments: Vec<SegmentReport>,
    elapsed: Duration,
}

impl ScanOutcome {
    pub(crate) fn new(items: Vec<Item>, mut segments: Vec<SegmentReport>, elapsed: Duration) -> Self {
        segments.sort_by_key(|report| report.segment);
        Self {
            items,
            segments,
            elapsed,
        }
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// One report per segment, ordered by segment index.
    pub fn segments(&self) -> &[SegmentReport] {
        &self.segments
    }

    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// `true` when every segment reached its last page.
    pub fn is_complete(&self) -> bool {
        self.segments.iter().all(SegmentReport::is_completed)
    }

    pub fn failures(&self) -> impl Iterator<Item = SegmentFailure> + '_ {
        self.segments.iter().filter_map(|report| {
            report.error().map(|error| SegmentFailure {
                segment: report.segment,
                error: error.clone(),
            })
        })
    }

    pub fn pages(&self) -> usize {
        self.segments.iter().map(|report| report.pages).sum()
    }

    pub(crate) fn summary(&self, table: &str) -> ScanSummary {
        ScanSummary {
            table: table.to_owned(),
            total_segments: self.segments.len(),
            items: self.items.len(),
            pages: self.pages(),
            failed_segments: self.segments.iter().filter(|r| !r.is_completed()).count(),
            elapsed: self.elapsed,
        }
    }

    /// Splits the outcome into the gathered items and the failed segments.
    pub fn into_parts(self) -> (Vec<Item>, Vec<SegmentFailure>) {
        let failures = self.failures().collect();
        (self.items, failures)
    }

    /// Returns the items only if every segment completed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Incomplete`] listing every failed segment otherwise.
    pub fn into_complete(self) -> Result<Vec<Item>> {
        let total_segments = self.segments.len();
        let (items, failures) = self.into_parts();
        if failures.is_empty() {
            Ok(items)
        } else {
            Err(Error::Incomplete {
                total_segments,
                failures,
            })
        }
    }
}
