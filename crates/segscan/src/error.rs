//! Error types for parallel segment scans.
//!
//! Errors live at two levels:
//!
//! - [`Error`] is returned by configuration and by the scan coordinator
//!   itself. A scan whose segments failed still returns `Ok`; the failures
//!   travel inside the outcome.
//! - [`SegmentError`] describes why a single segment stopped before its last
//!   page. It is recorded per segment in a
//!   [`SegmentReport`](crate::SegmentReport).
//!
//! [`ClientError`] is the error type store clients hand back for a failed
//! page request.

use crate::{Segment, SegmentFailure};
use core::fmt;
use std::sync::Arc;

pub type Result<T, E = Error> = core::result::Result<T, E>;

type BoxError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Unified error type for the scanner.
#[derive(Clone, thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The scan configuration is unusable. Raised before any worker starts.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// One or more segments did not finish. Only produced when a caller asks
    /// for a complete result via
    /// [`ScanOutcome::into_complete`](crate::ScanOutcome::into_complete).
    #[error("Scan incomplete: {} of {total_segments} segments failed", .failures.len())]
    Incomplete {
        total_segments: usize,
        failures: Vec<SegmentFailure>,
    },

    /// The aggregator task died before draining the page channel.
    #[error("Aggregator failed: {reason}")]
    AggregatorFailed { reason: String },
}

/// Why a segment stopped before reaching its last page.
#[derive(Clone, thiserror::Error, Debug)]
#[non_exhaustive]
pub enum SegmentError {
    /// The store client reported an error for a page request.
    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    /// The scan was cancelled by the caller.
    #[error("Segment scan cancelled")]
    Cancelled,

    /// The scan deadline elapsed before the segment finished.
    #[error("Scan deadline exceeded")]
    DeadlineExceeded,

    /// The aggregator stopped receiving pages.
    #[error("Page channel closed")]
    ChannelClosed,

    /// The worker task panicked.
    #[error("Worker panicked: {reason}")]
    WorkerPanicked { reason: String },
}

impl SegmentError {
    /// Returns `true` if the segment stopped because the scan was cancelled
    /// or ran out of time, rather than because of a fault.
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }
}

/// Error returned by a [`StoreClient`](crate::StoreClient) for a failed
/// page request.
#[derive(Clone, Debug)]
pub struct ClientError {
    message: String,
    source: Option<BoxError>,
}

impl ClientError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Wraps an underlying error, keeping it reachable through
    /// [`std::error::Error::source`].
    pub fn with_source<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            message: message.into(),
            source: Some(Arc::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The cause is reachable through `source()`, not repeated here.
        f.write_str(&self.message)
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl Error {
    pub(crate) fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// The segments that failed, if this is an [`Error::Incomplete`].
    pub fn failed_segments(&self) -> impl Iterator<Item = Segment> + '_ {
        let failures: &[SegmentFailure] = match self {
            Self::Incomplete { failures, .. } => failures,
            _ => &[],
        };
        failures.iter().map(|f| f.segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[derive(Debug, thiserror::Error)]
    #[error("connection reset")]
    struct Reset;

    #[test]
    fn client_error_keeps_source() {
        let err = ClientError::with_source("scan request failed", Reset);
        assert_eq!(err.to_string(), "scan request failed");
        assert_eq!(err.message(), "scan request failed");
        assert_eq!(err.source().unwrap().to_string(), "connection reset");

        let plain = ClientError::new("throttled");
        assert_eq!(plain.to_string(), "throttled");
        assert!(plain.source().is_none());
    }

    #[test]
    fn segment_error_wraps_client_error() {
        let err: SegmentError = ClientError::new("boom").into();
        assert_eq!(err.to_string(), "Client error: boom");
        assert!(!err.is_cancellation());
        assert!(SegmentError::Cancelled.is_cancellation());
        assert!(SegmentError::DeadlineExceeded.is_cancellation());
    }

    #[test]
    fn incomplete_lists_failed_segments() {
        let segment = Segment::new(1, 4).unwrap();
        let err = Error::Incomplete {
            total_segments: 4,
            failures: vec![SegmentFailure {
                segment,
                error: SegmentError::Cancelled,
            }],
        };
        assert_eq!(err.to_string(), "Scan incomplete: 1 of 4 segments failed");
        assert_eq!(err.failed_segments().collect::<Vec<_>>(), vec![segment]);
        assert_eq!(Error::invalid_config("x").failed_segments().count(), 0);
    }
}
