use crate::{ClientError, Page, SegmentRequest};
use futures::stream::BoxStream;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A lazy, ordered sequence of pages for one segment.
///
/// Each poll issues (at most) one page request. The stream may yield an error
/// at any point; the worker stops polling after the first error or after a
/// page marked [`Page::is_last`].
pub type PageStream<'a> = BoxStream<'a, Result<Page, ClientError>>;

/// The capability to scan one segment of a table page by page.
///
/// Implementations wrap the remote store. The scanner calls
/// [`scan_segment`](StoreClient::scan_segment) exactly once per segment and
/// then drains the returned stream from a single worker task.
///
/// The `cancel` token fires when the scan is cancelled or its deadline
/// elapses. Implementations should abort any in-flight request when it does;
/// the worker also stops polling on its own, so honouring it only makes
/// cancellation faster.
pub trait StoreClient: Send + Sync + 'static {
    fn scan_segment(&self, request: SegmentRequest, cancel: CancellationToken) -> PageStream<'_>;
}

impl<C: StoreClient + ?Sized> StoreClient for Arc<C> {
    fn scan_segment(&self, request: SegmentRequest, cancel: CancellationToken) -> PageStream<'_> {
        (**self).scan_segment(request, cancel)
    }
}
