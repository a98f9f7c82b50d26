use super::{SegmentEvent, StopSignal};
use crate::{
    ScanObserver, Segment, SegmentError, SegmentReport, SegmentRequest, SegmentStatus, StoreClient,
};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Everything a worker needs to scan one segment.
///
/// Each worker owns its own sender into the shared page channel. Dropping the
/// worker drops the sender, which is how the aggregator learns that every
/// segment is done.
pub(crate) struct SegmentWorker<C> {
    pub(crate) client: Arc<C>,
    pub(crate) observer: Arc<dyn ScanObserver>,
    pub(crate) table: Arc<str>,
    pub(crate) page_limit: usize,
    pub(crate) stop: StopSignal,
    pub(crate) tx: mpsc::Sender<SegmentEvent>,
}

#[derive(Default)]
struct Progress {
    pages: usize,
    items: usize,
}

impl<C: StoreClient> SegmentWorker<C> {
    /// Scans `segment` to completion, failure or cancellation, then sends the
    /// segment's report as the last event on the channel.
    ///
    /// Designed to be spawned as a Tokio task, one per segment.
    pub(crate) async fn run(self, segment: Segment) {
        #[cfg(feature = "tracing")]
        tracing::trace!("Worker for segment {segment} started");

        let start = Instant::now();
        self.observer.segment_started(&self.table, segment);

        let mut progress = Progress::default();
        let status = match self.scan(segment, &mut progress).await {
            Ok(()) => SegmentStatus::Completed,
            Err(err) => SegmentStatus::Failed(err),
        };

        let report = SegmentReport {
            segment,
            pages: progress.pages,
            items: progress.items,
            elapsed: start.elapsed(),
            status,
        };
        self.observer.segment_finished(&self.table, &report);

        // The aggregator drains until every sender is gone, so this only
        // fails if the aggregator itself died.
        if let Err(_e) = self.tx.send(SegmentEvent::Finished(report)).await {
            #[cfg(feature = "tracing")]
            tracing::debug!("Worker for segment {segment} failed to send report: {_e}");
        }

        #[cfg(feature = "tracing")]
        tracing::trace!("Worker for segment {segment} stopped");
    }

    /// The pagination loop: `Scanning` until the last page (`Ok`) or the
    /// first error (`Err`).
    async fn scan(&self, segment: Segment, progress: &mut Progress) -> Result<(), SegmentError> {
        let request = SegmentRequest {
            table: self.table.to_string(),
            segment,
            page_limit: self.page_limit,
        };
        let mut pages = self.client.scan_segment(request, self.stop.token().clone());

        loop {
            if self.stop.is_stopped() {
                return Err(self.stop.cause());
            }

            let next = tokio::select! {
                biased;
                () = self.stop.token().cancelled() => return Err(self.stop.cause()),
                next = pages.next() => next,
            };

            let page = match next {
                Some(Ok(page)) => page,
                // A stream that ends without flagging its last page is still
                // exhausted.
                None => return Ok(()),
                Some(Err(err)) => {
                    // Clients are allowed to fail their in-flight request when
                    // cancelled; report the cancellation, not the symptom.
                    if self.stop.is_stopped() {
                        return Err(self.stop.cause());
                    }
                    return Err(SegmentError::Client(err));
                }
            };

            let is_last = page.is_last;
            let items = page.items.len();

            let event = SegmentEvent::Page {
                segment,
                items: page.items,
            };
            tokio::select! {
                biased;
                () = self.stop.token().cancelled() => return Err(self.stop.cause()),
                sent = self.tx.send(event) => sent.map_err(|_| SegmentError::ChannelClosed)?,
            }

            progress.pages += 1;
            progress.items += items;
            self.observer.page_received(&self.table, segment, items);

            if is_last {
                return Ok(());
            }
        }
    }
}
