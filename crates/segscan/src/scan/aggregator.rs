use super::SegmentEvent;
use crate::{Item, Segment, SegmentError, SegmentReport, SegmentStatus};
use core::time::Duration;
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Everything the aggregator collected once the page channel closed.
#[derive(Default)]
pub(crate) struct Aggregate {
    pub(crate) items: Vec<Item>,
    pub(crate) reports: Vec<SegmentReport>,
    // pages and items actually delivered, per segment
    delivered: HashMap<Segment, (usize, usize)>,
}

impl Aggregate {
    /// Builds a report for a segment whose worker exited without sending one,
    /// counting what it delivered before it went away.
    pub(crate) fn orphan_report(&self, segment: Segment, error: SegmentError) -> SegmentReport {
        let (pages, items) = self.delivered.get(&segment).copied().unwrap_or_default();
        SegmentReport {
            segment,
            pages,
            items,
            elapsed: Duration::ZERO,
            status: SegmentStatus::Failed(error),
        }
    }

    pub(crate) fn has_report(&self, segment: Segment) -> bool {
        self.reports.iter().any(|report| report.segment == segment)
    }
}

/// Drains the page channel into a single result.
///
/// This is the only writer of the result: workers hand their pages over by
/// value and never touch it. Returns once every sender has been dropped and
/// the channel is empty.
pub(crate) async fn aggregate(mut rx: mpsc::Receiver<SegmentEvent>, total_segments: usize) -> Aggregate {
    let mut aggregate = Aggregate {
        reports: Vec::with_capacity(total_segments),
        ..Aggregate::default()
    };

    while let Some(event) = rx.recv().await {
        match event {
            SegmentEvent::Page { segment, items } => {
                let delivered = aggregate.delivered.entry(segment).or_default();
                delivered.0 += 1;
                delivered.1 += items.len();
                aggregate.items.extend(items);
            }
            SegmentEvent::Finished(report) => {
                #[cfg(feature = "tracing")]
                tracing::trace!(
                    "Segment {} finished after {} pages",
                    report.segment,
                    report.pages
                );
                aggregate.reports.push(report);
            }
        }
    }

    aggregate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::keyed_item;

    #[tokio::test]
    async fn drains_pages_and_reports_until_closed() {
        let (tx, rx) = mpsc::channel(4);
        let handle = tokio::spawn(aggregate(rx, 2));

        let s0 = Segment::new(0, 2).unwrap();
        let s1 = Segment::new(1, 2).unwrap();
        tx.send(SegmentEvent::Page {
            segment: s0,
            items: vec![keyed_item("pk", "a"), keyed_item("pk", "b")],
        })
        .await
        .unwrap();
        tx.send(SegmentEvent::Page {
            segment: s1,
            items: vec![keyed_item("pk", "c")],
        })
        .await
        .unwrap();
        tx.send(SegmentEvent::Finished(SegmentReport {
            segment: s0,
            pages: 1,
            items: 2,
            elapsed: Duration::ZERO,
            status: SegmentStatus::Completed,
        }))
        .await
        .unwrap();
        drop(tx);

        let aggregate = handle.await.unwrap();
        assert_eq!(aggregate.items.len(), 3);
        assert_eq!(aggregate.reports.len(), 1);
        assert!(aggregate.has_report(s0));
        assert!(!aggregate.has_report(s1));

        let orphan = aggregate.orphan_report(
            s1,
            SegmentError::WorkerPanicked {
                reason: "boom".into(),
            },
        );
        assert_eq!(orphan.pages, 1);
        assert_eq!(orphan.items, 1);
        assert!(!orphan.is_completed());
    }

    #[tokio::test]
    async fn closed_empty_channel_yields_empty_aggregate() {
        let (tx, rx) = mpsc::channel::<SegmentEvent>(1);
        drop(tx);
        let aggregate = aggregate(rx, 0).await;
        assert!(aggregate.items.is_empty());
        assert!(aggregate.reports.is_empty());
    }
}
