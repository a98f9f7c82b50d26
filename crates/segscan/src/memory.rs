//! In-memory [`StoreClient`] used for tests, benchmarks and the demo binary.
//!
//! [`MemoryStore`] holds one table in a `Vec` and partitions it by hashing
//! each item's key attribute modulo the requested segment count. The mapping
//! is deterministic and disjoint for any segment count, which is the property
//! a real partitioned store guarantees for segmented scans.
//!
//! A few knobs make it useful as a test double:
//!
//! - [`MemoryStore::with_page_delay`] adds latency to every page request.
//! - [`MemoryStore::fail_segment`] makes one segment fail after a number of
//!   pages.
//! - [`MemoryStore::page_requests`] counts the page requests served.

use crate::{
    AttributeValue, ClientError, Item, Page, PageStream, Segment, SegmentRequest, StoreClient,
};
use core::hash::{Hash, Hasher};
use core::time::Duration;
use futures::StreamExt;
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

/// A single in-memory table that serves segmented, paginated scans.
#[derive(Debug)]
pub struct MemoryStore {
    table: String,
    key_attribute: String,
    items: Vec<Item>,
    page_delay: Option<Duration>,
    // segment index -> number of pages served before failing
    faults: HashMap<usize, usize>,
    page_requests: AtomicUsize,
}

impl MemoryStore {
    /// Creates an empty table whose items are partitioned by `key_attribute`.
    pub fn new(table: impl Into<String>, key_attribute: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            key_attribute: key_attribute.into(),
            items: Vec::new(),
            page_delay: None,
            faults: HashMap::new(),
            page_requests: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn with_items(mut self, items: impl IntoIterator<Item = Item>) -> Self {
        self.items.extend(items);
        self
    }

    /// Delays every page request by `delay`. The delay is cut short if the
    /// scan is cancelled.
    #[must_use]
    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = Some(delay);
        self
    }

    /// Makes the segment with index `segment_index` fail once it has served
    /// `after_pages` pages, or on its last page if it has fewer. The fault
    /// applies whatever the total segment count of the scan is.
    #[must_use]
    pub fn fail_segment(mut self, segment_index: usize, after_pages: usize) -> Self {
        self.faults.insert(segment_index, after_pages);
        self
    }

    pub fn insert(&mut self, item: Item) {
        self.items.push(item);
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total number of page requests served so far, failed ones included.
    pub fn page_requests(&self) -> usize {
        self.page_requests.load(Ordering::Relaxed)
    }

    /// Number of items that fall into `segment`.
    pub fn segment_len(&self, segment: Segment) -> usize {
        self.items
            .iter()
            .filter(|item| self.segment_of(item, segment.total()) == segment.index())
            .count()
    }

    /// Number of pages a full scan of `segment` takes with `page_limit`.
    ///
    /// An empty segment still takes one (empty) page.
    pub fn segment_pages(&self, segment: Segment, page_limit: usize) -> usize {
        self.segment_len(segment).div_ceil(page_limit).max(1)
    }

    fn segment_of(&self, item: &Item, total: usize) -> usize {
        let mut hasher = DefaultHasher::new();
        item.get(&self.key_attribute).hash(&mut hasher);
        (hasher.finish() % total as u64) as usize
    }

    fn next_in_segment(&self, from: usize, segment: Segment) -> Option<usize> {
        self.items
            .iter()
            .enumerate()
            .skip(from)
            .find(|(_, item)| self.segment_of(item, segment.total()) == segment.index())
            .map(|(pos, _)| pos)
    }
}

/// Pagination state for one segment of a [`MemoryStore`] scan.
struct SegmentCursor<'a> {
    store: &'a MemoryStore,
    segment: Segment,
    page_limit: usize,
    // position of the next item in this segment, `None` once exhausted
    next: Option<usize>,
    pages_served: usize,
    done: bool,
    cancel: CancellationToken,
}

impl SegmentCursor<'_> {
    async fn next_page(&mut self) -> Result<Page, ClientError> {
        if let Some(delay) = self.store.page_delay {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    return Err(ClientError::new("request cancelled"));
                }
                () = tokio::time::sleep(delay) => {}
            }
        }

        self.store.page_requests.fetch_add(1, Ordering::Relaxed);

        let mut items = Vec::with_capacity(self.page_limit.min(self.store.items.len()));
        while items.len() < self.page_limit {
            let Some(pos) = self.next else { break };
            items.push(self.store.items[pos].clone());
            self.next = self.store.next_in_segment(pos + 1, self.segment);
        }

        // A faulted segment never completes, even when it is shorter than
        // `after_pages` pages.
        if let Some(&after_pages) = self.store.faults.get(&self.segment.index()) {
            if self.pages_served >= after_pages || self.next.is_none() {
                return Err(ClientError::new(format!(
                    "injected failure on segment {}",
                    self.segment
                )));
            }
        }

        self.pages_served += 1;
        Ok(Page::new(items, self.next.is_none()))
    }
}

impl StoreClient for MemoryStore {
    fn scan_segment(&self, request: SegmentRequest, cancel: CancellationToken) -> PageStream<'_> {
        if request.table != self.table {
            let err = ClientError::new(format!("table not found: {}", request.table));
            return futures::stream::once(async move { Err(err) }).boxed();
        }

        let cursor = SegmentCursor {
            store: self,
            segment: request.segment,
            page_limit: request.page_limit,
            next: self.next_in_segment(0, request.segment),
            pages_served: 0,
            done: false,
            cancel,
        };

        futures::stream::unfold(cursor, |mut cursor| async move {
            if cursor.done {
                return None;
            }
            let page = cursor.next_page().await;
            cursor.done = match &page {
                Ok(page) => page.is_last,
                Err(_) => true,
            };
            Some((page, cursor))
        })
        .boxed()
    }
}

/// Builds an item with a single string key attribute.
pub fn keyed_item(key_attribute: &str, key: impl Into<String>) -> Item {
    let mut item = Item::new();
    item.insert(key_attribute.to_owned(), AttributeValue::S(key.into()));
    item
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    fn store(n: usize) -> MemoryStore {
        MemoryStore::new("t", "pk").with_items((0..n).map(|i| keyed_item("pk", format!("k{i}"))))
    }

    fn request(segment: Segment, page_limit: usize) -> SegmentRequest {
        SegmentRequest {
            table: "t".into(),
            segment,
            page_limit,
        }
    }

    #[tokio::test]
    async fn single_segment_pages_in_insertion_order() {
        let store = store(7);
        let segment = Segment::new(0, 1).unwrap();
        let pages: Vec<Page> = store
            .scan_segment(request(segment, 3), CancellationToken::new())
            .try_collect()
            .await
            .unwrap();

        assert_eq!(pages.len(), 3);
        assert_eq!(
            pages.iter().map(|p| p.count).collect::<Vec<_>>(),
            vec![3, 3, 1]
        );
        assert!(pages[2].is_last);
        assert!(!pages[0].is_last && !pages[1].is_last);

        let keys: Vec<_> = pages
            .iter()
            .flat_map(|p| &p.items)
            .map(|item| item["pk"].as_s().unwrap().to_owned())
            .collect();
        let expected: Vec<_> = (0..7).map(|i| format!("k{i}")).collect();
        assert_eq!(keys, expected);
        assert_eq!(store.page_requests(), 3);
    }

    #[tokio::test]
    async fn empty_segment_yields_one_empty_last_page() {
        let store = store(0);
        let pages: Vec<Page> = store
            .scan_segment(request(Segment::new(2, 4).unwrap(), 10), CancellationToken::new())
            .try_collect()
            .await
            .unwrap();
        assert_eq!(pages, vec![Page::empty_last()]);
    }

    #[test]
    fn partitions_are_disjoint_and_complete() {
        let store = store(500);
        for total in [1, 2, 3, 8, 64] {
            let sum: usize = Segment::all(total).map(|s| store.segment_len(s)).sum();
            assert_eq!(sum, 500, "total segments = {total}");
        }
        let segment = Segment::new(0, 1).unwrap();
        assert_eq!(store.segment_pages(segment, 100), 5);
        assert_eq!(store.segment_pages(segment, 1000), 1);
    }

    #[tokio::test]
    async fn unknown_table_fails() {
        let store = store(3);
        let mut req = request(Segment::new(0, 1).unwrap(), 10);
        req.table = "other".into();
        let err = store
            .scan_segment(req, CancellationToken::new())
            .try_collect::<Vec<_>>()
            .await
            .unwrap_err();
        assert_eq!(err.message(), "table not found: other");
    }

    #[tokio::test]
    async fn injected_fault_stops_after_configured_pages() {
        let store = store(10).fail_segment(0, 1);
        let mut pages = store.scan_segment(
            request(Segment::new(0, 1).unwrap(), 4),
            CancellationToken::new(),
        );
        assert_eq!(pages.next().await.unwrap().unwrap().count, 4);
        let err = pages.next().await.unwrap().unwrap_err();
        assert!(err.message().contains("injected failure on segment 0/1"));
        assert!(pages.next().await.is_none());
    }

    #[tokio::test]
    async fn injected_fault_fires_on_a_single_page_segment() {
        let store = store(3).fail_segment(0, 1);
        let mut pages = store.scan_segment(
            request(Segment::new(0, 1).unwrap(), 10),
            CancellationToken::new(),
        );
        let err = pages.next().await.unwrap().unwrap_err();
        assert!(err.message().contains("injected failure on segment 0/1"));
        assert!(pages.next().await.is_none());
        assert_eq!(store.page_requests(), 1);
    }

    #[tokio::test]
    async fn injected_fault_fires_on_an_empty_segment() {
        let store = store(0).fail_segment(1, 5);
        let result: Result<Vec<Page>, _> = store
            .scan_segment(request(Segment::new(1, 2).unwrap(), 10), CancellationToken::new())
            .try_collect()
            .await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_page_delay() {
        let store = store(10).with_page_delay(Duration::from_secs(60));
        let cancel = CancellationToken::new();
        let mut pages = store.scan_segment(request(Segment::new(0, 1).unwrap(), 4), cancel.clone());
        cancel.cancel();
        let err = pages.next().await.unwrap().unwrap_err();
        assert_eq!(err.message(), "request cancelled");
        assert_eq!(store.page_requests(), 0);
    }
}
