//! Fan-out/fan-in scan coordination.
//!
//! [`Scanner`] splits a table into `parallelism` segments and runs one worker
//! task per segment. Workers pull pages from the [`StoreClient`] and push them
//! into a bounded MPSC channel; a single aggregator task drains that channel
//! into the final [`ScanOutcome`].
//!
//! ```text
//!            ┌─ worker 0 ─┐
//! Scanner ───┼─ worker 1 ─┼──▶ bounded mpsc ──▶ aggregator ──▶ ScanOutcome
//!            └─ worker N ─┘
//! ```
//!
//! ## Lifecycle
//!
//! - Every worker holds a clone of the channel sender. The scanner drops its
//!   own copy right after spawning, so the channel closes exactly when the
//!   last worker exits. That closure is the aggregator's only stop signal.
//! - The scanner joins every worker handle before collecting the aggregate.
//!   A worker that panicked is reported as
//!   [`SegmentError::WorkerPanicked`] for its segment; one whose task was
//!   aborted by the runtime is reported as [`SegmentError::Cancelled`].
//! - A worker ends its segment on the last page, the first client error, or
//!   cancellation, and always sends a [`SegmentReport`] before exiting.
//!
//! ## Failures
//!
//! A failing segment never aborts its siblings. Its error is recorded in the
//! outcome next to the items every other segment produced, and
//! [`ScanOutcome::is_complete`] is `false`.
//!
//! ## Cancellation
//!
//! Each scan runs under a child of the caller's [`CancellationToken`]. The
//! token is passed into every store client call and checked before each page
//! request. The optional deadline cancels the same token, and dropping the
//! scan future cancels it too.

mod aggregator;
mod outcome;
mod worker;


pub use outcome::{ScanOutcome, ScanSummary, SegmentFailure, SegmentReport, SegmentStatus};

use crate::{
    Error, Item, NoopObserver, Result, ScanConfig, ScanObserver, Segment, SegmentError,
    StoreClient,
};
use aggregator::aggregate;
use core::time::Duration;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use worker::SegmentWorker;

/// A message from a segment worker to the aggregator.
pub(crate) enum SegmentEvent {
    /// The items of one page, moved out of the page.
    Page { segment: Segment, items: Vec<Item> },
    /// The worker is done; always the last event a worker sends.
    Finished(SegmentReport),
}

/// Shared stop state for one scan: the cancellation token plus whether it
/// was the deadline that fired it.
#[derive(Clone)]
pub(crate) struct StopSignal {
    token: CancellationToken,
    deadline_hit: Arc<AtomicBool>,
}

impl StopSignal {
    fn new(token: CancellationToken) -> Self {
        Self {
            token,
            deadline_hit: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) const fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The error to record for a segment interrupted by this signal.
    pub(crate) fn cause(&self) -> SegmentError {
        if self.deadline_hit.load(Ordering::Acquire) {
            SegmentError::DeadlineExceeded
        } else {
            SegmentError::Cancelled
        }
    }

    /// Spawns a timer that cancels the scan once `timeout` elapses. The timer
    /// exits early if the scan is stopped first.
    fn arm_deadline(&self, timeout: Duration) -> JoinHandle<()> {
        let token = self.token.clone();
        let deadline_hit = Arc::clone(&self.deadline_hit);
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(timeout) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Scan deadline of {timeout:?} exceeded, cancelling remaining segments");
                    deadline_hit.store(true, Ordering::Release);
                    token.cancel();
                }
            }
        })
    }
}

/// Parallel scan coordinator.
///
/// Built from a validated [`ScanConfig`] and a [`StoreClient`]. The client
/// and observer are owned by the caller and shared with every worker; the
/// scanner itself holds no global state and can run any number of scans.
///
/// ```
/// use segscan::{MemoryStore, ScanConfig, Scanner, memory::keyed_item};
/// use std::sync::Arc;
///
/// # tokio_test_block_on(async {
/// let store = MemoryStore::new("users", "pk")
///     .with_items((0..100).map(|i| keyed_item("pk", format!("user-{i}"))));
/// let config = ScanConfig::builder("users").parallelism(4).page_limit(10).build()?;
///
/// let outcome = Scanner::new(config, Arc::new(store)).scan().await?;
/// assert!(outcome.is_complete());
/// assert_eq!(outcome.len(), 100);
/// # Ok::<_, segscan::Error>(())
/// # }).unwrap();
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
/// # }
/// ```
pub struct Scanner<C> {
    config: ScanConfig,
    client: Arc<C>,
    observer: Arc<dyn ScanObserver>,
}

impl<C> Clone for Scanner<C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            client: Arc::clone(&self.client),
            observer: Arc::clone(&self.observer),
        }
    }
}

impl<C: StoreClient> Scanner<C> {
    /// Creates a scanner that reports to a [`NoopObserver`].
    pub fn new(config: ScanConfig, client: Arc<C>) -> Self {
        Self {
            config,
            client,
            observer: Arc::new(NoopObserver),
        }
    }

    /// Replaces the observer that receives scan events.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ScanObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub const fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub const fn client(&self) -> &Arc<C> {
        &self.client
    }

    /// Scans every segment and merges the results.
    ///
    /// # Errors
    ///
    /// See [`scan_with_cancellation`](Self::scan_with_cancellation).
    pub async fn scan(&self) -> Result<ScanOutcome> {
        self.scan_with_cancellation(CancellationToken::new()).await
    }

    /// Scans every segment under `cancel` and merges the results.
    ///
    /// Cancelling `cancel` stops every in-flight segment at its next
    /// suspension point. Those segments are reported as
    /// [`SegmentError::Cancelled`], and the items gathered so far are still
    /// returned.
    ///
    /// # Errors
    ///
    /// Segment failures are *not* errors; they are reported in the returned
    /// [`ScanOutcome`]. This only fails with [`Error::AggregatorFailed`] if
    /// the aggregator task panicked.
    #[cfg_attr(feature = "tracing", tracing::instrument(
        skip_all,
        fields(table = self.config.table(), segments = self.config.total_segments())
    ))]
    pub async fn scan_with_cancellation(&self, cancel: CancellationToken) -> Result<ScanOutcome> {
        let start = Instant::now();
        let total_segments = self.config.total_segments();
        self.observer.scan_started(&self.config);

        let stop = StopSignal::new(cancel.child_token());
        // Stops every worker if this future is dropped mid-scan.
        let _stop_on_drop = stop.token().clone().drop_guard();
        let deadline = self.config.timeout().map(|t| stop.arm_deadline(t));

        let (tx, rx) = mpsc::channel(self.config.channel_capacity());
        let aggregator = tokio::spawn(aggregate(rx, total_segments));

        let table: Arc<str> = Arc::from(self.config.table());
        let workers: Vec<_> = self
            .config
            .segments()
            .map(|segment| {
                let worker = SegmentWorker {
                    client: Arc::clone(&self.client),
                    observer: Arc::clone(&self.observer),
                    table: Arc::clone(&table),
                    page_limit: self.config.page_limit(),
                    stop: stop.clone(),
                    tx: tx.clone(),
                };
                (segment, tokio::spawn(worker.run(segment)))
            })
            .collect();

        // Workers now hold the only senders.
        drop(tx);

        #[cfg(feature = "tracing")]
        tracing::debug!("Spawned {total_segments} segment workers");

        let joined = futures::future::join_all(
            workers
                .into_iter()
                .map(|(segment, handle)| async move { (segment, handle.await) }),
        )
        .await;

        if let Some(deadline) = deadline {
            deadline.abort();
        }

        let mut aggregate = aggregator.await.map_err(|e| Error::AggregatorFailed {
            reason: join_error_reason(e),
        })?;

        for (segment, result) in joined {
            let Err(err) = result else { continue };
            if aggregate.has_report(segment) {
                continue;
            }
            let error = join_failure(err);
            #[cfg(feature = "tracing")]
            tracing::error!("Worker for segment {segment} did not finish: {error}");

            let report = aggregate.orphan_report(segment, error);
            self.observer.segment_finished(&table, &report);
            aggregate.reports.push(report);
        }

        let outcome = ScanOutcome::new(aggregate.items, aggregate.reports, start.elapsed());
        self.observer.scan_finished(&outcome.summary(&table));
        Ok(outcome)
    }
}

/// Maps a worker that never sent its report to a segment error.
fn join_failure(err: JoinError) -> SegmentError {
    if err.is_cancelled() {
        SegmentError::Cancelled
    } else {
        SegmentError::WorkerPanicked {
            reason: join_error_reason(err),
        }
    }
}

fn join_error_reason(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let panic = err.into_panic();
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}
