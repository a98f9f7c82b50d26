//! Scan configuration.
//!
//! A [`ScanConfig`] is built once through [`ScanConfig::builder`] and is
//! immutable afterwards. Every field is validated in
//! [`ScanConfigBuilder::build`], so a config that exists is always usable and
//! a bad one is rejected before any worker is spawned.

use crate::{Error, Result, Segment};
use core::time::Duration;

/// Default number of items requested per page.
pub const DEFAULT_PAGE_LIMIT: usize = 600;

/// Default capacity of the page channel between workers and the aggregator.
///
/// A small buffer keeps memory bounded to a handful of pages while letting
/// workers run ahead of the aggregator a little.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 8;

/// Settings for a single parallel scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanConfig {
    table: String,
    parallelism: usize,
    page_limit: usize,
    channel_capacity: usize,
    timeout: Option<Duration>,
}

impl ScanConfig {
    /// Starts a builder for scanning `table` with one segment and default
    /// limits.
    pub fn builder(table: impl Into<String>) -> ScanConfigBuilder {
        ScanConfigBuilder {
            table: table.into(),
            parallelism: 1,
            page_limit: DEFAULT_PAGE_LIMIT,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            timeout: None,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Degree of parallelism. This is also the total segment count.
    pub const fn parallelism(&self) -> usize {
        self.parallelism
    }

    pub const fn total_segments(&self) -> usize {
        self.parallelism
    }

    pub const fn page_limit(&self) -> usize {
        self.page_limit
    }

    pub const fn channel_capacity(&self) -> usize {
        self.channel_capacity
    }

    /// Upper bound on the wall-clock time of a scan, if any.
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Every segment this configuration scans.
    pub fn segments(&self) -> impl Iterator<Item = Segment> {
        Segment::all(self.parallelism)
    }
}

/// Builder for [`ScanConfig`].
#[derive(Clone, Debug)]
#[must_use]
pub struct ScanConfigBuilder {
    table: String,
    parallelism: usize,
    page_limit: usize,
    channel_capacity: usize,
    timeout: Option<Duration>,
}

impl ScanConfigBuilder {
    /// Number of segments, each scanned by its own worker.
    pub fn parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Maximum number of items the store returns per page.
    pub fn page_limit(mut self, page_limit: usize) -> Self {
        self.page_limit = page_limit;
        self
    }

    /// Number of pages that may wait in the channel before workers block.
    pub fn channel_capacity(mut self, channel_capacity: usize) -> Self {
        self.channel_capacity = channel_capacity;
        self
    }

    /// Cancels any unfinished segments once `timeout` has elapsed.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Validates the settings and produces an immutable [`ScanConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if:
    /// - the table name is empty.
    /// - `parallelism`, `page_limit` or `channel_capacity` is zero.
    /// - the timeout is zero.
    pub fn build(self) -> Result<ScanConfig> {
        if self.table.trim().is_empty() {
            return Err(Error::invalid_config("table name must not be empty"));
        }
        if self.parallelism == 0 {
            return Err(Error::invalid_config(
                "parallelism must be greater than 0",
            ));
        }
        if self.page_limit == 0 {
            return Err(Error::invalid_config("page limit must be greater than 0"));
        }
        if self.channel_capacity == 0 {
            return Err(Error::invalid_config(
                "channel capacity must be greater than 0",
            ));
        }
        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::invalid_config("timeout must be greater than 0"));
        }

        Ok(ScanConfig {
            table: self.table,
            parallelism: self.parallelism,
            page_limit: self.page_limit,
            channel_capacity: self.channel_capacity,
            timeout: self.timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reason(err: Error) -> String {
        match err {
            Error::InvalidConfig { reason } => reason,
            other => panic!("expected InvalidConfig, got {other:?}"),
        }
    }

    #[test]
    fn builder_defaults() {
        let config = ScanConfig::builder("users").build().unwrap();
        assert_eq!(config.table(), "users");
        assert_eq!(config.parallelism(), 1);
        assert_eq!(config.total_segments(), 1);
        assert_eq!(config.page_limit(), DEFAULT_PAGE_LIMIT);
        assert_eq!(config.channel_capacity(), DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(config.timeout(), None);
    }

    #[test]
    fn builder_overrides() {
        let config = ScanConfig::builder("users")
            .parallelism(8)
            .page_limit(25)
            .channel_capacity(2)
            .timeout(Duration::from_secs(3))
            .build()
            .unwrap();
        assert_eq!(config.total_segments(), 8);
        assert_eq!(config.page_limit(), 25);
        assert_eq!(config.channel_capacity(), 2);
        assert_eq!(config.timeout(), Some(Duration::from_secs(3)));
        assert_eq!(config.segments().count(), 8);
    }

    #[test]
    fn rejects_zero_parallelism() {
        let err = ScanConfig::builder("users").parallelism(0).build().unwrap_err();
        assert!(reason(err).contains("parallelism"));
    }

    #[test]
    fn rejects_zero_page_limit() {
        let err = ScanConfig::builder("users").page_limit(0).build().unwrap_err();
        assert!(reason(err).contains("page limit"));
    }

    #[test]
    fn rejects_zero_channel_capacity() {
        let err = ScanConfig::builder("users")
            .channel_capacity(0)
            .build()
            .unwrap_err();
        assert!(reason(err).contains("channel capacity"));
    }

    #[test]
    fn rejects_empty_table_and_zero_timeout() {
        let err = ScanConfig::builder("  ").build().unwrap_err();
        assert!(reason(err).contains("table"));

        let err = ScanConfig::builder("users")
            .timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(reason(err).contains("timeout"));
    }
}
