use anyhow::bail;
use clap::{Parser, ValueEnum};
use core::time::Duration;
use segscan::ScanConfig;

/// Runtime configuration for the `segscan` binary.
///
/// Every flag can also be set through the environment variable named in its
/// doc, and a `.env` file in the working directory is loaded first.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "segscan",
    version,
    about = "Runs a parallel segmented scan over a seeded in-memory table"
)]
pub struct CliArgs {
    /// Name of the table to scan.
    ///
    /// Environment variable: `TABLE_NAME`
    #[arg(long, env = "TABLE_NAME", default_value_t = String::from("me_table_name"))]
    pub table: String,

    /// Number of segments, and so of concurrent worker tasks.
    ///
    /// Environment variable: `PARALLEL_SCAN_WORKERS`
    #[arg(long, env = "PARALLEL_SCAN_WORKERS", default_value_t = 1)]
    pub parallelism: usize,

    /// Maximum number of items requested per page.
    ///
    /// Environment variable: `SCAN_ITEM_LIMIT`
    #[arg(long, env = "SCAN_ITEM_LIMIT", default_value_t = segscan::DEFAULT_PAGE_LIMIT)]
    pub page_limit: usize,

    /// Capacity of the page channel between the workers and the aggregator.
    ///
    /// Lower values apply backpressure sooner; higher values let workers run
    /// further ahead of the aggregator.
    ///
    /// Environment variable: `CHANNEL_CAPACITY`
    #[arg(long, env = "CHANNEL_CAPACITY", default_value_t = segscan::DEFAULT_CHANNEL_CAPACITY)]
    pub channel_capacity: usize,

    /// Overall scan deadline in milliseconds. Unset means no deadline.
    ///
    /// Environment variable: `SCAN_TIMEOUT_MS`
    #[arg(long, env = "SCAN_TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,

    /// Number of synthetic items to seed the table with.
    ///
    /// Environment variable: `SEED_ITEMS`
    #[arg(long, env = "SEED_ITEMS", default_value_t = 10_000)]
    pub seed_items: usize,

    /// Simulated latency of every page request, in milliseconds.
    ///
    /// Environment variable: `PAGE_DELAY_MS`
    #[arg(long, env = "PAGE_DELAY_MS", default_value_t = 0)]
    pub page_delay_ms: u64,

    /// Make the segment with this index fail after its first page, or on
    /// that page if it is the only one.
    ///
    /// Environment variable: `FAIL_SEGMENT`
    #[arg(long, env = "FAIL_SEGMENT")]
    pub fail_segment: Option<usize>,

    /// Exit successfully even if some segments failed.
    #[arg(long, default_value_t = false)]
    pub allow_partial: bool,

    /// What to print on stdout once the scan finishes.
    #[arg(long, value_enum, default_value_t = OutputFormat::Summary)]
    pub output: OutputFormat,

    /// Log line format.
    #[arg(long, value_enum, env = "LOG_FORMAT", default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Item count and elapsed time, plus one line per segment.
    Summary,
    /// Every scanned item as a JSON line.
    Json,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct CliConfig {
    pub scan: ScanConfig,
    pub seed_items: usize,
    pub page_delay: Option<Duration>,
    pub fail_segment: Option<usize>,
    pub allow_partial: bool,
    pub output: OutputFormat,
    pub log_format: LogFormat,
}

impl TryFrom<CliArgs> for CliConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.parallelism == 0 {
            bail!("PARALLEL_SCAN_WORKERS must be greater than 0");
        }

        if args.page_limit == 0 {
            bail!("SCAN_ITEM_LIMIT must be greater than 0");
        }

        if args.channel_capacity == 0 {
            bail!("CHANNEL_CAPACITY must be greater than 0");
        }

        if args.timeout_ms == Some(0) {
            bail!("SCAN_TIMEOUT_MS must be greater than 0 when set");
        }

        if let Some(segment) = args.fail_segment {
            if segment >= args.parallelism {
                bail!(
                    "FAIL_SEGMENT ({}) must be below PARALLEL_SCAN_WORKERS ({})",
                    segment,
                    args.parallelism
                );
            }
        }

        let mut builder = ScanConfig::builder(args.table)
            .parallelism(args.parallelism)
            .page_limit(args.page_limit)
            .channel_capacity(args.channel_capacity);
        if let Some(ms) = args.timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }

        Ok(Self {
            scan: builder.build()?,
            seed_items: args.seed_items,
            page_delay: (args.page_delay_ms > 0).then(|| Duration::from_millis(args.page_delay_ms)),
            fail_segment: args.fail_segment,
            allow_partial: args.allow_partial,
            output: args.output,
            log_format: args.log_format,
        })
    }
}
