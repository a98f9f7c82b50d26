#![doc = include_str!("../README.md")]

mod client;
mod config;
mod error;
pub mod memory;
mod observer;
mod scan;
mod types;

pub use crate::client::*;
pub use crate::config::*;
pub use crate::error::*;
pub use crate::memory::MemoryStore;
pub use crate::observer::*;
pub use crate::scan::*;
pub use crate::types::*;

// Re-exported so callers can cancel scans without naming tokio-util.
pub use tokio_util::sync::CancellationToken;
