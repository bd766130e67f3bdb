pub mod common;
pub mod git;
pub mod ids;
pub mod indexer;
pub mod python;
pub mod scan;
pub mod sql;
pub mod ts_util;
pub mod typescript;

pub use indexer::{CodeIndexer, IndexerError, ScanReport, DEFAULT_SCAN_INTERVAL_SECS};
