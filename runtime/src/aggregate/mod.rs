//! Aggregation engine: pure merges of evidence records into the full and
//! simplified reports. No I/O happens here.

pub mod endpoint;
pub mod full;
pub mod merge;
pub mod simplified;

pub use endpoint::normalize_endpoint;
pub use full::{build_full_report, FullReport, RunWindow};
pub use simplified::{build_simplified_report, SimplifiedReport};
