//! Batch evidence collection over many targets.
//!
//! Targets come from literal lists and sitemaps ([`targets`]), are fanned out
//! to a pool of workers that each drive an external collector ([`pool`],
//! [`collector`]), and the per-target evidence is merged into a full and a
//! simplified report ([`aggregate`], [`report`]).

pub mod aggregate;
pub mod batch;
pub mod cli;
pub mod collector;
pub mod config;
pub mod error;
pub mod evidence;
pub mod pool;
pub mod report;
pub mod targets;

pub use batch::{BatchRunner, BatchSummary};
pub use error::{BatchError, Result, ToolInvocationError};
