//! Worker pool: pull-based scheduling of targets onto collector workers.

pub mod scheduler;
pub mod worker;

pub use scheduler::{CollapsePolicy, RetryPolicy, RunOutcome, Scheduler, SchedulerPolicy};
pub use worker::{WorkerExit, WorkerId, WorkerState};
