//! CLI subcommand implementations for the evidence-batch binary.

pub mod doctor;
pub mod output;
pub mod run_cmd;
