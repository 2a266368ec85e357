//! Command orchestration shared by the `check` and `scan` subcommands

pub mod orchestration;

pub use orchestration::{run, ProposalMode, RunArgs, RunSummary};
