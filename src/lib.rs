pub mod analyzer;
pub mod boundary;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod git;
pub mod logging;
pub mod manifest;
pub mod proposal;
pub mod registry;
pub mod ui;
pub mod workflow;

pub use error::{ImgUpgrError, Result};
