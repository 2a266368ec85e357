//! Update resolution: which images have a newer tag in the registry

pub mod resolver;
pub mod update_set;

pub use resolver::{resolve, Resolution};
pub use update_set::{check_image, BuildOutcome, BuildReport, ImageStatus, UpdateSetBuilder};
