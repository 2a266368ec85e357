//! Domain logic - pure rules for image references, tags, and versions

pub mod branch;
pub mod image;
pub mod tag;
pub mod update;
pub mod version;

pub use branch::BranchProposal;
pub use image::ImageReference;
pub use tag::{CandidateTag, ParsedTag};
pub use update::UpdateCandidate;
pub use version::Version;
