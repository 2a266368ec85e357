use serde::Serialize;
use std::path::{Path, PathBuf};

/// One resolved image update, ready to be proposed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateCandidate {
    pub service_name: String,
    pub file_path: PathBuf,
    pub old_image: String,
    pub new_image: String,
    pub repository: String,
    pub old_tag: String,
    pub new_tag: String,
}

impl UpdateCandidate {
    /// File name of the manifest, used in commit messages and descriptions
    pub fn file_name(&self) -> String {
        file_name_of(&self.file_path)
    }
}

pub(crate) fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
