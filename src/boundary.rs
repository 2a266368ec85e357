use std::fmt;

/// Reasons an image is left alone. These are non-fatal and reported to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Image string has no `repository:tag` shape
    NoTagFound { image: String },
    /// Tag has no trailing major.minor.patch version
    NotVersionLike { tag: String },
    /// No registry tag shares the prefix and parses as a version
    NoMatchingVersions { repository: String, prefix: String },
    /// Current tag is already the highest matching version
    UpToDate { tag: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoTagFound { image } => write!(f, "no tag found in image '{}'", image),
            SkipReason::NotVersionLike { tag } => write!(f, "tag '{}' is not version-like", tag),
            SkipReason::NoMatchingVersions { repository, prefix } => {
                if prefix.is_empty() {
                    write!(f, "no matching versions found for {}", repository)
                } else {
                    write!(
                        f,
                        "no matching versions with prefix '{}' found for {}",
                        prefix, repository
                    )
                }
            }
            SkipReason::UpToDate { tag } => write!(f, "'{}' is already the latest version", tag),
        }
    }
}
