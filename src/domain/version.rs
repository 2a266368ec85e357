use crate::error::{ImgUpgrError, Result};
use std::fmt;

/// Dotted-triplet numeric version (major.minor.patch)
///
/// Ordering is major, then minor, then patch, each compared as integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    /// Create a new version
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Version {
            major,
            minor,
            patch,
        }
    }

    /// Parse a bare `major.minor.patch` string (e.g., "1.2.3" -> Version(1,2,3))
    ///
    /// Pre-release and build metadata are rejected, as are components with
    /// leading zeros, so `Version::parse(s)?.to_string() == s` always holds.
    pub fn parse(s: &str) -> Result<Self> {
        let parsed = semver::Version::parse(s)
            .map_err(|e| ImgUpgrError::NotVersionLike(format!("{}: {}", s, e)))?;

        if !parsed.pre.is_empty() || !parsed.build.is_empty() {
            return Err(ImgUpgrError::NotVersionLike(format!(
                "{}: pre-release and build metadata are not supported",
                s
            )));
        }

        Ok(Version::new(parsed.major, parsed.minor, parsed.patch))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
