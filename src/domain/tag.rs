use crate::domain::Version;
use crate::error::{ImgUpgrError, Result};
use std::fmt;

/// A tag split into its literal prefix and trailing version
/// (e.g., "apache-2.34.0" -> prefix "apache-", version 2.34.0)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTag {
    pub prefix: String,
    pub version: Version,
}

impl ParsedTag {
    /// Split a tag at the first position where the remainder is a valid
    /// `major.minor.patch` triplet.
    ///
    /// # Returns
    /// * `Ok(ParsedTag)` - prefix (possibly empty) and version
    /// * `Err(NotVersionLike)` - if no suffix of the tag is a triplet
    pub fn parse(tag: &str) -> Result<Self> {
        for (idx, _) in tag.char_indices() {
            let remainder = &tag[idx..];
            // A triplet always starts with a digit; skip the parse otherwise
            if !remainder.starts_with(|c: char| c.is_ascii_digit()) {
                continue;
            }
            if let Ok(version) = Version::parse(remainder) {
                return Ok(ParsedTag {
                    prefix: tag[..idx].to_string(),
                    version,
                });
            }
        }

        Err(ImgUpgrError::NotVersionLike(tag.to_string()))
    }

    /// Match a registry tag against this prefix
    ///
    /// Returns a candidate when `tag` starts with the literal prefix and the
    /// rest parses as a triplet.
    pub fn candidate(&self, tag: &str) -> Option<CandidateTag> {
        let suffix = tag.strip_prefix(self.prefix.as_str())?;
        let version = Version::parse(suffix).ok()?;
        Some(CandidateTag {
            full_tag: tag.to_string(),
            version,
        })
    }
}

impl fmt::Display for ParsedTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.prefix, self.version)
    }
}

/// A registry tag sharing the current prefix, with its parsed version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateTag {
    pub full_tag: String,
    pub version: Version,
}
