use crate::error::{ImgUpgrError, Result};
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// Repository/tag split used by every proposal opened so far.
///
/// Splits at the first colon, so `host:5000/app:1.0.0` yields repository `host`.
const IMAGE_TAG_PATTERN: &str = r"^([^:]+):(.+)$";

fn image_tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(IMAGE_TAG_PATTERN).expect("image tag pattern is valid"))
}

/// An image reference as written in a manifest (e.g., "nginx:1.25.3")
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    pub repository: String,
    pub tag: String,
}

impl ImageReference {
    /// Split an image string into repository and tag
    ///
    /// # Returns
    /// * `Ok(ImageReference)` - repository and non-empty tag
    /// * `Err(NoTagFound)` - if the string has no `repository:tag` shape
    pub fn parse(image: &str) -> Result<Self> {
        let captures = image_tag_regex()
            .captures(image)
            .ok_or_else(|| ImgUpgrError::NoTagFound(image.to_string()))?;

        Ok(ImageReference {
            repository: captures[1].to_string(),
            tag: captures[2].to_string(),
        })
    }

    /// The same repository pointing at a different tag
    pub fn with_tag(&self, tag: &str) -> String {
        format!("{}:{}", self.repository, tag)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}
