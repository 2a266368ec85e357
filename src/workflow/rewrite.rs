use crate::error::Result;
use std::fs;
use std::path::Path;

/// Replace every literal occurrence of `old_image` with `new_image`
///
/// Matching is plain substring matching with no YAML awareness, so an
/// image string embedded in a longer one is rewritten too.
pub fn rewrite_image(content: &str, old_image: &str, new_image: &str) -> String {
    content.replace(old_image, new_image)
}

/// Rewrite the manifest at `path` in place
///
/// # Returns
/// * `Ok(true)` - the file contained `old_image` and was written back
/// * `Ok(false)` - nothing matched; the file is untouched
pub fn rewrite_file(path: &Path, old_image: &str, new_image: &str) -> Result<bool> {
    let content = fs::read_to_string(path)?;
    if !content.contains(old_image) {
        return Ok(false);
    }
    fs::write(path, rewrite_image(&content, old_image, new_image))?;
    Ok(true)
}
