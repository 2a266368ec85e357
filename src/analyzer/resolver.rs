use crate::domain::{CandidateTag, ParsedTag, Version};
use tracing::debug;

/// Highest matching version found in the registry for a tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub latest_tag: String,
    pub latest_version: Version,
    pub has_update: bool,
}

/// Registry tags sharing the current prefix, in fetch order
pub fn find_matching_versions(current: &ParsedTag, tags: &[String]) -> Vec<CandidateTag> {
    debug!(prefix = %current.prefix, "looking for tags with prefix");
    tags.iter()
        .filter_map(|tag| current.candidate(tag))
        .collect()
}

/// Pick the highest candidate and decide whether it is newer than `current`
///
/// # Returns
/// * `Some(Resolution)` - the highest matching tag; `has_update` only when
///   its version is strictly greater than the current one
/// * `None` - if no registry tag matches the prefix
pub fn resolve(current: &ParsedTag, tags: &[String]) -> Option<Resolution> {
    let candidates = find_matching_versions(current, tags);
    debug!(count = candidates.len(), "found matching versions");

    // Keep the first of equal versions: only a strictly greater one replaces it
    let latest = candidates.into_iter().reduce(|best, next| {
        if next.version > best.version {
            next
        } else {
            best
        }
    })?;

    Some(Resolution {
        has_update: latest.version > current.version,
        latest_tag: latest.full_tag,
        latest_version: latest.version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_resolve_finds_newer_with_prefix() {
        let current = ParsedTag::parse("apache-2.34.0").unwrap();
        let resolution = resolve(
            &current,
            &tags(&["apache-2.34.0", "apache-2.35.0", "apache-rc1"]),
        )
        .unwrap();

        assert_eq!(resolution.latest_tag, "apache-2.35.0");
        assert_eq!(resolution.latest_version, Version::new(2, 35, 0));
        assert!(resolution.has_update);
    }

    #[test]
    fn test_resolve_same_version_is_not_update() {
        let current = ParsedTag::parse("7.0.0").unwrap();
        let resolution = resolve(&current, &tags(&["7.0.0"])).unwrap();
        assert_eq!(resolution.latest_tag, "7.0.0");
        assert!(!resolution.has_update);
    }

    #[test]
    fn test_resolve_never_downgrades() {
        let current = ParsedTag::parse("v3.0.0").unwrap();
        let resolution = resolve(&current, &tags(&["v1.0.0", "v2.9.9"])).unwrap();
        assert_eq!(resolution.latest_tag, "v2.9.9");
        assert!(!resolution.has_update);
    }

    #[test]
    fn test_resolve_no_candidates() {
        let current = ParsedTag::parse("alpine-1.0.0").unwrap();
        assert!(resolve(&current, &tags(&["latest", "bookworm-1.2.0", "1.5.0"])).is_none());
    }

    #[test]
    fn test_resolve_compares_numerically() {
        let current = ParsedTag::parse("1.9.0").unwrap();
        let resolution = resolve(&current, &tags(&["1.10.0", "1.9.5", "1.2.0"])).unwrap();
        assert_eq!(resolution.latest_tag, "1.10.0");
    }

    #[test]
    fn test_resolve_empty_prefix_ignores_prefixed_tags() {
        let current = ParsedTag::parse("1.0.0").unwrap();
        let resolution = resolve(&current, &tags(&["v9.0.0", "1.1.0"])).unwrap();
        assert_eq!(resolution.latest_tag, "1.1.0");
    }

    #[test]
    fn test_resolve_tie_keeps_first_in_fetch_order() {
        let current = ParsedTag {
            prefix: String::new(),
            version: Version::new(1, 0, 0),
        };
        let list = tags(&["2.0.0", "1.5.0", "2.0.0"]);
        let resolution = resolve(&current, &list).unwrap();
        assert_eq!(resolution.latest_tag, "2.0.0");
    }

    #[test]
    fn test_find_matching_versions_keeps_fetch_order() {
        let current = ParsedTag::parse("v1.0.0").unwrap();
        let found = find_matching_versions(&current, &tags(&["v1.2.0", "x1.3.0", "v1.1.0"]));
        let names: Vec<&str> = found.iter().map(|c| c.full_tag.as_str()).collect();
        assert_eq!(names, vec!["v1.2.0", "v1.1.0"]);
    }
}
