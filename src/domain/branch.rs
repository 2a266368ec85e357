use crate::domain::UpdateCandidate;
use chrono::{DateTime, Local};

/// Prefix shared by every branch img-upgr creates
pub const BRANCH_PREFIX: &str = "img-upgr";

/// Everything needed to turn one update into a branch, commit, and merge request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchProposal {
    pub branch_name: String,
    pub base_branch: String,
    pub commit_message: String,
    pub title: String,
    pub description: String,
}

impl BranchProposal {
    /// Build the proposal for `update`, branching from `base_branch` at `now`
    pub fn new(update: &UpdateCandidate, base_branch: impl Into<String>, now: DateTime<Local>) -> Self {
        BranchProposal {
            branch_name: branch_name(&update.service_name, &now),
            base_branch: base_branch.into(),
            commit_message: format!(
                "Update Docker image for {} in {}",
                update.service_name,
                update.file_name()
            ),
            title: format!(
                "Update {} from {} to {}",
                update.service_name, update.old_tag, update.new_tag
            ),
            description: description(update, &now),
        }
    }
}

/// Replace characters that are awkward in ref names
pub fn sanitize_service_name(service: &str) -> String {
    service.replace(['/', ':', '.'], "-")
}

/// `img-upgr/<service>-<YYYYMMDD-HHMMSS>`
///
/// Second resolution: two updates of one service within the same second collide.
pub fn branch_name(service: &str, now: &DateTime<Local>) -> String {
    format!(
        "{}/{}-{}",
        BRANCH_PREFIX,
        sanitize_service_name(service),
        now.format("%Y%m%d-%H%M%S")
    )
}

fn description(update: &UpdateCandidate, now: &DateTime<Local>) -> String {
    let mut text = String::from("Automated update of Docker image by img-upgr\n\n");
    text.push_str(&format!("Service: `{}`\n", update.service_name));
    text.push_str(&format!("File: `{}`\n", update.file_name()));
    text.push_str(&format!("Update: `{}` → `{}`\n", update.old_tag, update.new_tag));
    text.push_str(&format!("Repository: `{}`\n", update.repository));
    text.push_str(&format!("\nGenerated: {}", now.to_rfc3339()));
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::path::PathBuf;

    fn sample_update() -> UpdateCandidate {
        UpdateCandidate {
            service_name: "api/backend".to_string(),
            file_path: PathBuf::from("/work/stack/docker-compose.yml"),
            old_image: "myorg/backend:v1.2.3".to_string(),
            new_image: "myorg/backend:v1.3.0".to_string(),
            repository: "myorg/backend".to_string(),
            old_tag: "v1.2.3".to_string(),
            new_tag: "v1.3.0".to_string(),
        }
    }

    fn fixed_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    #[test]
    fn test_sanitize_service_name() {
        assert_eq!(sanitize_service_name("api/backend"), "api-backend");
        assert_eq!(sanitize_service_name("svc:v1.2"), "svc-v1-2");
        assert_eq!(sanitize_service_name("db"), "db");
    }

    #[test]
    fn test_branch_name_format() {
        assert_eq!(
            branch_name("api/backend", &fixed_time()),
            "img-upgr/api-backend-20240309-140507"
        );
    }

    #[test]
    fn test_proposal_texts() {
        let proposal = BranchProposal::new(&sample_update(), "main", fixed_time());
        assert_eq!(proposal.base_branch, "main");
        assert_eq!(
            proposal.commit_message,
            "Update Docker image for api/backend in docker-compose.yml"
        );
        assert_eq!(proposal.title, "Update api/backend from v1.2.3 to v1.3.0");
        assert!(proposal.description.contains("Service: `api/backend`"));
        assert!(proposal.description.contains("File: `docker-compose.yml`"));
        assert!(proposal.description.contains("`v1.2.3` → `v1.3.0`"));
        assert!(proposal.description.contains("Repository: `myorg/backend`"));
        assert!(proposal.description.contains("Generated: 2024-03-09T14:05:07"));
    }
}
