use crate::error::{ImgUpgrError, Result};
use crate::proposal::{MergeRequest, MergeRequestResponse, ProposalGateway};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Records merge requests instead of sending them
///
/// Requests whose source branch contains a configured pattern fail with an
/// API error carrying the configured status.
#[derive(Default)]
pub struct MockProposalGateway {
    failures: Vec<(String, u16)>,
    opened: Mutex<Vec<MergeRequest>>,
    files: Mutex<HashMap<(String, String), String>>,
}

impl MockProposalGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(mut self, source_pattern: impl Into<String>, status: u16) -> Self {
        self.failures.push((source_pattern.into(), status));
        self
    }

    pub fn opened(&self) -> Vec<MergeRequest> {
        self.opened
            .lock()
            .map(|opened| opened.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ProposalGateway for MockProposalGateway {
    async fn create_merge_request(&self, request: &MergeRequest) -> Result<MergeRequestResponse> {
        if let Some((_, status)) = self
            .failures
            .iter()
            .find(|(pattern, _)| request.source_branch.contains(pattern.as_str()))
        {
            return Err(ImgUpgrError::Api {
                status: *status,
                body: Some(serde_json::json!({ "message": "simulated failure" })),
            });
        }

        let mut opened = self
            .opened
            .lock()
            .map_err(|_| ImgUpgrError::vcs("mock", "state poisoned"))?;
        opened.push(request.clone());
        let iid = opened.len() as u64;

        Ok(MergeRequestResponse {
            id: 1000 + iid,
            iid,
            web_url: format!("https://gitlab.example.com/group/project/-/merge_requests/{}", iid),
            title: request.title.clone(),
            state: "opened".to_string(),
            created_at: String::new(),
        })
    }

    async fn create_branch(&self, _name: &str, _from_ref: &str) -> Result<()> {
        Ok(())
    }

    async fn commit_file(
        &self,
        branch: &str,
        path: &str,
        content: &str,
        _message: &str,
    ) -> Result<()> {
        if let Ok(mut files) = self.files.lock() {
            files.insert((branch.to_string(), path.to_string()), content.to_string());
        }
        Ok(())
    }

    async fn get_file(&self, branch: &str, path: &str) -> Result<String> {
        self.files
            .lock()
            .ok()
            .and_then(|files| files.get(&(branch.to_string(), path.to_string())).cloned())
            .ok_or(ImgUpgrError::Api {
                status: 404,
                body: None,
            })
    }
}
