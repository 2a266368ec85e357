//! Merge-request proposals
//!
//! [ProposalGateway] is the seam between the change workflow and the code
//! host. [gitlab::GitLabClient] talks to the GitLab v4 REST API;
//! [mock::MockProposalGateway] records requests for tests.

pub mod gitlab;
pub mod mock;

pub use gitlab::GitLabClient;
pub use mock::MockProposalGateway;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Request body for opening a merge request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeRequest {
    pub source_branch: String,
    pub target_branch: String,
    pub title: String,
    pub description: String,
}

/// The fields img-upgr reads back from a created merge request
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
pub struct MergeRequestResponse {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub iid: u64,
    #[serde(default)]
    pub web_url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub created_at: String,
}

#[async_trait]
pub trait ProposalGateway: Send + Sync {
    /// Open a merge request from `source_branch` into `target_branch`
    async fn create_merge_request(&self, request: &MergeRequest) -> Result<MergeRequestResponse>;

    /// Create a remote branch `name` from `from_ref`
    async fn create_branch(&self, name: &str, from_ref: &str) -> Result<()>;

    /// Write `content` to `path` on `branch` as a single commit
    ///
    /// Updates the file, creating it when the remote reports it missing.
    async fn commit_file(
        &self,
        branch: &str,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<()>;

    /// Raw content of `path` at `branch`
    async fn get_file(&self, branch: &str, path: &str) -> Result<String>;
}
