use crate::error::{ImgUpgrError, Result};
use crate::registry::{RepositoryName, TagSource};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Tag source serving canned tag lists, keyed by normalized repository name
pub struct MockTagSource {
    tags: HashMap<String, Vec<String>>,
    failures: HashMap<String, u16>,
    requests: Mutex<Vec<String>>,
}

impl MockTagSource {
    /// Create a new empty mock tag source
    pub fn new() -> Self {
        MockTagSource {
            tags: HashMap::new(),
            failures: HashMap::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Serve `tags` for `repository`
    pub fn with_tags(mut self, repository: &str, tags: &[&str]) -> Self {
        self.tags.insert(
            RepositoryName::parse(repository).full_name(),
            tags.iter().map(|t| t.to_string()).collect(),
        );
        self
    }

    /// Answer requests for `repository` with an HTTP error
    pub fn with_status(mut self, repository: &str, status: u16) -> Self {
        self.failures
            .insert(RepositoryName::parse(repository).full_name(), status);
        self
    }

    /// Normalized names of every repository requested so far
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl Default for MockTagSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TagSource for MockTagSource {
    async fn fetch_all_tags(
        &self,
        repository: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        if cancel.is_cancelled() {
            return Err(ImgUpgrError::Cancelled);
        }

        let name = RepositoryName::parse(repository).full_name();
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(name.clone());
        }

        if let Some(status) = self.failures.get(&name) {
            return Err(ImgUpgrError::Http {
                status: *status,
                url: format!("mock://{}", name),
            });
        }

        self.tags.get(&name).cloned().ok_or(ImgUpgrError::Http {
            status: 404,
            url: format!("mock://{}", name),
        })
    }
}
