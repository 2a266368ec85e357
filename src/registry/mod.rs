//! Registry tag sources
//!
//! The [TagSource] trait is what the update set builder depends on. The
//! concrete implementations are:
//!
//! - [hub::DockerHubClient]: the Docker Hub tags API over HTTP
//! - [mock::MockTagSource]: canned tag lists for tests
//!
//! Both return every tag in registry order; matching and sorting happen in
//! the resolver.

pub mod hub;
pub mod mock;

pub use hub::DockerHubClient;
pub use mock::MockTagSource;

use crate::error::{ImgUpgrError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Namespace used for bare repository names on Docker Hub
pub const DEFAULT_NAMESPACE: &str = "library";

/// Source of the complete tag list of a repository
#[async_trait]
pub trait TagSource: Send + Sync {
    /// Fetch all tags for `repository`, following pagination to the end
    ///
    /// # Returns
    /// * `Ok(Vec<String>)` - every tag, in the order the registry returned them
    /// * `Err(Cancelled)` - if `cancel` fired; partial results are dropped
    /// * `Err(Http | Network | Decode)` - on the first failed page
    async fn fetch_all_tags(&self, repository: &str, cancel: &CancellationToken)
        -> Result<Vec<String>>;
}

/// Repository name split into Docker Hub namespace and name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryName {
    pub namespace: String,
    pub name: String,
}

impl RepositoryName {
    /// Normalize a repository name (e.g., "nginx" -> "library/nginx")
    ///
    /// Anything after a colon is dropped first.
    pub fn parse(repository: &str) -> Self {
        let repository = match repository.find(':') {
            Some(idx) if idx > 0 => &repository[..idx],
            _ => repository,
        };

        let mut parts = repository.split('/');
        let first = parts.next().unwrap_or_default();
        match parts.next() {
            Some(second) => RepositoryName {
                namespace: first.to_string(),
                name: second.to_string(),
            },
            None => RepositoryName {
                namespace: DEFAULT_NAMESPACE.to_string(),
                name: first.to_string(),
            },
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// One page of the tags listing
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TagPage {
    #[serde(default)]
    pub results: Vec<TagEntry>,
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TagEntry {
    pub name: String,
}

/// Follow a `next`-linked chain of pages starting at `first_url`
///
/// Stops when `next` is null, absent, or empty. `cancel` is checked before
/// every page request.
pub async fn collect_pages<F, Fut>(
    first_url: String,
    cancel: &CancellationToken,
    mut fetch_page: F,
) -> Result<Vec<String>>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<TagPage>>,
{
    let mut tags = Vec::new();
    let mut next = Some(first_url);
    let mut page_count = 0usize;

    while let Some(url) = next.take() {
        if cancel.is_cancelled() {
            return Err(ImgUpgrError::Cancelled);
        }

        page_count += 1;
        debug!(page = page_count, url = %url, "fetching tags page");

        let page = fetch_page(url).await?;
        tags.extend(page.results.into_iter().map(|entry| entry.name));
        next = page.next.filter(|n| !n.is_empty());

        debug!(total = tags.len(), "fetched tags so far");
    }

    Ok(tags)
}
