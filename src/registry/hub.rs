use crate::config::RegistryConfig;
use crate::error::{ImgUpgrError, Result};
use crate::registry::{collect_pages, RepositoryName, TagPage, TagSource};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Docker Hub tags API client
pub struct DockerHubClient {
    http: Client,
    base_url: String,
    page_size: usize,
}

impl DockerHubClient {
    /// Build a client from registry settings (base URL, page size, timeout)
    pub fn new(config: &RegistryConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(DockerHubClient {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            page_size: config.page_size,
        })
    }

    /// First page URL for a repository
    pub fn tags_url(&self, repository: &RepositoryName) -> String {
        format!(
            "{}/{}/{}/tags?page_size={}",
            self.base_url, repository.namespace, repository.name, self.page_size
        )
    }

    async fn fetch_page(&self, url: String, cancel: &CancellationToken) -> Result<TagPage> {
        let request = self.http.get(&url).send();
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ImgUpgrError::Cancelled),
            response = request => response?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(ImgUpgrError::Http {
                status: status.as_u16(),
                url,
            });
        }

        let body = response.bytes().await?;
        let page: TagPage = serde_json::from_slice(&body)?;
        Ok(page)
    }
}

#[async_trait]
impl TagSource for DockerHubClient {
    async fn fetch_all_tags(
        &self,
        repository: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let repo = RepositoryName::parse(repository);
        debug!(repository = %repo.full_name(), "fetching tags");

        let tags = collect_pages(self.tags_url(&repo), cancel, |url| {
            self.fetch_page(url, cancel)
        })
        .await?;

        info!(repository = %repo.full_name(), count = tags.len(), "found tags");
        Ok(tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_url() {
        let config = RegistryConfig {
            base_url: "https://hub.example.com/v2/repositories/".to_string(),
            page_size: 50,
            ..RegistryConfig::default()
        };
        let client = DockerHubClient::new(&config).unwrap();
        let url = client.tags_url(&RepositoryName::parse("nginx"));
        assert_eq!(
            url,
            "https://hub.example.com/v2/repositories/library/nginx/tags?page_size=50"
        );
    }
}
