use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, info};

use crate::core::component::Component;
use crate::core::config::InstallerConfig;
use crate::core::error::{InstallError, InstallResult};
use crate::core::ports::{ReleaseInfo, ReleaseLookup};

const GITHUB_API_BASE: &str = "https://api.github.com";

/// Release tags from GitHub's "latest release" endpoint.
#[derive(Debug, Clone)]
pub struct GithubReleaseLookup {
    client: Client,
    api_base: String,
    repos: BTreeMap<Component, String>,
}

impl GithubReleaseLookup {
    pub fn new(client: Client, repos: BTreeMap<Component, String>) -> Self {
        Self {
            client,
            api_base: GITHUB_API_BASE.to_string(),
            repos,
        }
    }

    pub fn from_config(client: Client, config: &InstallerConfig) -> Self {
        let repos = Component::ALL
            .into_iter()
            .filter_map(|c| config.source(c).release_repo.map(|repo| (c, repo)))
            .collect();
        Self::new(client, repos)
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

#[async_trait]
impl ReleaseLookup for GithubReleaseLookup {
    async fn fetch_latest_release_info(&self, component: Component) -> InstallResult<ReleaseInfo> {
        let Some(repo) = self.repos.get(&component) else {
            debug!("{} has no release repository", component);
            return Ok(ReleaseInfo::default());
        };

        let url = format!("{}/repos/{}/releases/latest", self.api_base, repo);
        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(ReleaseInfo::default());
        }
        if !status.is_success() {
            return Err(InstallError::DownloadFailed {
                url,
                status: status.as_u16(),
            });
        }

        let release: ReleaseInfo = response.json().await?;
        info!("Latest release of {}: {:?}", component, release.tag_name);
        Ok(release)
    }
}
