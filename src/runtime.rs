use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::config::RuntimeConfig;

/// A container as reported by the runtime listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: String,
    pub running: bool,
}

/// The container runtime operations the collector needs
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// All containers known to the runtime, running or not
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>>;

    /// Whether the named container exists and is running
    async fn is_running(&self, name: &str) -> Result<bool>;
}

/// Docker Engine API client
pub struct DockerRuntime {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct ListEntry {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "State", default)]
    state: String,
}

#[derive(Deserialize)]
struct InspectResponse {
    #[serde(rename = "State")]
    state: InspectState,
}

#[derive(Deserialize)]
struct InspectState {
    #[serde(rename = "Running", default)]
    running: bool,
}

impl ListEntry {
    fn into_summary(self) -> ContainerSummary {
        ContainerSummary { running: self.state == "running", id: self.id }
    }
}

impl DockerRuntime {
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            base_url: config.docker_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>> {
        let url = format!("{}/containers/json?all=1", self.base_url);
        let entries: Vec<ListEntry> = self.client.get(&url)
            .send().await
            .context("Failed to list containers")?
            .error_for_status()?
            .json().await
            .context("Invalid container listing")?;

        Ok(entries.into_iter().map(ListEntry::into_summary).collect())
    }

    async fn is_running(&self, name: &str) -> Result<bool> {
        let url = format!("{}/containers/{}/json", self.base_url, name);
        let resp = self.client.get(&url)
            .send().await
            .with_context(|| format!("Failed to inspect container {}", name))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }

        let info: InspectResponse = resp.error_for_status()?.json().await?;
        Ok(info.state.running)
    }
}
