use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::config::ProviderConfig;
use crate::types::{CpuCounters, MemoryStats, RawContainerSample};

/// Path prefix of the provider's per-container endpoint
pub const CONTAINER_STATS_PATH: &str = "/api/v1.2/docker";

/// Status and body of one provider response
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub status: u16,
    pub body: String,
}

impl ProviderResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Source of raw per-container statistics.
///
/// An `Err` means the request never produced a response (connection
/// refused, timeout, ...). Any HTTP status, including errors, is `Ok`.
#[async_trait]
pub trait StatsProvider: Send + Sync {
    async fn container_stats(&self, container_id: &str) -> Result<ProviderResponse>;
}

/// cadvisor-compatible provider reached over HTTP
pub struct HttpStatsProvider {
    base_url: String,
    client: reqwest::Client,
}

impl HttpStatsProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build provider HTTP client")?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url_for(&self, container_id: &str) -> String {
        format!("{}{}/{}", self.base_url, CONTAINER_STATS_PATH, container_id)
    }
}

#[async_trait]
impl StatsProvider for HttpStatsProvider {
    async fn container_stats(&self, container_id: &str) -> Result<ProviderResponse> {
        let resp = self.client.get(self.url_for(container_id)).send().await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        Ok(ProviderResponse { status, body })
    }
}

#[derive(Debug, Deserialize)]
struct ContainerDocument {
    #[serde(default)]
    aliases: Vec<String>,
    #[serde(default)]
    spec: Value,
    stats: Vec<StatEntry>,
}

#[derive(Debug, Deserialize)]
struct StatEntry {
    timestamp: DateTime<Utc>,
    cpu: CpuEntry,
    memory: MemoryEntry,
    #[serde(default)]
    filesystem: Value,
    #[serde(default)]
    diskio: Value,
    #[serde(default)]
    network: Value,
}

#[derive(Debug, Deserialize)]
struct CpuEntry {
    usage: CpuUsageEntry,
}

#[derive(Debug, Deserialize)]
struct CpuUsageEntry {
    total: u64,
    #[serde(default)]
    per_cpu_usage: Option<Vec<u64>>,
}

#[derive(Debug, Deserialize)]
struct MemoryEntry {
    usage: u64,
    #[serde(default)]
    working_set: u64,
}

/// Parse a provider body into the newest sample it contains.
///
/// The body is a map with a single runtime-chosen slice key.
pub fn parse_container_document(body: &str) -> Result<RawContainerSample> {
    let root: serde_json::Map<String, Value> =
        serde_json::from_str(body).context("body is not a JSON object")?;
    let (slice_key, doc) = root
        .into_iter()
        .next()
        .context("document has no slice entry")?;
    let doc: ContainerDocument = serde_json::from_value(doc)
        .with_context(|| format!("invalid container document under {}", slice_key))?;

    let aliases = doc.aliases;
    let spec = doc.spec;
    let newest = doc.stats.into_iter().last().context("document has no stats")?;

    Ok(RawContainerSample {
        aliases,
        spec,
        timestamp: newest.timestamp,
        cpu: CpuCounters {
            total_usage: newest.cpu.usage.total,
            per_cpu_usage: newest.cpu.usage.per_cpu_usage,
        },
        memory: MemoryStats {
            usage: newest.memory.usage,
            working_set: newest.memory.working_set,
        },
        filesystem: newest.filesystem,
        diskio: newest.diskio,
        network: newest.network,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body() -> String {
        json!({
            "/system.slice/docker-abc.scope": {
                "aliases": ["weave-abc", "web-1"],
                "spec": { "labels": { "io.kontena.service.name": "web" } },
                "stats": [
                    {
                        "timestamp": "2017-05-02T12:00:00.000000000Z",
                        "cpu": { "usage": { "total": 1000, "per_cpu_usage": [600, 400] } },
                        "memory": { "usage": 10, "working_set": 5 }
                    },
                    {
                        "timestamp": "2017-05-02T12:00:01.500000000Z",
                        "cpu": { "usage": { "total": 3000, "per_cpu_usage": [1600, 1400] } },
                        "memory": { "usage": 20, "working_set": 8 },
                        "filesystem": [{ "device": "/dev/sda1" }],
                        "diskio": {},
                        "network": { "interfaces": [{ "name": "eth0", "rx_bytes": 1, "tx_bytes": 2 }] }
                    }
                ]
            }
        })
        .to_string()
    }

    #[test]
    fn newest_sample_is_taken() {
        let sample = parse_container_document(&body()).unwrap();
        assert_eq!(sample.aliases, vec!["weave-abc", "web-1"]);
        assert_eq!(sample.cpu.total_usage, 3000);
        assert_eq!(sample.cpu.per_cpu_usage.as_deref(), Some(&[1600u64, 1400][..]));
        assert_eq!(sample.memory, MemoryStats { usage: 20, working_set: 8 });
        assert_eq!(sample.filesystem[0]["device"], "/dev/sda1");
        assert_eq!(sample.network["interfaces"][0]["name"], "eth0");
        assert_eq!(sample.timestamp.timestamp_subsec_nanos(), 500_000_000);
    }

    #[test]
    fn missing_pass_through_sections_become_null() {
        let body = json!({
            "slice": {
                "aliases": ["a", "b"],
                "stats": [{
                    "timestamp": "2017-05-02T12:00:00Z",
                    "cpu": { "usage": { "total": 1 } },
                    "memory": { "usage": 1 }
                }]
            }
        })
        .to_string();
        let sample = parse_container_document(&body).unwrap();
        assert!(sample.network.is_null());
        assert!(sample.spec.is_null());
        assert!(sample.cpu.per_cpu_usage.is_none());
    }

    #[test]
    fn malformed_documents_are_rejected() {
        assert!(parse_container_document("not json").is_err());
        assert!(parse_container_document("{}").is_err());
        assert!(parse_container_document(r#"{"s": {"aliases": [], "stats": []}}"#).is_err());
        assert!(parse_container_document(r#"{"s": {"stats": [{"timestamp": "bogus"}]}}"#).is_err());
    }

    #[test]
    fn url_joins_base_and_container() {
        let provider = HttpStatsProvider::new(&ProviderConfig {
            url: "http://127.0.0.1:8989/".into(),
            timeout_secs: 1,
            max_attempts: 3,
        })
        .unwrap();
        assert_eq!(
            provider.url_for("abc"),
            "http://127.0.0.1:8989/api/v1.2/docker/abc"
        );
    }
}
