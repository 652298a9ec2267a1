use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub collector: CollectorConfig,
    /// Static node info used when no bus delivers `agent:node_info`
    #[serde(default)]
    pub node: Option<NodeConfig>,
    #[cfg(feature = "nats")]
    #[serde(default)]
    pub nats: NatsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    #[serde(default = "default_hostname")]
    pub hostname: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self { hostname: default_hostname(), log_level: default_log_level() }
    }
}

/// Where the container stats provider listens
#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_url")]
    pub url: String,
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            url: default_provider_url(),
            timeout_secs: default_provider_timeout(),
            max_attempts: default_max_attempts(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RuntimeConfig {
    #[serde(default = "default_docker_url")]
    pub docker_url: String,
    #[serde(default = "default_gating_container")]
    pub gating_container: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { docker_url: default_docker_url(), gating_container: default_gating_container() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CollectorConfig {
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_container_pause")]
    pub container_pause_ms: u64,
    #[serde(default = "default_readiness_poll")]
    pub readiness_poll_ms: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            container_pause_ms: default_container_pause(),
            readiness_poll_ms: default_readiness_poll(),
        }
    }
}

impl CollectorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn container_pause(&self) -> Duration {
        Duration::from_millis(self.container_pause_ms)
    }

    pub fn readiness_poll(&self) -> Duration {
        Duration::from_millis(self.readiness_poll_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct NodeConfig {
    pub name: String,
    pub grid_name: Option<String>,
    pub statsd_server: Option<String>,
    pub statsd_port: Option<u16>,
}

impl NodeConfig {
    /// Render as an `agent:node_info` payload
    pub fn to_node_info(&self) -> serde_json::Value {
        let mut grid = serde_json::Map::new();
        if let Some(ref name) = self.grid_name {
            grid.insert("name".into(), name.clone().into());
        }
        if let Some(ref server) = self.statsd_server {
            let mut statsd = serde_json::Map::new();
            statsd.insert("server".into(), server.clone().into());
            if let Some(port) = self.statsd_port {
                statsd.insert("port".into(), port.into());
            }
            grid.insert("stats".into(), serde_json::json!({ "statsd": statsd }));
        }
        serde_json::json!({ "name": self.name, "grid": grid })
    }
}

#[cfg(feature = "nats")]
#[derive(Debug, Deserialize, Clone)]
pub struct NatsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_nats_url")]
    pub url: String,
    #[serde(default = "default_nats_prefix")]
    pub subject_prefix: String,
    #[serde(default)]
    pub credential_file: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

#[cfg(feature = "nats")]
impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_nats_url(),
            subject_prefix: default_nats_prefix(),
            credential_file: None,
            token: None,
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        // Expand environment variables
        let expanded = expand_env_vars(content)?;

        let config: Config = toml::from_str(&expanded)
            .with_context(|| "Failed to parse configuration")?;

        if config.provider.max_attempts == 0 {
            anyhow::bail!("provider.max_attempts must be at least 1");
        }

        Ok(config)
    }
}

/// Expand ${ENV_VAR} references in config string
fn expand_env_vars(input: &str) -> Result<String> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}")?;
    Ok(re
        .replace_all(input, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_default()
        })
        .to_string())
}

// Default value functions
fn default_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}
fn default_log_level() -> String { "info".to_string() }
fn default_provider_url() -> String { "http://127.0.0.1:8989".to_string() }
fn default_provider_timeout() -> u64 { 10 }
fn default_max_attempts() -> u32 { 3 }
fn default_docker_url() -> String { "http://127.0.0.1:2375".to_string() }
fn default_gating_container() -> String { "kontena-cadvisor".to_string() }
fn default_interval() -> u64 { 60 }
fn default_container_pause() -> u64 { 500 }
fn default_readiness_poll() -> u64 { 1000 }
#[cfg(feature = "nats")]
fn default_nats_url() -> String { "nats://localhost:4222".to_string() }
#[cfg(feature = "nats")]
fn default_nats_prefix() -> String { "agent".to_string() }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.provider.url, "http://127.0.0.1:8989");
        assert_eq!(config.provider.max_attempts, 3);
        assert_eq!(config.runtime.gating_container, "kontena-cadvisor");
        assert_eq!(config.collector.interval(), Duration::from_secs(60));
        assert_eq!(config.collector.container_pause(), Duration::from_millis(500));
        assert_eq!(config.collector.readiness_poll(), Duration::from_secs(1));
        assert!(config.node.is_none());
    }

    #[test]
    fn env_vars_are_expanded() {
        std::env::set_var("STATS_AGENT_TEST_PROVIDER", "http://10.0.0.5:8989");
        let config = Config::parse(
            "[provider]\nurl = \"${STATS_AGENT_TEST_PROVIDER}\"\n",
        )
        .unwrap();
        assert_eq!(config.provider.url, "http://10.0.0.5:8989");
    }

    #[test]
    fn zero_attempts_is_rejected() {
        assert!(Config::parse("[provider]\nmax_attempts = 0\n").is_err());
    }

    #[test]
    fn node_section_renders_node_info() {
        let config = Config::parse(
            r#"
[node]
name = "node-1"
grid_name = "prod"
statsd_server = "10.1.1.1"
statsd_port = 9125
"#,
        )
        .unwrap();
        let info = config.node.unwrap().to_node_info();
        assert_eq!(info["name"], "node-1");
        assert_eq!(info["grid"]["name"], "prod");
        assert_eq!(info["grid"]["stats"]["statsd"]["server"], "10.1.1.1");
        assert_eq!(info["grid"]["stats"]["statsd"]["port"], 9125);
    }

    #[test]
    fn node_without_statsd_has_no_stats_section() {
        let node = NodeConfig {
            name: "n".into(),
            grid_name: None,
            statsd_server: None,
            statsd_port: None,
        };
        let info = node.to_node_info();
        assert!(info["grid"].get("stats").is_none());
    }
}
