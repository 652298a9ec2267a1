pub mod statsd;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

pub use statsd::StatsdClient;

/// Port used when the node info carries none
pub const DEFAULT_STATSD_PORT: u16 = 8125;

/// Where external gauges are sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkConfig {
    pub host: String,
    pub port: u16,
    /// Prefix applied to every key, taken from the grid name
    pub namespace: Option<String>,
}

/// Gauge-only metrics backend.
///
/// Emission is fire-and-forget: an `Ok` only means the value left this process.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn gauge(&self, key: &str, value: f64) -> Result<()>;
}

/// A sink client together with the config it was built from
pub struct ActiveSink {
    pub config: SinkConfig,
    pub client: Arc<dyn MetricsSink>,
}

/// Builds a sink client for a freshly received config
pub type SinkFactory = Arc<dyn Fn(&SinkConfig) -> Arc<dyn MetricsSink> + Send + Sync>;

/// Factory producing UDP statsd clients
pub fn statsd_factory() -> SinkFactory {
    Arc::new(|config: &SinkConfig| Arc::new(StatsdClient::new(config)) as Arc<dyn MetricsSink>)
}
