use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::OnceCell;
use tracing::debug;

use super::{MetricsSink, SinkConfig};

/// statsd client sending one gauge per UDP datagram
pub struct StatsdClient {
    host: String,
    port: u16,
    namespace: Option<String>,
    socket: OnceCell<UdpSocket>,
}

impl StatsdClient {
    pub fn new(config: &SinkConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            namespace: config.namespace.clone().filter(|ns| !ns.is_empty()),
            socket: OnceCell::new(),
        }
    }

    /// Wire line for a gauge, e.g. `grid.node.cpu.usage:12.5|g`
    pub fn format_gauge(&self, key: &str, value: f64) -> String {
        match self.namespace {
            Some(ref ns) => format!("{}.{}:{}|g", ns, key, value),
            None => format!("{}:{}|g", key, value),
        }
    }

    async fn socket(&self) -> Result<&UdpSocket> {
        self.socket
            .get_or_try_init(|| async {
                let socket = UdpSocket::bind("0.0.0.0:0").await?;
                socket.connect((self.host.as_str(), self.port)).await?;
                debug!(host = %self.host, port = self.port, "statsd socket ready");
                Ok::<_, std::io::Error>(socket)
            })
            .await
            .with_context(|| format!("Failed to open statsd socket to {}:{}", self.host, self.port))
    }
}

#[async_trait]
impl MetricsSink for StatsdClient {
    async fn gauge(&self, key: &str, value: f64) -> Result<()> {
        let line = self.format_gauge(key, value);
        self.socket().await?.send(line.as_bytes()).await?;
        Ok(())
    }
}
