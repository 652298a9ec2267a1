use arc_swap::{ArcSwap, ArcSwapOption};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::sink::{ActiveSink, SinkConfig, SinkFactory, DEFAULT_STATSD_PORT};

/// Topic carrying node and grid configuration
pub const NODE_INFO_TOPIC: &str = "agent:node_info";

/// Identity of the node this agent runs on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeContext {
    pub name: String,
    pub grid_name: Option<String>,
}

/// Configuration snapshots shared between the listener and the collection loop.
///
/// Both cells are replaced wholesale, so readers always see a complete value.
#[derive(Clone, Default)]
pub struct SharedState {
    node: Arc<ArcSwap<NodeContext>>,
    sink: Arc<ArcSwapOption<ActiveSink>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self) -> Arc<NodeContext> {
        self.node.load_full()
    }

    pub fn sink(&self) -> Option<Arc<ActiveSink>> {
        self.sink.load_full()
    }

    pub fn set_node(&self, node: NodeContext) {
        self.node.store(Arc::new(node));
    }

    pub fn set_sink(&self, sink: Option<ActiveSink>) {
        self.sink.store(sink.map(Arc::new));
    }
}

/// One message from the agent's event bus
#[derive(Debug, Clone)]
pub struct Notification {
    pub topic: String,
    pub payload: Value,
}

impl Notification {
    pub fn node_info(payload: Value) -> Self {
        Self { topic: NODE_INFO_TOPIC.to_string(), payload }
    }
}

/// Rebuilds node identity and sink configuration from `agent:node_info`
pub struct NodeInfoListener {
    state: SharedState,
    factory: SinkFactory,
}

impl NodeInfoListener {
    pub fn new(state: SharedState, factory: SinkFactory) -> Self {
        Self { state, factory }
    }

    /// Handle one notification. Malformed fields disable the sink.
    pub fn on_notification(&self, topic: &str, info: &Value) {
        if topic != NODE_INFO_TOPIC {
            debug!(topic, "ignoring notification");
            return;
        }

        let grid_name = info
            .pointer("/grid/name")
            .and_then(Value::as_str)
            .map(String::from);
        let node = NodeContext {
            name: info.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
            grid_name: grid_name.clone(),
        };

        let sink = sink_config(info, grid_name).map(|config| {
            debug!(host = %config.host, port = config.port, "exporting stats via statsd");
            ActiveSink { client: (self.factory)(&config), config }
        });
        if sink.is_none() {
            debug!("statsd export disabled");
        }

        info!(node = %node.name, statsd = sink.is_some(), "node info updated");
        self.state.set_node(node);
        self.state.set_sink(sink);
    }

    /// Consume notifications until every sender is gone
    pub async fn run(self, mut rx: mpsc::Receiver<Notification>) {
        while let Some(n) = rx.recv().await {
            self.on_notification(&n.topic, &n.payload);
        }
        debug!("notification channel closed");
    }
}

fn sink_config(info: &Value, namespace: Option<String>) -> Option<SinkConfig> {
    let statsd = info.pointer("/grid/stats/statsd")?;
    let host = statsd.get("server").and_then(Value::as_str)?;
    if host.is_empty() {
        return None;
    }
    let port = match statsd.get("port") {
        Some(Value::Number(n)) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|p| *p != 0)
    .unwrap_or(DEFAULT_STATSD_PORT);

    Some(SinkConfig { host: host.to_string(), port, namespace })
}
