use anyhow::Result;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::collector::DerivedStats;
use crate::node_info::SharedState;
use crate::sink::MetricsSink;
use crate::types::{DerivedStatsEvent, QueueEvent};

/// Label marking a container as part of a named service
pub const SERVICE_NAME_LABEL: &str = "io.kontena.service.name";

/// Fans derived events out to the internal queue and the optional statsd sink
pub struct MetricsDispatcher {
    queue: mpsc::UnboundedSender<QueueEvent>,
    state: SharedState,
}

impl MetricsDispatcher {
    pub fn new(queue: mpsc::UnboundedSender<QueueEvent>, state: SharedState) -> Self {
        Self { queue, state }
    }

    pub async fn dispatch(&self, derived: DerivedStats) {
        let DerivedStats { event, internal_name } = derived;

        // Snapshots are taken before the event moves into the queue
        let sink = self.state.sink();
        let gauges = sink.as_ref().map(|_| {
            let node = self.state.node();
            gauges_for(&event, &internal_name, &node.name)
        });

        if self.queue.send(QueueEvent::container_stats(event)).is_err() {
            warn!(container = %internal_name, "stats queue closed, event dropped");
        }

        if let (Some(sink), Some(gauges)) = (sink, gauges) {
            if let Err(e) = send_gauges(sink.client.as_ref(), &gauges).await {
                error!(container = %internal_name, error = ?e, "failed to send statsd metrics");
            } else {
                debug!(container = %internal_name, count = gauges.len(), "sent statsd metrics");
            }
        }
    }
}

async fn send_gauges(sink: &dyn MetricsSink, gauges: &[(String, f64)]) -> Result<()> {
    for (key, value) in gauges {
        sink.gauge(key, *value).await?;
    }
    Ok(())
}

/// Key prefix for a container: service-scoped when labelled, node-scoped otherwise
pub fn key_base(event: &DerivedStatsEvent, name: &str, node_name: &str) -> String {
    let labelled = event
        .spec
        .get("labels")
        .and_then(|labels| labels.get(SERVICE_NAME_LABEL))
        .is_some_and(|v| !v.is_null());

    if labelled {
        format!("services.{}", name)
    } else {
        format!("{}.containers.{}", node_name, name)
    }
}

/// Every gauge emitted for one event, in emission order
pub fn gauges_for(event: &DerivedStatsEvent, name: &str, node_name: &str) -> Vec<(String, f64)> {
    let base = key_base(event, name, node_name);
    let mut gauges = vec![
        (format!("{}.cpu.usage", base), event.cpu.usage_pct),
        (format!("{}.memory.usage", base), event.memory.usage as f64),
    ];

    let interfaces = event
        .network
        .get("interfaces")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    for iface in interfaces {
        let Some(iface_name) = iface.get("name").and_then(Value::as_str) else {
            continue;
        };
        for metric in ["rx_bytes", "tx_bytes"] {
            if let Some(value) = iface.get(metric).and_then(Value::as_f64) {
                gauges.push((format!("{}.network.iface.{}.{}", base, iface_name, metric), value));
            }
        }
    }

    gauges
}
