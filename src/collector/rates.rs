use std::collections::HashSet;
use tracing::warn;

use crate::storage::SampleStore;
use crate::types::{CpuStats, DerivedStatsEvent, RawContainerSample};

/// A derived event plus the slice-scoped alias used for sink keys
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedStats {
    pub event: DerivedStatsEvent,
    pub internal_name: String,
}

/// Turns consecutive cumulative samples into rate-based metrics
#[derive(Debug, Default)]
pub struct RateComputer {
    store: SampleStore,
}

impl RateComputer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `sample` and derive an event against the previous one.
    ///
    /// Returns `None` for a container's first sample and for samples whose
    /// counters cannot produce a meaningful rate.
    pub fn derive(&mut self, container_id: &str, sample: RawContainerSample) -> Option<DerivedStats> {
        self.store.push(container_id, sample);
        let (previous, current) = self.store.pair(container_id)?;

        let interval_ns = (current.timestamp - previous.timestamp).num_nanoseconds();
        let interval_ns = match interval_ns {
            Some(ns) if ns > 0 => ns,
            _ => {
                warn!(
                    container = container_id,
                    previous = %previous.timestamp,
                    current = %current.timestamp,
                    "non-increasing sample timestamps, skipping"
                );
                return None;
            }
        };

        let Some(usage) = current.cpu.total_usage.checked_sub(previous.cpu.total_usage) else {
            warn!(container = container_id, "cpu usage counter went backwards, skipping");
            return None;
        };

        let (Some(internal_name), Some(display_name)) =
            (current.aliases.first(), current.aliases.get(1))
        else {
            warn!(container = container_id, aliases = ?current.aliases, "container has no display alias");
            return None;
        };

        let num_cores = current
            .cpu
            .per_cpu_usage
            .as_ref()
            .map(Vec::len)
            .filter(|n| *n > 0)
            .unwrap_or(1);

        Some(DerivedStats {
            event: DerivedStatsEvent {
                id: display_name.clone(),
                spec: current.spec.clone(),
                cpu: CpuStats {
                    usage,
                    usage_pct: usage_percent(usage, interval_ns, num_cores),
                },
                memory: current.memory,
                filesystem: current.filesystem.clone(),
                diskio: current.diskio.clone(),
                network: current.network.clone(),
            },
            internal_name: internal_name.clone(),
        })
    }

    /// Forget containers that are no longer running
    pub fn retain_only(&mut self, live: &HashSet<String>) {
        self.store.retain_only(live);
    }

    pub fn store(&self) -> &SampleStore {
        &self.store
    }
}

/// CPU time per wall-clock interval as a percentage of all cores, 2 decimals
pub fn usage_percent(usage_ns: u64, interval_ns: i64, num_cores: usize) -> f64 {
    let pct = (usage_ns as f64 / interval_ns as f64) / num_cores as f64 * 100.0;
    (pct * 100.0).round() / 100.0
}
