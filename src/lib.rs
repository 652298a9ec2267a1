pub mod collector;
pub mod config;
pub mod dispatcher;
pub mod node_info;
pub mod provider;
pub mod runtime;
pub mod sink;
pub mod storage;
#[cfg(feature = "nats")]
pub mod nats_listener;

/// Common types used across modules
pub mod types {
    use chrono::{DateTime, Utc};
    use serde::Serialize;
    use serde_json::Value;

    /// Event name used for every derived stats event on the internal queue
    pub const CONTAINER_STATS_EVENT: &str = "container:stats";

    /// One provider response for one container at one instant
    #[derive(Debug, Clone, PartialEq)]
    pub struct RawContainerSample {
        /// Provider aliases: `[0]` is the slice-scoped name, `[1]` the display name
        pub aliases: Vec<String>,
        pub spec: Value,
        pub timestamp: DateTime<Utc>,
        pub cpu: CpuCounters,
        pub memory: MemoryStats,
        pub filesystem: Value,
        pub diskio: Value,
        pub network: Value,
    }

    /// Cumulative CPU counters in nanoseconds
    #[derive(Debug, Clone, PartialEq, Default)]
    pub struct CpuCounters {
        pub total_usage: u64,
        pub per_cpu_usage: Option<Vec<u64>>,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
    pub struct MemoryStats {
        pub usage: u64,
        pub working_set: u64,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Serialize)]
    pub struct CpuStats {
        /// CPU time consumed during the interval, in nanoseconds
        pub usage: u64,
        /// Share of the interval spent on CPU, normalized by core count
        pub usage_pct: f64,
    }

    /// Per-container metrics derived from two consecutive samples
    #[derive(Debug, Clone, PartialEq, Serialize)]
    pub struct DerivedStatsEvent {
        pub id: String,
        pub spec: Value,
        pub cpu: CpuStats,
        pub memory: MemoryStats,
        pub filesystem: Value,
        pub diskio: Value,
        pub network: Value,
    }

    /// Envelope pushed onto the internal queue
    #[derive(Debug, Clone, PartialEq, Serialize)]
    pub struct QueueEvent {
        pub event: &'static str,
        pub data: DerivedStatsEvent,
    }

    impl QueueEvent {
        pub fn container_stats(data: DerivedStatsEvent) -> Self {
            Self { event: CONTAINER_STATS_EVENT, data }
        }
    }
}
