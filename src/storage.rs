use std::collections::{HashMap, HashSet};

use crate::types::RawContainerSample;

/// Samples kept per container
pub const SAMPLES_PER_CONTAINER: usize = 2;

/// Per-container history of the most recent raw samples.
///
/// Owned by the collection loop only, so it needs no locking.
#[derive(Debug, Default)]
pub struct SampleStore {
    buffers: HashMap<String, RingBuffer<RawContainerSample>>,
}

/// Fixed-capacity buffer that overwrites its oldest entry when full
#[derive(Debug)]
struct RingBuffer<T> {
    data: Vec<T>,
    head: usize,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    fn new(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            head: 0,
            capacity,
        }
    }

    fn push(&mut self, item: T) {
        if self.data.len() < self.capacity {
            self.data.push(item);
        } else {
            self.data[self.head] = item;
            self.head = (self.head + 1) % self.capacity;
        }
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    /// Entry `i` in arrival order, 0 being the oldest retained
    fn get(&self, i: usize) -> Option<&T> {
        if i >= self.data.len() {
            return None;
        }
        Some(&self.data[(self.head + i) % self.data.len()])
    }
}

impl SampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sample, evicting the oldest one beyond the retained pair
    pub fn push(&mut self, container_id: &str, sample: RawContainerSample) {
        self.buffers
            .entry(container_id.to_string())
            .or_insert_with(|| RingBuffer::new(SAMPLES_PER_CONTAINER))
            .push(sample);
    }

    /// `(previous, current)` once two samples exist for the container
    pub fn pair(&self, container_id: &str) -> Option<(&RawContainerSample, &RawContainerSample)> {
        let buf = self.buffers.get(container_id)?;
        if buf.len() < SAMPLES_PER_CONTAINER {
            return None;
        }
        Some((buf.get(0)?, buf.get(1)?))
    }

    pub fn len(&self, container_id: &str) -> usize {
        self.buffers.get(container_id).map_or(0, RingBuffer::len)
    }

    pub fn containers(&self) -> usize {
        self.buffers.len()
    }

    /// Drop history of containers not in `live`
    pub fn retain_only(&mut self, live: &HashSet<String>) {
        self.buffers.retain(|id, _| live.contains(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CpuCounters, MemoryStats};
    use chrono::{TimeZone, Utc};
    use serde_json::Value;

    fn sample(total: u64) -> RawContainerSample {
        RawContainerSample {
            aliases: vec!["a".into(), "b".into()],
            spec: Value::Null,
            timestamp: Utc.timestamp_opt(total as i64, 0).unwrap(),
            cpu: CpuCounters { total_usage: total, per_cpu_usage: None },
            memory: MemoryStats::default(),
            filesystem: Value::Null,
            diskio: Value::Null,
            network: Value::Null,
        }
    }

    #[test]
    fn pair_needs_two_samples() {
        let mut store = SampleStore::new();
        store.push("c1", sample(1));
        assert!(store.pair("c1").is_none());
        assert!(store.pair("unknown").is_none());

        store.push("c1", sample(2));
        let (prev, cur) = store.pair("c1").unwrap();
        assert_eq!(prev.cpu.total_usage, 1);
        assert_eq!(cur.cpu.total_usage, 2);
    }

    #[test]
    fn newest_sample_evicts_oldest() {
        let mut store = SampleStore::new();
        for total in 1..=5 {
            store.push("c1", sample(total));
        }
        assert_eq!(store.len("c1"), 2);
        let (prev, cur) = store.pair("c1").unwrap();
        assert_eq!((prev.cpu.total_usage, cur.cpu.total_usage), (4, 5));
    }

    #[test]
    fn containers_are_tracked_independently() {
        let mut store = SampleStore::new();
        store.push("c1", sample(1));
        store.push("c2", sample(10));
        store.push("c1", sample(2));
        assert!(store.pair("c1").is_some());
        assert!(store.pair("c2").is_none());
    }

    #[test]
    fn retain_only_forgets_gone_containers() {
        let mut store = SampleStore::new();
        store.push("c1", sample(1));
        store.push("c2", sample(1));
        store.retain_only(&HashSet::from(["c2".to_string()]));
        assert_eq!(store.containers(), 1);
        assert_eq!(store.len("c1"), 0);
        assert_eq!(store.len("c2"), 1);
    }
}
