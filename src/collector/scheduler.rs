use anyhow::{Context, Result};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info};

use super::{RateComputer, StatsFetcher};
use crate::config::{CollectorConfig, RuntimeConfig};
use crate::dispatcher::MetricsDispatcher;
use crate::runtime::ContainerRuntime;

/// Timing and gating parameters of the collection loop
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Container whose running state means the provider is up
    pub gating_container: String,
    pub readiness_poll: Duration,
    /// Minimum time between the starts of two cycles
    pub interval: Duration,
    /// Pause between two containers of one cycle
    pub container_pause: Duration,
}

impl SchedulerSettings {
    pub fn new(collector: &CollectorConfig, runtime: &RuntimeConfig) -> Self {
        Self {
            gating_container: runtime.gating_container.clone(),
            readiness_poll: collector.readiness_poll(),
            interval: collector.interval(),
            container_pause: collector.container_pause(),
        }
    }
}

/// Periodic Fetch -> Derive -> Dispatch over all running containers
pub struct CollectionScheduler {
    settings: SchedulerSettings,
    runtime: Arc<dyn ContainerRuntime>,
    fetcher: StatsFetcher,
    rates: RateComputer,
    dispatcher: MetricsDispatcher,
}

impl CollectionScheduler {
    pub fn new(
        settings: SchedulerSettings,
        runtime: Arc<dyn ContainerRuntime>,
        fetcher: StatsFetcher,
        dispatcher: MetricsDispatcher,
    ) -> Self {
        Self {
            settings,
            runtime,
            fetcher,
            rates: RateComputer::new(),
            dispatcher,
        }
    }

    /// Number of containers with retained sample history
    pub fn tracked_containers(&self) -> usize {
        self.rates.store().containers()
    }

    /// Wait for the provider, then collect forever
    pub async fn run(mut self) {
        self.wait_for_provider().await;
        info!(interval_secs = self.settings.interval.as_secs(), "starting stats loop");

        loop {
            let started = Instant::now();
            if let Err(e) = self.run_cycle().await {
                error!(error = ?e, "error on stats fetching");
            }
            tokio::time::sleep_until(started + self.settings.interval).await;
        }
    }

    /// Poll until the gating container reports running
    pub async fn wait_for_provider(&self) {
        debug!(container = %self.settings.gating_container, "waiting for stats provider");
        loop {
            match self.runtime.is_running(&self.settings.gating_container).await {
                Ok(true) => break,
                Ok(false) => {}
                Err(e) => debug!(error = %e, "provider readiness check failed"),
            }
            tokio::time::sleep(self.settings.readiness_poll).await;
        }
        debug!("stats provider is running");
    }

    /// Collect once from every running container.
    ///
    /// Per-container failures are logged and skipped; only a failed
    /// enumeration is returned as an error.
    pub async fn run_cycle(&mut self) -> Result<()> {
        debug!("starting collection");
        let containers = self
            .runtime
            .list_containers()
            .await
            .context("Failed to enumerate containers")?;

        let running: Vec<String> = containers
            .into_iter()
            .filter(|c| c.running)
            .map(|c| c.id)
            .collect();
        let live: HashSet<String> = running.iter().cloned().collect();
        self.rates.retain_only(&live);

        let mut emitted = 0usize;
        for (idx, id) in running.iter().enumerate() {
            if idx > 0 {
                tokio::time::sleep(self.settings.container_pause).await;
            }

            let Some(sample) = self.fetcher.fetch(id).await else {
                continue;
            };
            match self.rates.derive(id, sample) {
                Some(derived) => {
                    self.dispatcher.dispatch(derived).await;
                    emitted += 1;
                }
                None => debug!(container = %id, "no stats derived"),
            }
        }

        debug!(containers = running.len(), emitted, "collection finished");
        Ok(())
    }
}
