use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::{debug, error, info};

use container_stats_agent::collector::{CollectionScheduler, SchedulerSettings, StatsFetcher};
use container_stats_agent::config::{self, Config};
use container_stats_agent::dispatcher::MetricsDispatcher;
use container_stats_agent::node_info::{NodeInfoListener, Notification, SharedState};
use container_stats_agent::provider::HttpStatsProvider;
use container_stats_agent::runtime::DockerRuntime;
use container_stats_agent::sink;

#[derive(Parser, Debug)]
#[command(name = "container-stats-agent", about = "Per-container resource stats collector")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/container-stats-agent/config.toml")]
    config: String,

    /// Validate config and exit
    #[arg(long)]
    check: bool,

    /// Print version and exit
    #[arg(short, long)]
    version: bool,
}

#[tokio::main(worker_threads = 2)]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("container-stats-agent {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // Load configuration
    let config = Config::load(&cli.config)?;

    if cli.check {
        println!("Configuration is valid.");
        return Ok(());
    }

    // Initialize logging
    init_logging(&config)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        hostname = %config.agent.hostname,
        provider = %config.provider.url,
        "Starting container stats agent"
    );

    if let Err(e) = run(config).await {
        error!(error = %e, "Agent terminated with error");
        return Err(e);
    }

    Ok(())
}

fn init_logging(config: &config::Config) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new(&config.agent.log_level)
        });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    Ok(())
}

async fn run(config: Config) -> Result<()> {
    let state = SharedState::new();

    // Node info listener
    let (notify_tx, notify_rx) = tokio::sync::mpsc::channel::<Notification>(16);
    let listener = NodeInfoListener::new(state.clone(), sink::statsd_factory());
    tokio::spawn(listener.run(notify_rx));

    if let Some(ref node) = config.node {
        notify_tx.send(Notification::node_info(node.to_node_info())).await?;
    }

    #[cfg(feature = "nats")]
    {
        if config.nats.enabled {
            let client = container_stats_agent::nats_listener::connect(&config.nats).await?;
            container_stats_agent::nats_listener::start_node_info_forwarder(
                client,
                config.nats.subject_prefix.clone(),
                config.agent.hostname.clone(),
                notify_tx.clone(),
            );
        }
    }

    // Internal queue; the agent's consumer is not part of this binary
    let (queue_tx, mut queue_rx) = tokio::sync::mpsc::unbounded_channel::<container_stats_agent::types::QueueEvent>();
    tokio::spawn(async move {
        while let Some(event) = queue_rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => debug!(event = event.event, payload = %json, "queued stats"),
                Err(e) => error!(error = %e, "Failed to serialize stats event"),
            }
        }
    });

    let provider = Arc::new(HttpStatsProvider::new(&config.provider)?);
    let fetcher = StatsFetcher::new(provider, config.provider.max_attempts);
    let runtime = Arc::new(DockerRuntime::new(&config.runtime));
    let scheduler = CollectionScheduler::new(
        SchedulerSettings::new(&config.collector, &config.runtime),
        runtime,
        fetcher,
        MetricsDispatcher::new(queue_tx, state),
    );
    tokio::spawn(scheduler.run());

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal, exiting");
    drop(notify_tx);

    Ok(())
}
