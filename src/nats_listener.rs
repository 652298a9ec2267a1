#![cfg(feature = "nats")]

use anyhow::Result;
use async_nats::Client;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::NatsConfig;
use crate::node_info::Notification;

/// Connect to NATS using the configured credentials
pub async fn connect(config: &NatsConfig) -> Result<Client> {
    let client = if let Some(ref cred) = config.credential_file {
        async_nats::ConnectOptions::with_credentials_file(std::path::PathBuf::from(cred))
            .await?
            .connect(&config.url)
            .await?
    } else if let Some(ref token) = config.token {
        async_nats::ConnectOptions::with_token(token.clone())
            .connect(&config.url)
            .await?
    } else {
        async_nats::connect(&config.url).await?
    };

    info!(url = %config.url, "NATS connected");
    Ok(client)
}

/// Subject carrying node info for this host
pub fn node_info_subject(prefix: &str, hostname: &str) -> String {
    format!("{}.{}.node_info", prefix, hostname)
}

/// Forward node info messages to the listener channel
pub fn start_node_info_forwarder(
    client: Client,
    prefix: String,
    hostname: String,
    tx: mpsc::Sender<Notification>,
) {
    let subject = node_info_subject(&prefix, &hostname);
    tokio::spawn(async move {
        let mut sub = match client.subscribe(subject.clone()).await {
            Ok(s) => s,
            Err(e) => { error!(error=%e, "Failed to subscribe to node info"); return; }
        };
        info!(subject=%subject, "Listening for node info");

        while let Some(msg) = sub.next().await {
            match serde_json::from_slice::<serde_json::Value>(&msg.payload) {
                Ok(payload) => {
                    if tx.send(Notification::node_info(payload)).await.is_err() {
                        return;
                    }
                }
                Err(e) => warn!(error=%e, subject=%subject, "Invalid node info payload"),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_is_scoped_to_host() {
        assert_eq!(node_info_subject("agent", "node-1"), "agent.node-1.node_info");
    }
}
