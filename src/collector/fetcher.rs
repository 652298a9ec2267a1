use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::provider::{parse_container_document, StatsProvider};
use crate::types::RawContainerSample;

/// Why a container's stats could not be fetched
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("provider unreachable after {attempts} attempts: {cause:#}")]
    Transport { attempts: u32, cause: anyhow::Error },

    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed provider payload: {0:#}")]
    Malformed(anyhow::Error),
}

/// Fetches raw per-container samples with a bounded retry on transport errors
pub struct StatsFetcher {
    provider: Arc<dyn StatsProvider>,
    max_attempts: u32,
}

impl StatsFetcher {
    pub fn new(provider: Arc<dyn StatsProvider>, max_attempts: u32) -> Self {
        Self { provider, max_attempts: max_attempts.max(1) }
    }

    /// Fetch the newest sample, or `None` if it is not available this time
    pub async fn fetch(&self, container_id: &str) -> Option<RawContainerSample> {
        match self.try_fetch(container_id).await {
            Ok(sample) => Some(sample),
            Err(e @ FetchError::Malformed(_)) => {
                debug!(container = container_id, error = %e, "discarding stats");
                None
            }
            Err(e) => {
                error!(container = container_id, error = %e, "failed to fetch container stats");
                None
            }
        }
    }

    pub async fn try_fetch(&self, container_id: &str) -> Result<RawContainerSample, FetchError> {
        let mut attempt = 0;
        let response = loop {
            attempt += 1;
            match self.provider.container_stats(container_id).await {
                Ok(resp) => break resp,
                Err(e) if attempt < self.max_attempts => {
                    warn!(container = container_id, attempt, error = %e, "stats request failed, retrying");
                }
                Err(e) => {
                    return Err(FetchError::Transport { attempts: attempt, cause: e });
                }
            }
        };

        if !response.is_success() {
            return Err(FetchError::Status { status: response.status, body: response.body });
        }

        parse_container_document(&response.body).map_err(FetchError::Malformed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderResponse;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays scripted responses; `None` is a transport failure
    struct Scripted {
        responses: Mutex<VecDeque<Option<ProviderResponse>>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(responses: Vec<Option<ProviderResponse>>) -> Arc<Self> {
            Arc::new(Self { responses: Mutex::new(responses.into()), calls: Mutex::new(0) })
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl StatsProvider for Scripted {
        async fn container_stats(&self, _id: &str) -> anyhow::Result<ProviderResponse> {
            *self.calls.lock().unwrap() += 1;
            match self.responses.lock().unwrap().pop_front().flatten() {
                Some(resp) => Ok(resp),
                None => Err(anyhow::anyhow!("connection refused")),
            }
        }
    }

    fn ok(body: &str) -> Option<ProviderResponse> {
        Some(ProviderResponse { status: 200, body: body.to_string() })
    }

    const DOC: &str = r#"{"/docker/abc": {"aliases": ["k8s-abc", "web"], "stats": [
        {"timestamp": "2020-01-01T00:00:00Z", "cpu": {"usage": {"total": 42}}, "memory": {"usage": 7}}
    ]}}"#;

    #[tokio::test]
    async fn success_returns_sample() {
        let provider = Scripted::new(vec![ok(DOC)]);
        let fetcher = StatsFetcher::new(provider.clone(), 3);
        let sample = fetcher.fetch("abc").await.unwrap();
        assert_eq!(sample.cpu.total_usage, 42);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn transport_errors_are_retried() {
        let provider = Scripted::new(vec![None, None, ok(DOC)]);
        let fetcher = StatsFetcher::new(provider.clone(), 3);
        assert!(fetcher.fetch("abc").await.is_some());
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn three_transport_errors_exhaust_retries() {
        let provider = Scripted::new(vec![None, None, None, ok(DOC)]);
        let fetcher = StatsFetcher::new(provider.clone(), 3);
        let err = fetcher.try_fetch("abc").await.unwrap_err();
        assert!(matches!(err, FetchError::Transport { attempts: 3, .. }));
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn error_status_is_not_retried() {
        let provider = Scripted::new(vec![
            Some(ProviderResponse { status: 500, body: "boom".into() }),
            ok(DOC),
        ]);
        let fetcher = StatsFetcher::new(provider.clone(), 3);
        let err = fetcher.try_fetch("abc").await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 500, .. }));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn malformed_body_is_not_available() {
        let provider = Scripted::new(vec![ok("{\"truncated\": ")]);
        let fetcher = StatsFetcher::new(provider.clone(), 3);
        assert!(matches!(fetcher.try_fetch("abc").await, Err(FetchError::Malformed(_))));
        assert_eq!(provider.calls(), 1);
    }
}
