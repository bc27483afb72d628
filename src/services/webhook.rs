//! Best-effort webhook delivery with bounded retry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::models::job::JobStatusView;

pub const MAX_ATTEMPTS: u32 = 3;

/// Delay before attempt N+1 is `retry_delays[N-1]`.
pub const DEFAULT_RETRY_DELAYS: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(5),
    Duration::from_secs(10),
];

/// Sends a JSON payload and reports the HTTP status.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn post_json(&self, url: &str, payload: &serde_json::Value)
        -> Result<u16, WebhookError>;
}

/// `reqwest`-backed transport.
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, WebhookError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("region-redact/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl WebhookTransport for HttpTransport {
    async fn post_json(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> Result<u16, WebhookError> {
        let response = self.http.post(url).json(payload).send().await?;
        Ok(response.status().as_u16())
    }
}

/// Body POSTed when a job reaches a terminal state.
#[derive(Debug, Serialize)]
pub struct JobCompletedEvent<'a> {
    pub event: &'static str,
    #[serde(flatten)]
    pub job: &'a JobStatusView,
}

impl<'a> JobCompletedEvent<'a> {
    pub fn new(job: &'a JobStatusView) -> Self {
        Self {
            event: "job.completed",
            job,
        }
    }
}

/// Outcome of a delivery run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered { attempts: u32 },
    GaveUp { attempts: u32 },
    Cancelled { attempts: u32 },
}

pub struct WebhookNotifier {
    transport: Arc<dyn WebhookTransport>,
    retry_delays: Vec<Duration>,
    shutdown: CancellationToken,
}

impl WebhookNotifier {
    pub fn new(transport: Arc<dyn WebhookTransport>, shutdown: CancellationToken) -> Self {
        Self {
            transport,
            retry_delays: DEFAULT_RETRY_DELAYS.to_vec(),
            shutdown,
        }
    }

    pub fn with_retry_delays(mut self, delays: Vec<Duration>) -> Self {
        self.retry_delays = delays;
        self
    }

    /// Try up to `MAX_ATTEMPTS` times. Failures are logged, never returned.
    pub async fn deliver(&self, url: &str, payload: &serde_json::Value) -> Delivery {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let outcome = tokio::select! {
                _ = self.shutdown.cancelled() => return Delivery::Cancelled { attempts: attempt - 1 },
                outcome = self.transport.post_json(url, payload) => outcome,
            };

            match outcome {
                Ok(status) if (200..300).contains(&status) => {
                    tracing::info!(url, attempt, status, "Webhook delivered");
                    metrics::counter!("webhook_deliveries_total", "outcome" => "delivered")
                        .increment(1);
                    return Delivery::Delivered { attempts: attempt };
                }
                Ok(status) => {
                    tracing::warn!(url, attempt, status, "Webhook rejected");
                }
                Err(e) => {
                    tracing::warn!(url, attempt, error = %e, "Webhook request failed");
                }
            }

            if attempt >= MAX_ATTEMPTS {
                tracing::warn!(url, attempts = attempt, "Giving up on webhook delivery");
                metrics::counter!("webhook_deliveries_total", "outcome" => "gave_up").increment(1);
                return Delivery::GaveUp { attempts: attempt };
            }

            let delay = self
                .retry_delays
                .get(attempt as usize - 1)
                .or(self.retry_delays.last())
                .copied()
                .unwrap_or_default();

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!(url, attempts = attempt, "Webhook retry cancelled by shutdown");
                    return Delivery::Cancelled { attempts: attempt };
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Replays scripted statuses and records when each call happened.
    struct ScriptedTransport {
        statuses: Mutex<Vec<u16>>,
        calls: Mutex<Vec<Instant>>,
    }

    impl ScriptedTransport {
        fn new(mut statuses: Vec<u16>) -> Arc<Self> {
            statuses.reverse();
            Arc::new(Self {
                statuses: Mutex::new(statuses),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl WebhookTransport for ScriptedTransport {
        async fn post_json(
            &self,
            _url: &str,
            _payload: &serde_json::Value,
        ) -> Result<u16, WebhookError> {
            self.calls.lock().unwrap().push(Instant::now());
            Ok(self.statuses.lock().unwrap().pop().unwrap_or(500))
        }
    }

    fn payload() -> serde_json::Value {
        serde_json::json!({ "event": "job.completed" })
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_with_fixed_backoff() {
        let transport = ScriptedTransport::new(vec![500, 500, 200]);
        let notifier = WebhookNotifier::new(transport.clone(), CancellationToken::new());

        let outcome = notifier.deliver("http://hook", &payload()).await;
        assert_eq!(outcome, Delivery::Delivered { attempts: 3 });

        let calls = transport.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1] - calls[0], Duration::from_secs(1));
        assert_eq!(calls[2] - calls[1], Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_three_attempts() {
        let transport = ScriptedTransport::new(vec![500, 502, 503, 200]);
        let notifier = WebhookNotifier::new(transport.clone(), CancellationToken::new());

        let outcome = notifier.deliver("http://hook", &payload()).await;
        assert_eq!(outcome, Delivery::GaveUp { attempts: 3 });
        assert_eq!(transport.calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_success_stops() {
        let transport = ScriptedTransport::new(vec![204]);
        let notifier = WebhookNotifier::new(transport.clone(), CancellationToken::new());

        let outcome = notifier.deliver("http://hook", &payload()).await;
        assert_eq!(outcome, Delivery::Delivered { attempts: 1 });
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_pending_retry() {
        let transport = ScriptedTransport::new(vec![500, 200]);
        let shutdown = CancellationToken::new();
        let notifier = WebhookNotifier::new(transport.clone(), shutdown.clone());

        let handle = tokio::spawn(async move { notifier.deliver("http://hook", &payload()).await });
        tokio::time::sleep(Duration::from_millis(500)).await;
        shutdown.cancel();

        assert_eq!(handle.await.unwrap(), Delivery::Cancelled { attempts: 1 });
        assert_eq!(transport.calls().len(), 1);
    }
}
