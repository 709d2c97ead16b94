// src/services/analysis_client.rs
use crate::errors::TransportError;
use crate::models::{AnalysisSnapshot, AnalysisState, EncodedPayload};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// The remote service that turns a photo into a palette description.
#[async_trait]
pub trait InferenceService: Send + Sync {
    async fn analyze(&self, payload: &EncodedPayload) -> Result<String, TransportError>;
}

pub struct HttpInferenceService {
    endpoint: String,
    client: Client,
}

impl HttpInferenceService {
    pub fn new(api_base: &str, client: Client) -> Self {
        Self {
            endpoint: format!("{}/processing", api_base.trim_end_matches('/')),
            client,
        }
    }
}

#[async_trait]
impl InferenceService for HttpInferenceService {
    async fn analyze(&self, payload: &EncodedPayload) -> Result<String, TransportError> {
        let start = Instant::now();

        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({
                "image": payload.body(),
                "media_type": payload.media_type().as_mime(),
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Processing endpoint returned {}: {}", status, body);
            return Err(TransportError::Status {
                status: status.as_u16(),
            });
        }

        let result: serde_json::Value = response
            .json()
            .await
            .map_err(|e| TransportError::Malformed(e.to_string()))?;

        let text = result["text"]
            .as_str()
            .ok_or_else(|| TransportError::Malformed("no `text` in response".to_string()))?;

        debug!(
            "Analysis response received in {}ms",
            start.elapsed().as_millis()
        );
        Ok(text.to_string())
    }
}

/// Drives submissions and owns the analysis state machine.
///
/// Every submission is numbered; only the outcome of the latest one is
/// applied, so a slow response to a superseded image can't overwrite a
/// newer result.
pub struct AnalysisClient {
    service: Arc<dyn InferenceService>,
    state: watch::Sender<AnalysisSnapshot>,
}

impl AnalysisClient {
    pub fn new(service: Arc<dyn InferenceService>) -> Self {
        let (state, _) = watch::channel(AnalysisSnapshot::default());
        Self { service, state }
    }

    pub fn snapshot(&self) -> AnalysisSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AnalysisSnapshot> {
        self.state.subscribe()
    }

    /// Enters `Submitting` for a new submission and returns its number.
    pub fn begin(&self) -> u64 {
        let mut sequence = 0;
        self.state.send_modify(|snapshot| {
            snapshot.sequence += 1;
            snapshot.state = AnalysisState::Submitting;
            sequence = snapshot.sequence;
        });
        sequence
    }

    /// Applies the outcome of submission `sequence`. Returns `false` if the
    /// submission has been superseded and the outcome was dropped.
    pub fn resolve(&self, sequence: u64, outcome: Result<String, TransportError>) -> bool {
        self.state.send_if_modified(|snapshot| {
            if snapshot.sequence != sequence || snapshot.state != AnalysisState::Submitting {
                debug!(
                    "Dropping outcome of submission {} (current is {})",
                    sequence, snapshot.sequence
                );
                return false;
            }

            snapshot.state = match outcome {
                Ok(text) => {
                    info!("Submission {} succeeded", sequence);
                    AnalysisState::Succeeded(text)
                }
                Err(e) => {
                    error!("Submission {} failed: {}", sequence, e);
                    AnalysisState::Failed(e.to_string())
                }
            };
            true
        })
    }

    /// Submits and waits for the outcome.
    #[cfg(test)]
    pub async fn submit(&self, payload: &EncodedPayload) -> AnalysisSnapshot {
        let sequence = self.begin();
        let outcome = self.service.analyze(payload).await;
        self.resolve(sequence, outcome);
        self.snapshot()
    }

    /// Starts a submission on the runtime and returns its number right away.
    pub fn submit_in_background(self: &Arc<Self>, payload: EncodedPayload) -> u64 {
        let sequence = self.begin();
        let client = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = client.service.analyze(&payload).await;
            client.resolve(sequence, outcome);
        });
        sequence
    }

    /// Waits until the current submission leaves `Submitting` or `timeout`
    /// elapses, and returns whatever state holds then.
    pub async fn wait_settled(&self, timeout: Duration) -> AnalysisSnapshot {
        let mut rx = self.subscribe();
        let settled = rx.wait_for(|snapshot| snapshot.state != AnalysisState::Submitting);
        match tokio::time::timeout(timeout, settled).await {
            Ok(Ok(snapshot)) => snapshot.clone(),
            _ => self.snapshot(),
        }
    }
}
