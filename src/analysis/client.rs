//! HTTP client for the analyzer service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};

use crate::analysis::request::{AnalysisParams, simulation_params};
use crate::analysis::stream::{EventStream, decode_event_stream};
use crate::analysis::AnalysisKind;
use crate::error::AnalysisError;
use crate::registry::Transaction;

/// Source of analysis event streams.
///
/// Sessions only talk to this trait, so they can be driven by a scripted
/// backend in tests.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// Issue one analysis request and return its decoded event stream.
    ///
    /// Errors here happen before any event is read.
    async fn open_stream(
        &self,
        kind: AnalysisKind,
        params: &AnalysisParams,
    ) -> Result<EventStream, AnalysisError>;
}

/// Analyzer client: streamed checks plus the one-shot simulation.
#[derive(Debug, Clone)]
pub struct AnalysisClient {
    client: Client,
    base_url: String,
    request_timeout: Duration,
}

impl AnalysisClient {
    /// `request_timeout` bounds one-shot calls; streams are only bounded by
    /// the connect timeout so long analyses are not cut off.
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .connect_timeout(request_timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            request_timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Run the transaction through the simulator and return its raw result.
    pub async fn simulate(&self, tx: &Transaction) -> Result<serde_json::Value, AnalysisError> {
        let url = format!("{}/simulate", self.base_url);
        let params = simulation_params(tx);
        tracing::debug!(%url, tx_hash = %tx.safe_tx_hash, "requesting simulation");

        let response = self
            .client
            .post(&url)
            .query(params.pairs())
            .header("Accept", "application/json")
            .timeout(self.request_timeout)
            .send()
            .await?;
        let response = check_status(response, "Simulation").await?;

        let result: serde_json::Value = response.json().await?;
        tracing::info!(tx_hash = %tx.safe_tx_hash, "simulation finished");
        Ok(result)
    }
}

#[async_trait]
impl AnalysisBackend for AnalysisClient {
    async fn open_stream(
        &self,
        kind: AnalysisKind,
        params: &AnalysisParams,
    ) -> Result<EventStream, AnalysisError> {
        let url = format!("{}/{}", self.base_url, kind.path());
        tracing::info!(%url, %kind, "opening analysis stream");

        let response = self
            .client
            .post(&url)
            .query(params.pairs())
            .header("Accept", "application/json")
            .send()
            .await?;
        let response = check_status(response, kind.failure_label()).await?;

        Ok(decode_event_stream(response.bytes_stream()))
    }
}

/// Turn a non-success response into `AnalysisError::Status`, keeping a JSON
/// error body when the server sent one.
async fn check_status(response: Response, label: &'static str) -> Result<Response, AnalysisError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let status_text = status.canonical_reason().unwrap_or("").to_string();
    let body = response.json::<serde_json::Value>().await.ok();
    tracing::warn!(%status, label, body = ?body, "analyzer request rejected");

    Err(AnalysisError::Status {
        label,
        status,
        status_text,
        body,
    })
}
