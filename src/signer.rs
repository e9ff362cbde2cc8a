//! Co-signature requests against the signing backend.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

use crate::error::{FetchError, require_param};

#[derive(Debug, Deserialize)]
struct SignResponse {
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<String>,
}

/// Asks the backend to add its signature to a pending Safe transaction.
#[derive(Debug, Clone)]
pub struct SigningClient {
    client: Client,
    base_url: String,
    safe_app_url: String,
    network_prefix: String,
}

impl SigningClient {
    pub fn new(
        base_url: impl Into<String>,
        safe_app_url: impl Into<String>,
        network_prefix: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            safe_app_url: safe_app_url.into().trim_end_matches('/').to_string(),
            network_prefix: network_prefix.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Submit the signature request. On success returns the Safe web app
    /// URL of the safe's transaction queue.
    pub async fn request_signature(&self, safe_address: &str, tx_hash: &str) -> Result<String, FetchError> {
        let safe_address = require_param("safeAddress", safe_address)?;
        let tx_hash = require_param("txHash", tx_hash)?;

        let url = format!(
            "{}/send_safe_transaction/{}/{}",
            self.base_url,
            urlencoding::encode(safe_address),
            urlencoding::encode(tx_hash)
        );
        tracing::info!(safe = safe_address, tx_hash, "requesting co-signature");

        let response = self.client.post(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|body| body.detail)
                .or_else(|| status.canonical_reason().map(|r| format!("Failed to sign transaction: {r}")));
            tracing::warn!(%status, ?detail, "signing request rejected");
            return Err(FetchError::Status { status, detail });
        }

        let body: SignResponse = response.json().await?;
        if body.status.as_deref() != Some("success") {
            tracing::warn!(status = ?body.status, "signing backend did not confirm");
            return Err(FetchError::Rejected {
                reason: "Transaction signing failed".to_string(),
            });
        }

        tracing::info!(tx_hash, "transaction signed");
        Ok(self.queue_url(safe_address))
    }

    /// Where the operator can watch the safe's pending queue.
    pub fn queue_url(&self, safe_address: &str) -> String {
        format!(
            "{}/transactions/queue?safe={}:{}",
            self.safe_app_url, self.network_prefix, safe_address
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MissingParameter;

    fn client() -> SigningClient {
        SigningClient::new(
            "http://127.0.0.1:9/",
            "https://app.safe.global/",
            "sep",
            Duration::from_secs(1),
        )
    }

    #[test]
    fn queue_url_uses_network_prefix() {
        assert_eq!(
            client().queue_url("0xabc"),
            "https://app.safe.global/transactions/queue?safe=sep:0xabc"
        );
    }

    #[tokio::test]
    async fn missing_identifiers_fail_before_request() {
        match client().request_signature("", "0x1").await {
            Err(FetchError::MissingParameter(p)) => {
                assert_eq!(p, MissingParameter::new("safeAddress"))
            }
            other => panic!("unexpected {other:?}"),
        }
        match client().request_signature("0xabc", "").await {
            Err(FetchError::MissingParameter(p)) => assert_eq!(p, MissingParameter::new("txHash")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
