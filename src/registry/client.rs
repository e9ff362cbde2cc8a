//! HTTP client for the Safe transaction registry.

use std::time::Duration;

use reqwest::Client;

use crate::error::{FetchError, require_param};
use crate::registry::models::{Transaction, TransactionPage, pending_only};

/// Read-only client for `GET {base}/multisig-transactions/...`.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    client: Client,
    base_url: String,
}

impl RegistryClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Load one multisig transaction by its Safe transaction hash.
    ///
    /// The safe address is not part of the lookup but must be present; a
    /// blank address or hash fails before any request is made.
    pub async fn fetch_transaction(
        &self,
        safe_address: &str,
        tx_hash: &str,
    ) -> Result<Transaction, FetchError> {
        require_param("safeAddress", safe_address)?;
        let tx_hash = require_param("txHash", tx_hash)?;

        let url = format!(
            "{}/multisig-transactions/{}/",
            self.base_url,
            urlencoding::encode(tx_hash)
        );
        tracing::debug!(%url, "fetching transaction");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            tracing::warn!(%status, tx_hash, "registry lookup failed");
            return Err(FetchError::Status {
                status,
                detail: None,
            });
        }

        let tx: Transaction = response.json().await?;
        tracing::info!(
            tx_hash = %tx.safe_tx_hash,
            to = %tx.to,
            eth = %tx.eth_value(),
            "loaded transaction"
        );
        Ok(tx)
    }

    /// List the safe's multisig transactions that have not been executed.
    pub async fn list_pending(&self, safe_address: &str) -> Result<Vec<Transaction>, FetchError> {
        let safe_address = require_param("safeAddress", safe_address)?;

        let url = format!(
            "{}/safes/{}/multisig-transactions/",
            self.base_url,
            urlencoding::encode(safe_address)
        );
        tracing::debug!(%url, "listing multisig transactions");

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            tracing::warn!(%status, safe_address, "registry listing failed");
            return Err(FetchError::Status {
                status,
                detail: None,
            });
        }

        let page: TransactionPage = response.json().await?;
        let total = page.results.len();
        let pending = pending_only(page.results);
        tracing::info!(
            safe_address,
            total,
            pending = pending.len(),
            "fetched multisig transactions"
        );
        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MissingParameter;

    fn client() -> RegistryClient {
        // Unroutable: any request attempt would surface as an HTTP error.
        RegistryClient::new("http://127.0.0.1:9/api/v1/", Duration::from_millis(200))
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        assert_eq!(client().base_url(), "http://127.0.0.1:9/api/v1");
    }

    #[tokio::test]
    async fn missing_hash_fails_before_request() {
        let err = client().fetch_transaction("0xsafe", "").await.unwrap_err();
        assert!(matches!(
            err,
            FetchError::MissingParameter(MissingParameter { name: "txHash" })
        ));
    }

    #[tokio::test]
    async fn missing_safe_fails_before_request() {
        let err = client().fetch_transaction(" ", "0xabc").await.unwrap_err();
        assert!(matches!(
            err,
            FetchError::MissingParameter(MissingParameter {
                name: "safeAddress"
            })
        ));
    }

    #[tokio::test]
    async fn blank_safe_is_rejected_for_listing() {
        let err = client().list_pending("").await.unwrap_err();
        assert!(matches!(err, FetchError::MissingParameter(_)));
    }
}
