//! Contract metadata lookups against an Etherscan-compatible API.
//!
//! Used to tell the operator what a transaction talks to: a verified
//! contract (with its ABI), an unverified contract, or a plain account.

use std::time::Duration;

use futures::future::try_join_all;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::error::{MetadataError, require_param};
use crate::registry::Transaction;

/// What Etherscan reports when it has no source for a contract.
const UNVERIFIED_ABI: &str = "Contract source code not verified";

/// Classification of one address.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AddressInfo {
    VerifiedContract {
        address: String,
        name: String,
        abi: serde_json::Value,
        /// Implementation address when the contract is a proxy.
        implementation: Option<String>,
        proxy: bool,
    },
    UnverifiedContract {
        address: String,
    },
    ExternallyOwned {
        address: String,
    },
}

impl AddressInfo {
    pub fn address(&self) -> &str {
        match self {
            Self::VerifiedContract { address, .. }
            | Self::UnverifiedContract { address }
            | Self::ExternallyOwned { address } => address,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::VerifiedContract { proxy: true, .. } => "Verified Smart Contract (Proxy)",
            Self::VerifiedContract { .. } => "Verified Smart Contract",
            Self::UnverifiedContract { .. } => "Unverified Smart Contract",
            Self::ExternallyOwned { .. } => "Externally Owned Account (EOA)",
        }
    }
}

/// Metadata for a whole transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "contracts", rename_all = "snake_case")]
pub enum ContractInfo {
    Single(AddressInfo),
    /// One entry per batched call, in batch order.
    MultiSend(Vec<AddressInfo>),
}

#[derive(Debug, Clone)]
pub struct ContractMetadataClient {
    client: Client,
    api_url: String,
    api_key: Option<SecretString>,
}

impl ContractMetadataClient {
    pub fn new(api_url: impl Into<String>, api_key: Option<SecretString>, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            api_url: api_url.into(),
            api_key,
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Classify a single address.
    pub async fn identify_address(&self, address: &str) -> Result<AddressInfo, MetadataError> {
        let address = require_param("address", address)?;

        let mut query = vec![
            ("module", "contract"),
            ("action", "getsourcecode"),
            ("address", address),
        ];
        if let Some(key) = &self.api_key {
            query.push(("apikey", key.expose_secret()));
        }

        tracing::debug!(address, "looking up contract source");
        let body: serde_json::Value = self
            .client
            .get(&self.api_url)
            .query(&query)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        classify(address, &body)
    }

    /// Classify the transaction's target, or every target of a multiSend
    /// batch. Batch lookups run concurrently; the first failure wins.
    pub async fn identify_transaction(&self, tx: &Transaction) -> Result<ContractInfo, MetadataError> {
        match tx.data_decoded.as_ref().filter(|_| tx.is_multi_send()) {
            Some(decoded) => {
                let targets = decoded
                    .multi_send_targets()
                    .ok_or(MetadataError::MalformedMultiSend)?;
                tracing::debug!(count = targets.len(), "identifying multiSend targets");
                let infos =
                    try_join_all(targets.iter().map(|to| self.identify_address(to))).await?;
                Ok(ContractInfo::MultiSend(infos))
            }
            None => Ok(ContractInfo::Single(self.identify_address(&tx.to).await?)),
        }
    }
}

fn classify(address: &str, body: &serde_json::Value) -> Result<AddressInfo, MetadataError> {
    let address = address.to_string();
    if body.get("status").and_then(|s| s.as_str()) != Some("1") {
        return Ok(AddressInfo::ExternallyOwned { address });
    }

    let Some(source) = body
        .get("result")
        .and_then(|r| r.as_array())
        .and_then(|r| r.first())
    else {
        return Ok(AddressInfo::ExternallyOwned { address });
    };

    let field = |key: &str| source.get(key).and_then(|v| v.as_str()).unwrap_or_default();

    let abi_text = field("ABI");
    if abi_text == UNVERIFIED_ABI {
        return Ok(AddressInfo::UnverifiedContract { address });
    }

    let abi = serde_json::from_str(abi_text).map_err(|e| MetadataError::InvalidAbi {
        address: address.clone(),
        reason: e.to_string(),
    })?;
    let implementation = Some(field("Implementation"))
        .filter(|s| !s.is_empty())
        .map(String::from);

    Ok(AddressInfo::VerifiedContract {
        name: field("ContractName").to_string(),
        abi,
        implementation,
        proxy: field("Proxy") == "1",
        address,
    })
}
