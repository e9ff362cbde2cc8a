//! Registry records for Safe multisig transactions.

use chrono::{DateTime, Local};
use serde::{Deserialize, Deserializer, Serialize};

use crate::units;

/// A proposed Safe transaction as returned by the transaction registry.
///
/// Numeric fields are kept as strings because the registry mixes JSON
/// numbers and strings across versions.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(default)]
    pub safe: Option<String>,
    #[serde(default)]
    pub to: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub value: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub nonce: Option<String>,
    #[serde(default)]
    pub safe_tx_hash: String,
    #[serde(default)]
    pub submission_date: Option<String>,
    #[serde(default)]
    pub data_decoded: Option<DataDecoded>,
    #[serde(default)]
    pub is_executed: bool,
    #[serde(default, deserialize_with = "string_or_number")]
    pub gas: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub gas_price: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub base_gas: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub safe_tx_gas: Option<String>,
    #[serde(default)]
    pub confirmations_required: Option<u32>,
    #[serde(default)]
    pub confirmations: Vec<serde_json::Value>,
    /// Fields this client does not interpret, kept for the raw view.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Transaction {
    /// Value in ETH, six decimals.
    pub fn eth_value(&self) -> String {
        units::format_eth(self.value.as_deref())
    }

    /// Value in wei as received (empty when absent).
    pub fn wei_value(&self) -> &str {
        self.value.as_deref().unwrap_or("")
    }

    /// Call data, or the `0x` empty-call sentinel.
    pub fn data_or_empty(&self) -> &str {
        self.data
            .as_deref()
            .filter(|d| !d.is_empty())
            .unwrap_or("0x")
    }

    /// Submission time converted to the local timezone, if parseable.
    pub fn submitted_at(&self) -> Option<DateTime<Local>> {
        let raw = self.submission_date.as_deref()?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&Local))
    }

    /// Whether this is a MultiSend batch with decoded sub-transactions.
    pub fn is_multi_send(&self) -> bool {
        self.data_decoded
            .as_ref()
            .is_some_and(|decoded| decoded.method == "multiSend")
    }

    /// Full record as pretty JSON with confirmations collapsed to a count.
    pub fn raw_summary(&self) -> String {
        let mut value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        if let Some(obj) = value.as_object_mut() {
            obj.insert(
                "confirmations".to_string(),
                serde_json::Value::from(self.confirmations.len()),
            );
        }
        serde_json::to_string_pretty(&value).unwrap_or_default()
    }
}

/// Human-readable decoding of the call data.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DataDecoded {
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub parameters: Option<Vec<serde_json::Value>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl DataDecoded {
    /// Targets of a MultiSend batch (`parameters[0].valueDecoded[].to`).
    pub fn multi_send_targets(&self) -> Option<Vec<String>> {
        let batch = self
            .parameters
            .as_ref()?
            .first()?
            .get("valueDecoded")?
            .as_array()?;
        Some(
            batch
                .iter()
                .filter_map(|tx| tx.get("to").and_then(|to| to.as_str()))
                .map(String::from)
                .collect(),
        )
    }
}

/// One page of the registry's multisig transaction listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionPage {
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    #[serde(default)]
    pub results: Vec<Transaction>,
}

/// Drop executed transactions, keeping the order of the rest.
pub fn pending_only(transactions: Vec<Transaction>) -> Vec<Transaction> {
    transactions
        .into_iter()
        .filter(|tx| !tx.is_executed)
        .collect()
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(serde_json::Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}
