//! Query parameters for the analysis and simulation endpoints.

use crate::analysis::AnalysisKind;
use crate::registry::Transaction;
use crate::units::coerce_numeric;

/// Ordered query parameters for one analysis request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisParams {
    pairs: Vec<(&'static str, String)>,
}

impl AnalysisParams {
    fn push(&mut self, key: &'static str, value: impl Into<String>) {
        self.pairs.push((key, value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn pairs(&self) -> &[(&'static str, String)] {
        &self.pairs
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.pairs.iter().map(|(k, _)| *k)
    }
}

/// Map a transaction onto the analyzer's query parameters.
///
/// `intent` is only sent for intent matching; gas fields only for risk
/// detection.
pub fn build_params(
    kind: AnalysisKind,
    tx: &Transaction,
    safe_address: &str,
    intent: Option<&str>,
) -> AnalysisParams {
    let mut params = AnalysisParams::default();
    params.push("from_address", safe_address);
    params.push("to_address", tx.to.as_str());
    params.push("value", coerce_numeric(tx.value.as_deref()));
    params.push("data", tx.data_or_empty());

    if kind == AnalysisKind::RiskDetection {
        params.push("gas", coerce_numeric(tx.gas.as_deref()));
        params.push("gas_price", coerce_numeric(tx.gas_price.as_deref()));
    }

    params.push("dataDecoded", serialize_decoded(tx));

    if kind == AnalysisKind::IntentMatch {
        params.push("intent", intent.unwrap_or_default());
    }

    params
}

/// Parameters for `POST {base}/simulate`.
pub fn simulation_params(tx: &Transaction) -> AnalysisParams {
    let mut params = AnalysisParams::default();
    params.push("from_address", tx.safe.as_deref().unwrap_or_default());
    params.push("to_address", tx.to.as_str());
    params.push("value", coerce_numeric(tx.value.as_deref()));
    params.push("gas", coerce_numeric(tx.base_gas.as_deref()));
    params.push("gas_price", coerce_numeric(tx.gas_price.as_deref()));
    params.push("input", tx.data_or_empty());
    params
}

fn serialize_decoded(tx: &Transaction) -> String {
    tx.data_decoded
        .as_ref()
        .and_then(|decoded| serde_json::to_string(decoded).ok())
        .unwrap_or_default()
}
