//! Navigation between the views of one review.
//!
//! The flow is linear: pick a transaction, check its risk, match it against
//! the operator's intent, then request the co-signature. Each view after the
//! list is addressed by the safe address and the Safe transaction hash.

use std::fmt;

use url::Url;

use crate::error::{MissingParameter, RouteError, require_param};

/// A view together with the identifiers it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Landing,
    Transactions,
    RiskDetector { safe: String, tx: String },
    IntentMatcher { safe: String, tx: String },
    SignTransaction { safe: String, tx: String },
}

impl Route {
    /// Risk detector view for the transaction picked from the list.
    pub fn review(safe: &str, tx: &str) -> Result<Self, MissingParameter> {
        Ok(Self::RiskDetector {
            safe: require_param("safeAddress", safe)?.to_string(),
            tx: require_param("txHash", tx)?.to_string(),
        })
    }

    pub fn path(&self) -> &'static str {
        match self {
            Self::Landing => "/",
            Self::Transactions => "/transactions",
            Self::RiskDetector { .. } => "/risk-detector",
            Self::IntentMatcher { .. } => "/intent-matcher",
            Self::SignTransaction { .. } => "/sign-transaction",
        }
    }

    /// Path with the identifiers URL-encoded into the query string.
    pub fn to_path(&self) -> String {
        match self.target() {
            Some((safe, tx)) => format!(
                "{}?safeAddress={}&txHash={}",
                self.path(),
                urlencoding::encode(safe),
                urlencoding::encode(tx)
            ),
            None => self.path().to_string(),
        }
    }

    /// Parse a path produced by [`Route::to_path`].
    pub fn parse(path: &str) -> Result<Self, RouteError> {
        let base = Url::parse("sentinel://app/").map_err(|e| RouteError::UnknownPath(e.to_string()))?;
        let url = base
            .join(path.trim())
            .map_err(|_| RouteError::UnknownPath(path.to_string()))?;

        let mut safe = String::new();
        let mut tx = String::new();
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "safeAddress" => safe = value.into_owned(),
                "txHash" => tx = value.into_owned(),
                _ => {}
            }
        }

        let path = url.path().trim_end_matches('/');
        let route = match path {
            "" => Self::Landing,
            "/transactions" => Self::Transactions,
            "/risk-detector" | "/intent-matcher" | "/sign-transaction" => {
                let safe = require_param("safeAddress", &safe)?.to_string();
                let tx = require_param("txHash", &tx)?.to_string();
                match path {
                    "/risk-detector" => Self::RiskDetector { safe, tx },
                    "/intent-matcher" => Self::IntentMatcher { safe, tx },
                    _ => Self::SignTransaction { safe, tx },
                }
            }
            other => return Err(RouteError::UnknownPath(other.to_string())),
        };
        Ok(route)
    }

    /// Safe address and transaction hash, for views that review one tx.
    pub fn target(&self) -> Option<(&str, &str)> {
        match self {
            Self::RiskDetector { safe, tx }
            | Self::IntentMatcher { safe, tx }
            | Self::SignTransaction { safe, tx } => Some((safe, tx)),
            Self::Landing | Self::Transactions => None,
        }
    }

    /// The view a "back" action returns to.
    pub fn back(&self) -> Route {
        match self {
            Self::Landing | Self::Transactions => Self::Landing,
            Self::RiskDetector { .. } => Self::Transactions,
            Self::IntentMatcher { safe, tx } => Self::RiskDetector {
                safe: safe.clone(),
                tx: tx.clone(),
            },
            Self::SignTransaction { safe, tx } => Self::IntentMatcher {
                safe: safe.clone(),
                tx: tx.clone(),
            },
        }
    }

    /// The view a "next" action moves to.
    ///
    /// `None` from the list, which needs a selection first.
    pub fn next(&self) -> Option<Route> {
        match self {
            Self::Landing => Some(Self::Transactions),
            Self::Transactions => None,
            Self::RiskDetector { safe, tx } => Some(Self::IntentMatcher {
                safe: safe.clone(),
                tx: tx.clone(),
            }),
            Self::IntentMatcher { safe, tx } => Some(Self::SignTransaction {
                safe: safe.clone(),
                tx: tx.clone(),
            }),
            Self::SignTransaction { .. } => Some(Self::Landing),
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::Landing => "Home",
            Self::Transactions => "Pending transactions",
            Self::RiskDetector { .. } => "Risk detector",
            Self::IntentMatcher { .. } => "Intent matcher",
            Self::SignTransaction { .. } => "Sign transaction",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_path())
    }
}
