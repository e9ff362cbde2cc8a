//! Error types for safe-sentinel.

use reqwest::StatusCode;

/// Top-level error type for the client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    MissingParameter(#[from] MissingParameter),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error("Contract metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Route(#[from] RouteError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),
}

/// A required identifier (safe address, transaction hash) was absent.
///
/// Raised before any request is issued.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Missing required parameters: {name}")]
pub struct MissingParameter {
    pub name: &'static str,
}

impl MissingParameter {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

/// Reject blank identifiers up front.
pub fn require_param<'a>(name: &'static str, value: &'a str) -> std::result::Result<&'a str, MissingParameter> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(MissingParameter::new(name));
    }
    Ok(trimmed)
}

/// Errors from the transaction registry and the signing service.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error(transparent)]
    MissingParameter(#[from] MissingParameter),

    #[error("HTTP error! Status: {}{}", .status.as_u16(), detail_suffix(.detail.as_deref()))]
    Status {
        status: StatusCode,
        detail: Option<String>,
    },

    #[error("{reason}")]
    Rejected { reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl FetchError {
    /// HTTP status carried by a non-success response, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

fn detail_suffix(detail: Option<&str>) -> String {
    match detail {
        Some(detail) if !detail.trim().is_empty() => format!(" ({detail})"),
        _ => String::new(),
    }
}

/// Errors from the analysis service (streamed checks and simulation).
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("{label} failed: {status_text}{}", body_suffix(.body.as_ref()))]
    Status {
        label: &'static str,
        status: StatusCode,
        status_text: String,
        body: Option<serde_json::Value>,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

fn body_suffix(body: Option<&serde_json::Value>) -> String {
    body.map(|b| format!(" - {b}")).unwrap_or_default()
}

/// A `data: ` line whose payload was not a valid event.
///
/// Recovered locally: the line is logged and skipped.
#[derive(Debug, thiserror::Error)]
#[error("Malformed stream event {line:?}: {source}")]
pub struct StreamDecodeError {
    pub line: String,
    #[source]
    pub source: serde_json::Error,
}

/// Item-level failure surfaced while consuming an event stream.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error(transparent)]
    Decode(#[from] StreamDecodeError),

    #[error("Stream interrupted: {0}")]
    Transport(String),
}

/// Failure to pull a structured report out of an event.
#[derive(Debug, thiserror::Error)]
pub enum ReportParseError {
    #[error("event does not carry the report marker")]
    MissingMarker,

    #[error("no fenced json block found")]
    MissingBlock,

    #[error("report block is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("report block is not a JSON object")]
    NotAnObject,
}

/// Errors from the third-party contract metadata service.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error(transparent)]
    MissingParameter(#[from] MissingParameter),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid ABI for {address}: {reason}")]
    InvalidAbi { address: String, reason: String },

    #[error("multiSend transaction has no decoded sub-transactions")]
    MalformedMultiSend,
}

/// A navigation path that does not name a known view.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error(transparent)]
    MissingParameter(#[from] MissingParameter),

    #[error("Unknown route: {0}")]
    UnknownPath(String),
}

/// Result type alias for the client.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fetch_status_mentions_http_code() {
        let err = FetchError::Status {
            status: StatusCode::NOT_FOUND,
            detail: None,
        };
        assert_eq!(err.to_string(), "HTTP error! Status: 404");
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
    }

    #[test]
    fn fetch_status_appends_detail() {
        let err = FetchError::Status {
            status: StatusCode::BAD_REQUEST,
            detail: Some("owner not found".to_string()),
        };
        assert_eq!(err.to_string(), "HTTP error! Status: 400 (owner not found)");
    }

    #[test]
    fn analysis_status_appends_json_body() {
        let err = AnalysisError::Status {
            label: "Analysis",
            status: StatusCode::BAD_REQUEST,
            status_text: "Bad Request".to_string(),
            body: Some(json!({"detail": "bad value"})),
        };
        assert_eq!(
            err.to_string(),
            r#"Analysis failed: Bad Request - {"detail":"bad value"}"#
        );
    }

    #[test]
    fn analysis_status_without_body() {
        let err = AnalysisError::Status {
            label: "Match analysis",
            status: StatusCode::INTERNAL_SERVER_ERROR,
            status_text: "Internal Server Error".to_string(),
            body: None,
        };
        assert_eq!(
            err.to_string(),
            "Match analysis failed: Internal Server Error"
        );
    }

    #[test]
    fn require_param_rejects_blank() {
        assert_eq!(
            require_param("txHash", "   "),
            Err(MissingParameter::new("txHash"))
        );
        assert_eq!(require_param("txHash", " 0xabc "), Ok("0xabc"));
    }
}
