//! Remote AI-backed checks: request building, streaming and report extraction.

mod client;
mod report;
mod request;
mod stream;

use std::fmt;

pub use client::{AnalysisBackend, AnalysisClient};
pub use report::{AI_MESSAGE_MARKER, AnalysisReport, ScoreBand, extract_report, parse_report_block};
pub use request::{AnalysisParams, build_params, simulation_params};
pub use stream::{EventStream, SseLineDecoder, StreamEvent, decode_event_stream};

/// Which check a request runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalysisKind {
    RiskDetection,
    IntentMatch,
}

impl AnalysisKind {
    /// Endpoint path under the analyzer base URL.
    pub fn path(self) -> &'static str {
        match self {
            Self::RiskDetection => "analyze",
            Self::IntentMatch => "match-intent",
        }
    }

    /// Report field that carries the score.
    pub fn score_key(self) -> &'static str {
        match self {
            Self::RiskDetection => "risk_score",
            Self::IntentMatch => "match_score",
        }
    }

    /// Prefix used when a request fails.
    pub fn failure_label(self) -> &'static str {
        match self {
            Self::RiskDetection => "Analysis",
            Self::IntentMatch => "Match analysis",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::RiskDetection => "risk_detection",
            Self::IntentMatch => "intent_match",
        }
    }
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
