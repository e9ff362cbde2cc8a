//! Extraction of the structured score report embedded in the final AI message.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::analysis::AnalysisKind;
use crate::error::ReportParseError;

/// Banner the analyzer prints in front of the final AI message.
pub const AI_MESSAGE_MARKER: &str =
    "================================== Ai Message ==================================";

static JSON_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```json\n([\s\S]*?)\n```").expect("static report block pattern")
});

/// Score and narrative returned by a check.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AnalysisReport {
    pub score: Option<u8>,
    pub narrative: Option<String>,
    pub title: Option<String>,
    pub raw: serde_json::Value,
}

impl AnalysisReport {
    pub fn band(&self) -> Option<ScoreBand> {
        self.score.map(ScoreBand::from_score)
    }
}

/// Coarse level used to label a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreBand {
    Low,
    Medium,
    High,
}

impl ScoreBand {
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=33 => Self::Low,
            34..=66 => Self::Medium,
            _ => Self::High,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Pull the report out of an event's text, if it carries one.
///
/// Returns `None` for ordinary events and for marker events whose block is
/// missing or unparseable; the latter are logged.
pub fn extract_report(kind: AnalysisKind, text: &str) -> Option<AnalysisReport> {
    match parse_report_block(kind, text) {
        Ok(report) => Some(report),
        Err(ReportParseError::MissingMarker) => None,
        Err(e) => {
            tracing::warn!(%kind, error = %e, "could not parse analysis report");
            None
        }
    }
}

/// Fallible core of [`extract_report`].
pub fn parse_report_block(
    kind: AnalysisKind,
    text: &str,
) -> Result<AnalysisReport, ReportParseError> {
    if !text.contains(AI_MESSAGE_MARKER) {
        return Err(ReportParseError::MissingMarker);
    }

    let block = JSON_BLOCK
        .captures(text)
        .and_then(|caps| caps.get(1))
        .ok_or(ReportParseError::MissingBlock)?;

    let raw: serde_json::Value = serde_json::from_str(block.as_str())?;
    let obj = raw.as_object().ok_or(ReportParseError::NotAnObject)?;

    let score = obj.get(kind.score_key()).and_then(coerce_score);
    let narrative = ["analysis", "narrative", "reasoning"]
        .iter()
        .find_map(|key| obj.get(*key).and_then(|v| v.as_str()))
        .map(String::from);
    let title = match kind {
        AnalysisKind::RiskDetection => obj.get("title").and_then(|v| v.as_str()).map(String::from),
        AnalysisKind::IntentMatch => None,
    };

    Ok(AnalysisReport {
        score,
        narrative,
        title,
        raw,
    })
}

/// Integer coercion in the spirit of `parseInt`, clamped to 0..=100.
fn coerce_score(value: &serde_json::Value) -> Option<u8> {
    let n: i64 = match value {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))?,
        serde_json::Value::String(s) => leading_integer(s)?,
        _ => return None,
    };
    Some(n.clamp(0, 100) as u8)
}

fn leading_integer(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (sign, digits) = match s.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, s.strip_prefix('+').unwrap_or(s)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().ok().map(|n| sign * n)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report_event(body: &str) -> String {
        format!("{AI_MESSAGE_MARKER}\n\nHere is the report:\n```json\n{body}\n```\n")
    }

    #[test]
    fn extracts_risk_report() {
        let text = report_event(
            r#"{"title": "Token transfer", "risk_score": 42, "analysis": "Looks routine."}"#,
        );
        let report = extract_report(AnalysisKind::RiskDetection, &text).expect("report");
        assert_eq!(report.score, Some(42));
        assert_eq!(report.title.as_deref(), Some("Token transfer"));
        assert_eq!(report.narrative.as_deref(), Some("Looks routine."));
        assert_eq!(report.band(), Some(ScoreBand::Medium));
    }

    #[test]
    fn intent_flow_reads_match_score() {
        let text = report_event(r#"{"match_score": "87", "risk_score": 3}"#);
        let report = extract_report(AnalysisKind::IntentMatch, &text).expect("report");
        assert_eq!(report.score, Some(87));
        assert_eq!(report.title, None);
    }

    #[test]
    fn ordinary_event_has_no_report() {
        assert!(extract_report(AnalysisKind::RiskDetection, "thinking...").is_none());
        assert!(matches!(
            parse_report_block(AnalysisKind::RiskDetection, "```json\n{}\n```"),
            Err(ReportParseError::MissingMarker)
        ));
    }

    #[test]
    fn marker_without_block_is_not_a_report() {
        let text = format!("{AI_MESSAGE_MARKER}\nno structured output here");
        assert!(matches!(
            parse_report_block(AnalysisKind::RiskDetection, &text),
            Err(ReportParseError::MissingBlock)
        ));
        assert!(extract_report(AnalysisKind::RiskDetection, &text).is_none());
    }

    #[test]
    fn marker_with_invalid_json_is_not_a_report() {
        let text = report_event("{risk_score: 42");
        assert!(matches!(
            parse_report_block(AnalysisKind::RiskDetection, &text),
            Err(ReportParseError::InvalidJson(_))
        ));
    }

    #[test]
    fn non_object_block_is_rejected() {
        let text = report_event("[1, 2, 3]");
        assert!(matches!(
            parse_report_block(AnalysisKind::RiskDetection, &text),
            Err(ReportParseError::NotAnObject)
        ));
    }

    #[test]
    fn first_block_wins_and_multiline_bodies_parse() {
        let text = format!(
            "{AI_MESSAGE_MARKER}\n```json\n{{\n  \"risk_score\": 10\n}}\n```\n```json\n{{\"risk_score\": 90}}\n```"
        );
        let report = extract_report(AnalysisKind::RiskDetection, &text).unwrap();
        assert_eq!(report.score, Some(10));
    }

    #[test]
    fn score_coercion_matches_parse_int() {
        use serde_json::json;
        assert_eq!(coerce_score(&json!(42.9)), Some(42));
        assert_eq!(coerce_score(&json!("73 points")), Some(73));
        assert_eq!(coerce_score(&json!("n/a")), None);
        assert_eq!(coerce_score(&json!(140)), Some(100));
        assert_eq!(coerce_score(&json!(-5)), Some(0));
        assert_eq!(coerce_score(&json!(null)), None);
    }

    #[test]
    fn bands_split_at_thirds() {
        assert_eq!(ScoreBand::from_score(0), ScoreBand::Low);
        assert_eq!(ScoreBand::from_score(33), ScoreBand::Low);
        assert_eq!(ScoreBand::from_score(34), ScoreBand::Medium);
        assert_eq!(ScoreBand::from_score(66), ScoreBand::Medium);
        assert_eq!(ScoreBand::from_score(67), ScoreBand::High);
    }
}
