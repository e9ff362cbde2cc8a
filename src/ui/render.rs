//! Terminal rendering of transactions, reports and transcript turns.
//!
//! Everything here returns a `String` so it can be printed by the REPL and
//! the one-shot subcommands alike.

use std::fmt::Write as _;

use termimad::MadSkin;
use termimad::crossterm::style::Color;

use crate::analysis::{AnalysisKind, AnalysisReport, ScoreBand};
use crate::metadata::{AddressInfo, ContractInfo};
use crate::registry::Transaction;
use crate::session::{ConversationTurn, SessionState, TurnKind};

const BOLD: &str = "\x1b[1m";
const CYAN: &str = "\x1b[1;36m";
const DIM: &str = "\x1b[90m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RESET: &str = "\x1b[0m";

/// Max characters of calldata shown inline.
const DATA_PREVIEW_MAX: usize = 66;

/// Build a termimad skin with our color scheme.
pub fn make_skin() -> MadSkin {
    let mut skin = MadSkin::default();
    skin.set_headers_fg(Color::Yellow);
    skin.bold.set_fg(Color::White);
    skin.italic.set_fg(Color::Magenta);
    skin.inline_code.set_fg(Color::Green);
    skin.code_block.set_fg(Color::Green);
    skin.code_block.left_margin = 2;
    skin
}

/// Terminal width, capped for readability.
pub fn term_width() -> usize {
    termimad::crossterm::terminal::size()
        .map(|(w, _)| w as usize)
        .unwrap_or(80)
        .min(100)
}

pub fn separator() -> String {
    format!("{DIM}{}{RESET}", "\u{2500}".repeat(term_width().min(80)))
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let cut: String = s.chars().take(max).collect();
    format!("{cut}...")
}

/// Numbered list of pending transactions. Values are shown in wei, as
/// received from the registry.
pub fn transaction_list(transactions: &[Transaction]) -> String {
    if transactions.is_empty() {
        return "No pending transactions found.\n".to_string();
    }

    let mut out = String::new();
    for (i, tx) in transactions.iter().enumerate() {
        let _ = writeln!(out, "{BOLD}Transaction {}{RESET}", i + 1);
        let _ = writeln!(out, "  {DIM}To:{RESET} {}", tx.to);
        let _ = writeln!(out, "  {DIM}Value:{RESET} {} Wei", tx.wei_value());
        let _ = writeln!(out, "  {DIM}Safe TX Hash:{RESET} {}", tx.safe_tx_hash);
        out.push('\n');
    }
    out
}

/// Basic facts about one transaction.
pub fn transaction_details(tx: &Transaction) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{BOLD}Transaction details{RESET}");
    let _ = writeln!(out, "  {DIM}Safe TX Hash:{RESET} {}", tx.safe_tx_hash);
    if let Some(safe) = &tx.safe {
        let _ = writeln!(out, "  {DIM}Safe:{RESET} {safe}");
    }
    let _ = writeln!(out, "  {DIM}To:{RESET} {}", tx.to);
    let _ = writeln!(out, "  {DIM}Value:{RESET} {} ETH", tx.eth_value());
    if let Some(nonce) = &tx.nonce {
        let _ = writeln!(out, "  {DIM}Nonce:{RESET} {nonce}");
    }
    if let Some(when) = tx.submitted_at() {
        let _ = writeln!(
            out,
            "  {DIM}Submitted:{RESET} {}",
            when.format("%Y-%m-%d %H:%M:%S")
        );
    }
    if let Some(required) = tx.confirmations_required {
        let _ = writeln!(
            out,
            "  {DIM}Confirmations:{RESET} {}/{required}",
            tx.confirmations.len()
        );
    }
    let method = tx
        .data_decoded
        .as_ref()
        .map(|d| d.method.as_str())
        .filter(|m| !m.is_empty())
        .unwrap_or("(none)");
    let _ = writeln!(out, "  {DIM}Method:{RESET} {method}");
    let _ = writeln!(
        out,
        "  {DIM}Data:{RESET} {}",
        truncate(tx.data_or_empty(), DATA_PREVIEW_MAX)
    );
    out
}

/// Pretty JSON of the decoded calldata.
pub fn decoded_data(tx: &Transaction) -> String {
    match &tx.data_decoded {
        Some(decoded) => serde_json::to_string_pretty(decoded)
            .unwrap_or_else(|_| "(unprintable decoded data)".to_string()),
        None => "No decoded data available.".to_string(),
    }
}

fn address_info_lines(out: &mut String, info: &AddressInfo, indent: &str) {
    let _ = writeln!(out, "{indent}{DIM}Address:{RESET} {}", info.address());
    let _ = writeln!(out, "{indent}{DIM}Type:{RESET} {}", info.label());
    if let AddressInfo::VerifiedContract {
        name,
        abi,
        implementation,
        ..
    } = info
    {
        let _ = writeln!(out, "{indent}{DIM}Name:{RESET} {name}");
        if let Some(implementation) = implementation {
            let _ = writeln!(out, "{indent}{DIM}Implementation:{RESET} {implementation}");
        }
        let entries = abi.as_array().map(Vec::len).unwrap_or(0);
        let _ = writeln!(out, "{indent}{DIM}ABI:{RESET} {entries} entries");
    }
}

pub fn contract_info(info: &ContractInfo) -> String {
    let mut out = String::new();
    match info {
        ContractInfo::Single(info) => {
            let _ = writeln!(out, "{BOLD}Contract information{RESET}");
            address_info_lines(&mut out, info, "  ");
        }
        ContractInfo::MultiSend(infos) => {
            let _ = writeln!(
                out,
                "{BOLD}MultiSend transaction{RESET} ({} calls)",
                infos.len()
            );
            for (i, info) in infos.iter().enumerate() {
                let _ = writeln!(out, "  {BOLD}Call {}{RESET}", i + 1);
                address_info_lines(&mut out, info, "    ");
            }
        }
    }
    out
}

pub fn simulation(result: &serde_json::Value) -> String {
    let pretty = serde_json::to_string_pretty(result).unwrap_or_else(|_| result.to_string());
    format!("{BOLD}Simulation{RESET}\n{pretty}\n")
}

fn band_color(band: ScoreBand) -> &'static str {
    match band {
        ScoreBand::Low => GREEN,
        ScoreBand::Medium => YELLOW,
        ScoreBand::High => RED,
    }
}

/// Score card shown once a report has been extracted.
///
/// For risk a high score is bad; for intent matching a high score is good,
/// so the colour scale is flipped.
pub fn report_card(kind: AnalysisKind, report: &AnalysisReport) -> String {
    let mut out = String::new();
    let label = match kind {
        AnalysisKind::RiskDetection => "Risk score",
        AnalysisKind::IntentMatch => "Match score",
    };

    match (report.score, report.band()) {
        (Some(score), Some(band)) => {
            let shown = match (kind, band) {
                (AnalysisKind::IntentMatch, ScoreBand::Low) => ScoreBand::High,
                (AnalysisKind::IntentMatch, ScoreBand::High) => ScoreBand::Low,
                (_, band) => band,
            };
            let _ = writeln!(
                out,
                "{BOLD}{label}:{RESET} {}{score}/100{RESET} ({})",
                band_color(shown),
                band.as_str()
            );
        }
        _ => {
            let _ = writeln!(out, "{BOLD}{label}:{RESET} {DIM}not reported{RESET}");
        }
    }
    if let Some(title) = &report.title {
        let _ = writeln!(out, "{BOLD}Title:{RESET} {title}");
    }
    if let Some(narrative) = &report.narrative {
        let _ = writeln!(out, "{narrative}");
    }
    out
}

/// One transcript turn. Assistant turns are rendered as markdown.
pub fn turn(turn: &ConversationTurn, skin: &MadSkin) -> String {
    match turn.kind {
        TurnKind::System => format!("{RED}\u{2717} {}{RESET}\n", turn.text),
        TurnKind::User => format!("{CYAN}\u{203A}{RESET} {}\n", turn.text),
        TurnKind::Assistant => {
            let text = termimad::FmtText::from(skin, &turn.text, Some(term_width()));
            format!("{text}")
        }
    }
}

pub fn state_line(kind: AnalysisKind, state: SessionState) -> String {
    let (icon, color) = match state {
        SessionState::Idle => ("\u{25CB}", DIM),
        SessionState::Running | SessionState::Streaming => ("\u{25CB}", YELLOW),
        SessionState::Completed => ("\u{25CF}", GREEN),
        SessionState::Failed | SessionState::Cancelled => ("\u{2717}", RED),
    };
    format!("  {color}{icon} {}: {state}{RESET}", kind.as_str())
}
