//! Terminal front end.

pub mod render;
mod repl;

pub use repl::run_repl;

use termimad::MadSkin;

use crate::analysis::AnalysisKind;
use crate::session::{SessionState, SessionUpdate, TurnKind};

/// Echo one live session update to the terminal.
pub fn print_update(kind: AnalysisKind, update: SessionUpdate, skin: &MadSkin) {
    match update {
        SessionUpdate::StateChanged(SessionState::Streaming) => {
            println!("{}", render::separator());
        }
        SessionUpdate::StateChanged(state) => eprintln!("{}", render::state_line(kind, state)),
        // The operator's own lines are already on screen.
        SessionUpdate::TurnAppended(turn) if turn.kind == TurnKind::User => {}
        SessionUpdate::TurnAppended(turn) => print!("{}", render::turn(&turn, skin)),
        SessionUpdate::ReportUpdated(report) => {
            println!("{}", render::separator());
            print!("{}", render::report_card(kind, &report));
        }
    }
}
