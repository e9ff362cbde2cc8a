//! Command-line interface.
//!
//! Without a subcommand the interactive REPL starts. The other subcommands
//! run one step of a review and exit, which is handy for scripting.

mod doctor;

pub use doctor::run_doctor_command;

use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::app::App;
use crate::registry::Transaction;
use crate::routes::Route;
use crate::session::{AnalysisSession, SessionState};
use crate::ui::{self, render};

#[derive(Parser, Debug)]
#[command(
    name = "safe-sentinel",
    version,
    about = "Review pending Safe multisig transactions with streamed AI risk and intent checks"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Interactive review session (default).
    Repl {
        /// Start at this path, e.g. `/risk-detector?safeAddress=0x..&txHash=0x..`.
        #[arg(long)]
        path: Option<String>,
    },

    /// List the safe's pending (not executed) transactions.
    Pending {
        /// Safe address; defaults to the configured safe.
        #[arg(long)]
        safe: Option<String>,
    },

    /// Show one transaction.
    Show {
        #[command(flatten)]
        target: TargetArgs,

        /// Print the raw registry record.
        #[arg(long)]
        raw: bool,

        /// Look up the contracts the transaction calls.
        #[arg(long)]
        contracts: bool,
    },

    /// Stream a risk analysis for one transaction.
    Risk {
        #[command(flatten)]
        target: TargetArgs,

        /// Also run the simulation.
        #[arg(long)]
        simulate: bool,
    },

    /// Match one transaction against a stated intent.
    Intent {
        #[command(flatten)]
        target: TargetArgs,

        /// What the transaction is supposed to do.
        #[arg(long)]
        intent: String,
    },

    /// Request the backend's co-signature.
    Sign {
        #[command(flatten)]
        target: TargetArgs,

        /// Open the Safe queue in the browser afterwards.
        #[arg(long)]
        open: bool,
    },

    /// Check configuration and backend reachability.
    Doctor,
}

#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Safe transaction hash.
    pub tx_hash: String,

    /// Safe address; defaults to the configured safe.
    #[arg(long)]
    pub safe: Option<String>,
}

impl TargetArgs {
    fn safe<'a>(&'a self, app: &'a App) -> &'a str {
        self.safe.as_deref().unwrap_or(&app.config.default_safe)
    }
}

/// Run one command against the resolved clients.
pub async fn run_command(app: App, command: Option<Command>) -> anyhow::Result<()> {
    match command.unwrap_or(Command::Repl { path: None }) {
        Command::Repl { path } => {
            let start = match path {
                Some(path) => Route::parse(&path)?,
                None => Route::Landing,
            };
            ui::run_repl(app, start).await
        }
        Command::Pending { safe } => {
            let safe = safe.unwrap_or_else(|| app.config.default_safe.clone());
            let pending = app.registry.list_pending(&safe).await?;
            print!("{}", render::transaction_list(&pending));
            Ok(())
        }
        Command::Show {
            target,
            raw,
            contracts,
        } => {
            let tx = load(&app, &target).await?;
            if raw {
                println!("{}", tx.raw_summary());
                return Ok(());
            }
            print!("{}", render::transaction_details(&tx));
            println!("{}", render::decoded_data(&tx));
            if contracts {
                let info = app.metadata.identify_transaction(&tx).await?;
                print!("{}", render::contract_info(&info));
            }
            Ok(())
        }
        Command::Risk { target, simulate } => {
            let tx = load(&app, &target).await?;
            if simulate {
                match app.analyzer.simulate(&tx).await {
                    Ok(result) => print!("{}", render::simulation(&result)),
                    Err(e) => eprintln!("{e}"),
                }
            }
            let session = app.risk_session(target.safe(&app), tx);
            stream_once(&app, session, None).await
        }
        Command::Intent { target, intent } => {
            let tx = load(&app, &target).await?;
            let session = app.intent_session(target.safe(&app), tx);
            stream_once(&app, session, Some(intent)).await
        }
        Command::Sign { target, open } => {
            let safe = target.safe(&app);
            let queue_url = app.signer.request_signature(safe, &target.tx_hash).await?;
            println!("Transaction signed. Safe queue: {queue_url}");
            if open && let Err(e) = open::that(&queue_url) {
                tracing::warn!("Failed to open browser: {}", e);
            }
            Ok(())
        }
        Command::Doctor => run_doctor_command().await,
    }
}

async fn load(app: &App, target: &TargetArgs) -> anyhow::Result<Transaction> {
    Ok(app
        .registry
        .fetch_transaction(target.safe(app), &target.tx_hash)
        .await?)
}

/// Run one analysis to completion, echoing the transcript as it streams.
/// Ctrl+C cancels the stream.
async fn stream_once(
    app: &App,
    session: AnalysisSession,
    intent: Option<String>,
) -> anyhow::Result<()> {
    let kind = session.kind();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut session = session.with_updates(tx);

    let printer = tokio::spawn(async move {
        let skin = render::make_skin();
        while let Some(update) = rx.recv().await {
            ui::print_update(kind, update, &skin);
        }
    });

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let mut state = session.run(&app.analyzer, &cancel).await;
    if let Some(intent) = intent {
        state = session
            .submit_user_message(&intent, &app.analyzer, &cancel)
            .await;
    }
    let has_report = session.report().is_some();

    interrupt.abort();
    drop(session);
    let _ = printer.await;

    match state {
        SessionState::Completed if has_report => Ok(()),
        SessionState::Completed => {
            eprintln!("Stream ended without a report.");
            Ok(())
        }
        other => anyhow::bail!("{kind} {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_repl() {
        let cli = Cli::try_parse_from(["safe-sentinel"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.log_json);
    }

    #[test]
    fn parses_intent_command() {
        let cli = Cli::try_parse_from([
            "safe-sentinel",
            "intent",
            "0xabc",
            "--safe",
            "0xsafe",
            "--intent",
            "pay the auditor",
        ])
        .unwrap();
        match cli.command {
            Some(Command::Intent { target, intent }) => {
                assert_eq!(target.tx_hash, "0xabc");
                assert_eq!(target.safe.as_deref(), Some("0xsafe"));
                assert_eq!(intent, "pay the auditor");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn intent_requires_an_intent() {
        assert!(Cli::try_parse_from(["safe-sentinel", "intent", "0xabc"]).is_err());
    }

    #[test]
    fn global_log_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["safe-sentinel", "doctor", "--log-json"]).unwrap();
        assert!(cli.log_json);
        assert!(matches!(cli.command, Some(Command::Doctor)));
    }
}
