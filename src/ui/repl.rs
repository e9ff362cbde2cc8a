//! Interactive REPL with line editing and markdown rendering.
//!
//! Walks the operator through one review: list pending transactions, pick
//! one, run risk detection, match it against their intent, request the
//! co-signature. Uses rustyline for line editing, history and tab-completion
//! and termimad for rendering assistant turns.
//!
//! ## Commands
//!
//! - `/help` - Show available commands
//! - `/quit` or `/exit` - Exit the REPL
//! - `/safe [address]` - Show or switch the safe under review
//! - `/fetch` - List the safe's pending transactions
//! - `/select <n|hash>` - Review a transaction
//! - `/run` - Run the check for the current view
//! - `/next`, `/back`, `/go <path>` - Navigate
//! - Ctrl+C - Cancel a running analysis

use std::borrow::Cow;

use rustyline::completion::Completer;
use rustyline::config::Config as EditorConfig;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{CompletionType, Editor, Helper};
use termimad::MadSkin;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::analysis::{AnalysisBackend, AnalysisKind};
use crate::app::App;
use crate::registry::Transaction;
use crate::routes::Route;
use crate::session::{AnalysisSession, SessionState, SessionUpdate};
use crate::settings::Settings;
use crate::ui::{print_update, render};

/// Slash commands available in the REPL.
const SLASH_COMMANDS: &[&str] = &[
    "/help", "/quit", "/exit", "/safe", "/fetch", "/select", "/details", "/raw", "/run",
    "/simulate", "/report", "/next", "/back", "/go", "/sign", "/view",
];

/// What the input thread hands to the controller.
#[derive(Debug)]
enum ReplInput {
    Line(String),
    /// Ctrl+C.
    Interrupt,
    /// Ctrl+D or input failure.
    Quit,
}

/// Rustyline helper for slash-command tab completion.
struct ReplHelper;

impl Completer for ReplHelper {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        if !line.starts_with('/') {
            return Ok((0, vec![]));
        }

        let prefix = &line[..pos];
        let matches: Vec<String> = SLASH_COMMANDS
            .iter()
            .filter(|cmd| cmd.starts_with(prefix))
            .map(|cmd| cmd.to_string())
            .collect();

        Ok((0, matches))
    }
}

impl Hinter for ReplHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<String> {
        if !line.starts_with('/') || pos < line.len() {
            return None;
        }

        SLASH_COMMANDS
            .iter()
            .find(|cmd| cmd.starts_with(line) && **cmd != line)
            .map(|cmd| cmd[line.len()..].to_string())
    }
}

impl Highlighter for ReplHelper {
    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Cow::Owned(format!("\x1b[90m{hint}\x1b[0m"))
    }
}

impl Validator for ReplHelper {}
impl Helper for ReplHelper {}

fn print_help() {
    let h = "\x1b[1m"; // bold (section headers)
    let c = "\x1b[1;36m"; // bold cyan (commands)
    let d = "\x1b[90m"; // dim gray (descriptions)
    let r = "\x1b[0m"; // reset

    println!();
    println!("  {h}safe-sentinel{r}");
    println!();
    println!("  {h}Transactions{r}");
    println!("  {c}/safe [address]{r}    {d}show or switch the safe{r}");
    println!("  {c}/fetch{r}             {d}list pending transactions{r}");
    println!("  {c}/select <n|hash>{r}   {d}review a transaction{r}");
    println!("  {c}/details{r}           {d}details, decoded data and contract info{r}");
    println!("  {c}/raw{r}               {d}raw registry record{r}");
    println!();
    println!("  {h}Review{r}");
    println!("  {c}/run{r}               {d}run the check for this view{r}");
    println!("  {c}/simulate{r}          {d}simulate the transaction (retry on failure){r}");
    println!("  {c}/report{r}            {d}show the latest report{r}");
    println!("  {c}/sign{r}              {d}request the co-signature{r}");
    println!("  {c}/view{r}              {d}open the safe's queue in the browser{r}");
    println!("  {d}anything else is sent as a chat message; the first reply to the{r}");
    println!("  {d}intent question starts intent matching{r}");
    println!();
    println!("  {h}Navigation{r}");
    println!("  {c}/next{r} {c}/back{r}        {d}move along the review flow{r}");
    println!("  {c}/go <path>{r}         {d}jump to a path, e.g. /transactions{r}");
    println!("  {c}/quit{r} {c}/exit{r}        {d}exit the repl{r}");
    println!("  {c}Ctrl+C{r}             {d}cancel a running analysis{r}");
    println!();
}

/// Read lines on a dedicated thread; rustyline blocks.
fn spawn_input_thread(tx: mpsc::Sender<ReplInput>) {
    std::thread::spawn(move || {
        let config = EditorConfig::builder()
            .auto_add_history(true)
            .completion_type(CompletionType::List);
        let config = match config.history_ignore_dups(true) {
            Ok(builder) => builder.build(),
            Err(e) => {
                eprintln!("Failed to configure line editor: {e}");
                let _ = tx.blocking_send(ReplInput::Quit);
                return;
            }
        };

        let mut rl = match Editor::with_config(config) {
            Ok(editor) => editor,
            Err(e) => {
                eprintln!("Failed to initialize line editor: {e}");
                let _ = tx.blocking_send(ReplInput::Quit);
                return;
            }
        };

        rl.set_helper(Some(ReplHelper));

        let hist_path = crate::bootstrap::history_path();
        if let Some(parent) = hist_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = rl.load_history(&hist_path);

        loop {
            match rl.readline("\x1b[1;36m\u{203A}\x1b[0m ") {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    if tx.blocking_send(ReplInput::Line(line.to_string())).is_err() {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    if tx.blocking_send(ReplInput::Interrupt).is_err() {
                        break;
                    }
                }
                Err(ReadlineError::Eof) => {
                    let _ = tx.blocking_send(ReplInput::Quit);
                    break;
                }
                Err(e) => {
                    eprintln!("Input error: {e}");
                    let _ = tx.blocking_send(ReplInput::Quit);
                    break;
                }
            }
        }

        let _ = rl.save_history(&hist_path);
    });
}

/// A session plus the receiving end of its update channel.
struct LiveSession {
    session: AnalysisSession,
    updates: mpsc::UnboundedReceiver<SessionUpdate>,
}

impl LiveSession {
    fn new(build: impl FnOnce() -> AnalysisSession) -> Self {
        let (tx, updates) = mpsc::unbounded_channel();
        Self {
            session: build().with_updates(tx),
            updates,
        }
    }
}

enum Action {
    Run,
    Message(String),
}

/// Controller state for one REPL run.
struct Repl {
    app: App,
    input: mpsc::Receiver<ReplInput>,
    skin: MadSkin,
    route: Route,
    safe: String,
    pending: Vec<Transaction>,
    current: Option<Transaction>,
    risk: Option<LiveSession>,
    intent: Option<LiveSession>,
}

/// Start the REPL and run until the operator quits.
pub async fn run_repl(app: App, start: Route) -> anyhow::Result<()> {
    let (tx, rx) = mpsc::channel(32);
    spawn_input_thread(tx);

    println!("\x1b[1msafe-sentinel\x1b[0m  /help for commands, /quit to exit");
    println!();

    let mut repl = Repl {
        safe: start
            .target()
            .map(|(safe, _)| safe.to_string())
            .unwrap_or_else(|| app.config.default_safe.clone()),
        app,
        input: rx,
        skin: render::make_skin(),
        route: Route::Landing,
        pending: Vec::new(),
        current: None,
        risk: None,
        intent: None,
    };
    repl.navigate(start).await;
    repl.run().await;
    Ok(())
}

impl Repl {
    async fn run(&mut self) {
        while let Some(input) = self.input.recv().await {
            match input {
                ReplInput::Quit => break,
                ReplInput::Interrupt => {
                    println!("\x1b[90mnothing to cancel; /quit to exit\x1b[0m");
                }
                ReplInput::Line(line) => {
                    if !self.handle_line(&line).await {
                        break;
                    }
                }
            }
        }
        tracing::debug!("repl finished");
    }

    /// Returns `false` when the REPL should exit.
    async fn handle_line(&mut self, line: &str) -> bool {
        if !line.starts_with('/') {
            return self.chat(line).await;
        }

        let (command, arg) = match line.split_once(char::is_whitespace) {
            Some((command, arg)) => (command, arg.trim()),
            None => (line, ""),
        };

        match command.to_lowercase().as_str() {
            "/quit" | "/exit" => return false,
            "/help" => print_help(),
            "/safe" => self.switch_safe(arg),
            "/fetch" => self.fetch_pending().await,
            "/select" => self.select(arg).await,
            "/details" => self.show_details().await,
            "/raw" => match &self.current {
                Some(tx) => println!("{}", tx.raw_summary()),
                None => println!("No transaction selected."),
            },
            "/run" => return self.run_check().await,
            "/simulate" => self.simulate().await,
            "/report" => self.show_report(),
            "/next" => match self.route.next() {
                Some(route) => self.navigate(route).await,
                None => println!("Select a transaction first: /select <n>"),
            },
            "/back" => {
                let route = self.route.back();
                self.navigate(route).await;
            }
            "/go" => match Route::parse(arg) {
                Ok(route) => self.navigate(route).await,
                Err(e) => eprintln!("\x1b[31m{e}\x1b[0m"),
            },
            "/sign" => self.sign().await,
            "/view" => self.view_queue(),
            other => eprintln!("Unknown command: {other} (try /help)"),
        }
        true
    }

    async fn navigate(&mut self, route: Route) {
        tracing::debug!(from = %self.route, to = %route, "navigate");
        self.route = route.clone();
        println!("{}", render::separator());
        println!("\x1b[1m{}\x1b[0m  \x1b[90m{}\x1b[0m", route.title(), route.to_path());

        match &route {
            Route::Landing => {
                println!("Reviewing safe {}. /fetch to list its pending transactions.", self.safe);
            }
            Route::Transactions => {
                if self.pending.is_empty() {
                    self.fetch_pending().await;
                } else {
                    print!("{}", render::transaction_list(&self.pending));
                }
            }
            Route::RiskDetector { safe, tx }
            | Route::IntentMatcher { safe, tx }
            | Route::SignTransaction { safe, tx } => {
                if !self.load_transaction(safe, tx).await {
                    return;
                }
                if let Some(tx) = &self.current {
                    print!("{}", render::transaction_details(tx));
                }
                let hint = match &route {
                    Route::RiskDetector { .. } => "/run to start risk detection, /simulate to simulate",
                    Route::IntentMatcher { .. } => "/run to start intent matching",
                    _ => "/sign to request the co-signature",
                };
                println!("\x1b[90m{hint}\x1b[0m");
            }
        }
    }

    /// Make sure `current` holds the transaction named by the route.
    /// Switching transactions drops both sessions.
    async fn load_transaction(&mut self, safe: &str, tx_hash: &str) -> bool {
        if self.safe != safe {
            self.safe = safe.to_string();
            self.pending.clear();
        }
        if self
            .current
            .as_ref()
            .is_some_and(|tx| tx.safe_tx_hash == tx_hash)
        {
            return true;
        }

        self.risk = None;
        self.intent = None;
        match self.app.registry.fetch_transaction(safe, tx_hash).await {
            Ok(tx) => {
                self.current = Some(tx);
                true
            }
            Err(e) => {
                self.current = None;
                eprintln!("\x1b[31mError loading transaction details: {e}\x1b[0m");
                false
            }
        }
    }

    fn switch_safe(&mut self, arg: &str) {
        if arg.is_empty() {
            println!("Safe: {}", self.safe);
            return;
        }
        self.safe = arg.to_string();
        self.pending.clear();
        println!("Safe set to {}", self.safe);

        let mut settings = Settings::load();
        settings.default_safe = Some(self.safe.clone());
        if let Err(e) = settings.save() {
            tracing::warn!("Failed to remember safe in settings: {}", e);
        }
    }

    async fn fetch_pending(&mut self) {
        println!("\x1b[90mLoading transactions...\x1b[0m");
        match self.app.registry.list_pending(&self.safe).await {
            Ok(pending) => {
                self.pending = pending;
                self.route = Route::Transactions;
                print!("{}", render::transaction_list(&self.pending));
                if !self.pending.is_empty() {
                    println!("\x1b[90m/select <n> to review a transaction\x1b[0m");
                }
            }
            Err(e) => eprintln!("\x1b[31mError fetching transactions: {e}\x1b[0m"),
        }
    }

    async fn select(&mut self, arg: &str) {
        let hash = match arg.parse::<usize>() {
            Ok(n) if n >= 1 && n <= self.pending.len() => self.pending[n - 1].safe_tx_hash.clone(),
            Ok(_) => {
                eprintln!("No transaction #{arg}; /fetch lists {} pending", self.pending.len());
                return;
            }
            Err(_) => arg.to_string(),
        };

        match Route::review(&self.safe, &hash) {
            Ok(route) => self.navigate(route).await,
            Err(e) => eprintln!("\x1b[31m{e}\x1b[0m"),
        }
    }

    async fn show_details(&mut self) {
        let Some(tx) = &self.current else {
            println!("No transaction selected.");
            return;
        };
        print!("{}", render::transaction_details(tx));
        println!("\x1b[1mDecoded data\x1b[0m\n{}", render::decoded_data(tx));

        println!("\x1b[90mIdentifying contracts...\x1b[0m");
        match self.app.metadata.identify_transaction(tx).await {
            Ok(info) => print!("{}", render::contract_info(&info)),
            Err(e) => eprintln!("\x1b[31mError fetching contract info: {e}\x1b[0m"),
        }
    }

    async fn simulate(&mut self) {
        let Some(tx) = &self.current else {
            println!("No transaction selected.");
            return;
        };
        println!("\x1b[90mSimulating...\x1b[0m");
        match self.app.analyzer.simulate(tx).await {
            Ok(result) => print!("{}", render::simulation(&result)),
            Err(e) => eprintln!("\x1b[31m{e}\x1b[0m  \x1b[90m(/simulate to retry)\x1b[0m"),
        }
    }

    fn show_report(&self) {
        let live = match self.route {
            Route::IntentMatcher { .. } => self.intent.as_ref(),
            _ => self.risk.as_ref(),
        };
        match live.and_then(|l| l.session.report().map(|r| (l.session.kind(), r))) {
            Some((kind, report)) => print!("{}", render::report_card(kind, report)),
            None => println!("No report yet."),
        }
    }

    async fn run_check(&mut self) -> bool {
        self.drive_current(Action::Run).await
    }

    async fn chat(&mut self, text: &str) -> bool {
        if !matches!(
            self.route,
            Route::RiskDetector { .. } | Route::IntentMatcher { .. }
        ) {
            println!("Nothing to chat with here. /help lists commands.");
            return true;
        }
        self.drive_current(Action::Message(text.to_string())).await
    }

    async fn drive_current(&mut self, action: Action) -> bool {
        // Split borrows: the session, the analyzer and the input queue are
        // separate fields.
        let Self {
            app,
            input,
            skin,
            route,
            current,
            safe,
            risk,
            intent,
            ..
        } = self;

        let Some(tx) = current.clone() else {
            println!("No transaction selected.");
            return true;
        };
        let live = match route {
            Route::RiskDetector { .. } => {
                risk.get_or_insert_with(|| LiveSession::new(|| app.risk_session(safe, tx)))
            }
            Route::IntentMatcher { .. } => {
                intent.get_or_insert_with(|| LiveSession::new(|| app.intent_session(safe, tx)))
            }
            _ => {
                println!("No check runs on this view.");
                return true;
            }
        };

        drive(live, &app.analyzer, input, skin, action).await
    }

    async fn sign(&mut self) {
        let Route::SignTransaction { safe, tx } = &self.route else {
            println!("Finish the review first: /next until the sign view.");
            return;
        };
        println!("\x1b[90mSigning...\x1b[0m");
        match self.app.signer.request_signature(safe, tx).await {
            Ok(queue_url) => {
                println!("\x1b[32m\u{25CF} Transaction signed.\x1b[0m");
                println!("View it in the Safe queue: {queue_url}  \x1b[90m(/view)\x1b[0m");
            }
            Err(e) => eprintln!("\x1b[31mError signing transaction: {e}\x1b[0m"),
        }
    }

    fn view_queue(&self) {
        let url = self.app.signer.queue_url(&self.safe);
        println!("{url}");
        if let Err(e) = open::that(&url) {
            tracing::warn!("Failed to open browser: {}", e);
        }
    }
}

/// Run one session action while echoing its updates and honouring Ctrl+C.
///
/// Returns `false` if the operator asked to quit meanwhile.
async fn drive(
    live: &mut LiveSession,
    backend: &dyn AnalysisBackend,
    input: &mut mpsc::Receiver<ReplInput>,
    skin: &MadSkin,
    action: Action,
) -> bool {
    let LiveSession { session, updates } = live;
    let kind = session.kind();
    let cancel = CancellationToken::new();
    let mut keep_going = true;

    {
        let work = async {
            match action {
                Action::Run => session.run(backend, &cancel).await,
                Action::Message(text) => {
                    session
                        .submit_user_message(&text, backend, &cancel)
                        .await
                }
            }
        };
        tokio::pin!(work);

        loop {
            tokio::select! {
                _ = &mut work => break,
                Some(update) = updates.recv() => print_update(kind, update, skin),
                next = input.recv() => match next {
                    Some(ReplInput::Interrupt) => cancel.cancel(),
                    Some(ReplInput::Quit) | None => {
                        keep_going = false;
                        cancel.cancel();
                    }
                    Some(ReplInput::Line(_)) => {
                        eprintln!("\x1b[90manalysis running; Ctrl+C to cancel\x1b[0m");
                    }
                },
            }
        }
    }

    while let Ok(update) = updates.try_recv() {
        print_update(kind, update, skin);
    }

    if kind == AnalysisKind::RiskDetection
        && session.state() == SessionState::Completed
        && session.report().is_some()
    {
        println!("\x1b[90m/next to continue to intent matching\x1b[0m");
    }
    keep_going
}
