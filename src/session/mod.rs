//! Streaming analysis session shared by risk detection and intent matching.
//!
//! A session owns the transcript, the current report and a single state
//! value. All mutation goes through `run` and `submit_user_message`, which
//! are driven from one task, so no locking is needed.
//!
//! ```text
//! Idle -> Running -> Streaming -> Completed
//!            |           |
//!            +-> Failed  +-> Cancelled
//! ```

mod conversation;

use std::fmt;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use conversation::{Conversation, ConversationTurn, TurnKind};

use crate::analysis::{
    AnalysisBackend, AnalysisKind, AnalysisReport, EventStream, StreamEvent, build_params,
    extract_report,
};
use crate::error::StreamError;
use crate::registry::Transaction;

/// Assistant prompt that opens the intent flow.
pub const INTENT_PROMPT: &str = "What is your intent with this transaction?";

/// Lifecycle of one analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    /// Request issued, no event decoded yet.
    Running,
    /// At least one event decoded.
    Streaming,
    /// Stream ended, with or without a report.
    Completed,
    /// The request failed before streaming.
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Streaming)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Guard for the intent flow's one-time intent capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentGate {
    /// The prompt has not been shown yet.
    Unprompted,
    /// Prompt shown; the next user message becomes the intent.
    AwaitingIntent,
    Captured(String),
}

/// Change notifications for a live UI.
#[derive(Debug, Clone)]
pub enum SessionUpdate {
    StateChanged(SessionState),
    TurnAppended(ConversationTurn),
    ReportUpdated(AnalysisReport),
}

enum NextItem {
    Item(Result<StreamEvent, StreamError>),
    End,
    Stalled(Duration),
    Cancelled,
}

/// One risk-detection or intent-matching conversation about a transaction.
pub struct AnalysisSession {
    kind: AnalysisKind,
    safe_address: String,
    transaction: Transaction,
    conversation: Conversation,
    report: Option<AnalysisReport>,
    state: SessionState,
    intent_gate: IntentGate,
    requests_issued: usize,
    idle_timeout: Option<Duration>,
    updates: Option<mpsc::UnboundedSender<SessionUpdate>>,
}

impl AnalysisSession {
    pub fn new(kind: AnalysisKind, safe_address: impl Into<String>, transaction: Transaction) -> Self {
        Self {
            kind,
            safe_address: safe_address.into(),
            transaction,
            conversation: Conversation::new(),
            report: None,
            state: SessionState::Idle,
            intent_gate: IntentGate::Unprompted,
            requests_issued: 0,
            idle_timeout: None,
            updates: None,
        }
    }

    pub fn risk_detection(safe_address: impl Into<String>, transaction: Transaction) -> Self {
        Self::new(AnalysisKind::RiskDetection, safe_address, transaction)
    }

    pub fn intent_match(safe_address: impl Into<String>, transaction: Transaction) -> Self {
        Self::new(AnalysisKind::IntentMatch, safe_address, transaction)
    }

    /// Give up on a stream that stays silent this long.
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout.filter(|d| !d.is_zero());
        self
    }

    pub fn with_updates(mut self, updates: mpsc::UnboundedSender<SessionUpdate>) -> Self {
        self.updates = Some(updates);
        self
    }

    pub fn kind(&self) -> AnalysisKind {
        self.kind
    }

    pub fn safe_address(&self) -> &str {
        &self.safe_address
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn report(&self) -> Option<&AnalysisReport> {
        self.report.as_ref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn intent_gate(&self) -> &IntentGate {
        &self.intent_gate
    }

    pub fn intent(&self) -> Option<&str> {
        match &self.intent_gate {
            IntentGate::Captured(intent) => Some(intent),
            _ => None,
        }
    }

    /// Analysis requests issued over the session's lifetime.
    pub fn requests_issued(&self) -> usize {
        self.requests_issued
    }

    /// The explicit "run" action.
    ///
    /// Risk detection starts a fresh request every time. Intent matching
    /// first asks for the intent and only requests once one is captured.
    pub async fn run(
        &mut self,
        backend: &dyn AnalysisBackend,
        cancel: &CancellationToken,
    ) -> SessionState {
        match self.kind {
            AnalysisKind::RiskDetection => {
                self.conversation.clear();
                self.execute(None, backend, cancel).await;
            }
            AnalysisKind::IntentMatch => match &self.intent_gate {
                IntentGate::Unprompted => {
                    self.append_turn(TurnKind::Assistant, INTENT_PROMPT.to_string());
                    self.intent_gate = IntentGate::AwaitingIntent;
                }
                IntentGate::AwaitingIntent => {
                    tracing::debug!("intent prompt already shown");
                }
                IntentGate::Captured(intent) => {
                    let intent = intent.clone();
                    self.execute(Some(intent), backend, cancel).await;
                }
            },
        }
        self.state
    }

    /// Record a user message.
    ///
    /// In the intent flow the first reply after the prompt is captured as
    /// the session's intent and fires the analysis. Every other message is
    /// only appended to the transcript.
    pub async fn submit_user_message(
        &mut self,
        text: &str,
        backend: &dyn AnalysisBackend,
        cancel: &CancellationToken,
    ) -> SessionState {
        let text = text.trim();
        if text.is_empty() {
            return self.state;
        }

        self.append_turn(TurnKind::User, text.to_string());

        if self.kind == AnalysisKind::IntentMatch && self.intent_gate == IntentGate::AwaitingIntent
        {
            tracing::info!(intent = text, "intent captured");
            self.intent_gate = IntentGate::Captured(text.to_string());
            self.execute(Some(text.to_string()), backend, cancel).await;
        } else {
            tracing::debug!(kind = %self.kind, "user message recorded without re-running analysis");
        }

        self.state
    }

    async fn execute(
        &mut self,
        intent: Option<String>,
        backend: &dyn AnalysisBackend,
        cancel: &CancellationToken,
    ) {
        self.report = None;
        self.set_state(SessionState::Running);
        self.requests_issued += 1;

        let kind = self.kind;
        let params = build_params(kind, &self.transaction, &self.safe_address, intent.as_deref());

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = backend.open_stream(kind, &params) => Some(result),
        };

        let mut stream = match opened {
            None => return self.finish_cancelled(),
            Some(Ok(stream)) => stream,
            Some(Err(e)) => {
                tracing::warn!(%kind, error = %e, "analysis request failed");
                let text = format!("{}: {e}", self.error_prefix());
                self.append_turn(TurnKind::System, text);
                self.set_state(SessionState::Failed);
                return;
            }
        };

        loop {
            let idle_timeout = self.idle_timeout;
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => NextItem::Cancelled,
                item = next_item(&mut stream, idle_timeout) => item,
            };

            match next {
                NextItem::Item(Ok(event)) => self.accept_event(event),
                NextItem::Item(Err(StreamError::Decode(e))) => {
                    tracing::warn!(%kind, error = %e, "skipping malformed stream event");
                }
                NextItem::Item(Err(StreamError::Transport(reason))) => {
                    tracing::warn!(%kind, %reason, "analysis stream interrupted");
                    let text = format!("{}: stream interrupted: {reason}", self.error_prefix());
                    self.append_turn(TurnKind::System, text);
                    break;
                }
                NextItem::Stalled(after) => {
                    tracing::warn!(%kind, secs = after.as_secs(), "analysis stream stalled");
                    let text = format!(
                        "{}: no data received for {}s, giving up",
                        self.error_prefix(),
                        after.as_secs()
                    );
                    self.append_turn(TurnKind::System, text);
                    break;
                }
                NextItem::End => break,
                NextItem::Cancelled => return self.finish_cancelled(),
            }
        }

        tracing::info!(
            %kind,
            turns = self.conversation.len(),
            score = ?self.report.as_ref().and_then(|r| r.score),
            "analysis stream completed"
        );
        self.set_state(SessionState::Completed);
    }

    fn accept_event(&mut self, event: StreamEvent) {
        if self.state == SessionState::Running {
            self.set_state(SessionState::Streaming);
        }

        if let Some(report) = extract_report(self.kind, &event.content) {
            tracing::info!(kind = %self.kind, score = ?report.score, "report extracted");
            self.report = Some(report.clone());
            self.emit(SessionUpdate::ReportUpdated(report));
        }

        let turn = self.conversation.push_event(event).clone();
        self.emit(SessionUpdate::TurnAppended(turn));
    }

    fn finish_cancelled(&mut self) {
        tracing::info!(kind = %self.kind, "analysis cancelled");
        self.append_turn(TurnKind::System, "Analysis cancelled.".to_string());
        self.set_state(SessionState::Cancelled);
    }

    fn error_prefix(&self) -> &'static str {
        match self.kind {
            AnalysisKind::RiskDetection => "Error during analysis",
            AnalysisKind::IntentMatch => "Error during match analysis",
        }
    }

    fn append_turn(&mut self, kind: TurnKind, text: String) {
        let turn = match kind {
            TurnKind::System => self.conversation.push_system(text),
            TurnKind::User => self.conversation.push_user(text),
            TurnKind::Assistant => self.conversation.push_assistant(text),
        }
        .clone();
        self.emit(SessionUpdate::TurnAppended(turn));
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            tracing::debug!(kind = %self.kind, from = %self.state, to = %state, "session state");
            self.state = state;
            self.emit(SessionUpdate::StateChanged(state));
        }
    }

    fn emit(&self, update: SessionUpdate) {
        if let Some(tx) = &self.updates {
            let _ = tx.send(update);
        }
    }
}

async fn next_item(stream: &mut EventStream, idle_timeout: Option<Duration>) -> NextItem {
    let next = match idle_timeout {
        Some(limit) => match tokio::time::timeout(limit, stream.next()).await {
            Ok(next) => next,
            Err(_) => return NextItem::Stalled(limit),
        },
        None => stream.next().await,
    };
    match next {
        Some(item) => NextItem::Item(item),
        None => NextItem::End,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::stream;
    use reqwest::StatusCode;

    use crate::analysis::{AI_MESSAGE_MARKER, AnalysisParams, decode_event_stream};
    use crate::error::AnalysisError;

    /// Replays canned response bytes for every request.
    struct ScriptedBackend {
        chunks: Vec<String>,
        fail_with: Option<StatusCode>,
        hang_after_chunks: bool,
        calls: AtomicUsize,
        seen: Mutex<Vec<AnalysisParams>>,
    }

    impl ScriptedBackend {
        fn streaming(chunks: &[&str]) -> Self {
            Self {
                chunks: chunks.iter().map(|c| c.to_string()).collect(),
                fail_with: None,
                hang_after_chunks: false,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing(status: StatusCode) -> Self {
            Self {
                fail_with: Some(status),
                ..Self::streaming(&[])
            }
        }

        fn hanging(chunks: &[&str]) -> Self {
            Self {
                hang_after_chunks: true,
                ..Self::streaming(chunks)
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AnalysisBackend for ScriptedBackend {
        async fn open_stream(
            &self,
            kind: AnalysisKind,
            params: &AnalysisParams,
        ) -> Result<EventStream, AnalysisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(params.clone());

            if let Some(status) = self.fail_with {
                return Err(AnalysisError::Status {
                    label: kind.failure_label(),
                    status,
                    status_text: status.canonical_reason().unwrap_or("").to_string(),
                    body: Some(serde_json::json!({"detail": "backend unavailable"})),
                });
            }

            let chunks = self
                .chunks
                .clone()
                .into_iter()
                .map(|c| Ok::<_, Infallible>(Bytes::from(c)));
            if self.hang_after_chunks {
                Ok(decode_event_stream(stream::iter(chunks).chain(stream::pending())))
            } else {
                Ok(decode_event_stream(stream::iter(chunks)))
            }
        }
    }

    fn data_line(content: &str) -> String {
        format!("data: {}\n", serde_json::json!({ "content": content }))
    }

    fn risk_report_line(score: u32) -> String {
        data_line(&format!(
            "{AI_MESSAGE_MARKER}\n```json\n{{\"title\": \"Transfer\", \"risk_score\": {score}, \"analysis\": \"ok\"}}\n```"
        ))
    }

    fn sample_tx() -> Transaction {
        Transaction {
            to: "0xdef".to_string(),
            value: Some("1000000000000000000".to_string()),
            safe_tx_hash: "0xabc".to_string(),
            ..Default::default()
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<SessionUpdate>) -> Vec<SessionState> {
        let mut states = Vec::new();
        while let Ok(update) = rx.try_recv() {
            if let SessionUpdate::StateChanged(state) = update {
                states.push(state);
            }
        }
        states
    }

    #[tokio::test]
    async fn risk_stream_appends_turns_in_order_and_extracts_report() {
        let a = data_line("A");
        let b = data_line("B");
        let report = risk_report_line(42);
        let backend = ScriptedBackend::streaming(&[&a, &b, &report]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut session = AnalysisSession::risk_detection("0xsafe", sample_tx()).with_updates(tx);

        let state = session.run(&backend, &CancellationToken::new()).await;

        assert_eq!(state, SessionState::Completed);
        let turns = session.conversation().turns();
        assert_eq!(turns.len(), 3);
        assert!(turns.iter().all(|t| t.kind == TurnKind::Assistant));
        assert_eq!(turns[0].text, "A");
        assert_eq!(turns[1].text, "B");
        assert!(turns[2].text.contains(AI_MESSAGE_MARKER));
        assert_eq!(session.report().and_then(|r| r.score), Some(42));
        assert_eq!(
            drain(&mut rx),
            vec![
                SessionState::Running,
                SessionState::Streaming,
                SessionState::Completed
            ]
        );
    }

    #[tokio::test]
    async fn invalid_report_block_keeps_previous_report() {
        let good = risk_report_line(80);
        let broken = data_line(&format!("{AI_MESSAGE_MARKER}\n```json\n{{oops\n```"));
        let no_block = data_line(&format!("{AI_MESSAGE_MARKER}\nplain text"));
        let backend = ScriptedBackend::streaming(&[&good, &broken, &no_block]);
        let mut session = AnalysisSession::risk_detection("0xsafe", sample_tx());

        session.run(&backend, &CancellationToken::new()).await;

        assert_eq!(session.state(), SessionState::Completed);
        assert_eq!(session.conversation().len(), 3);
        assert_eq!(session.report().and_then(|r| r.score), Some(80));
    }

    #[tokio::test]
    async fn completes_without_report_when_marker_block_is_invalid() {
        let broken = data_line(&format!("{AI_MESSAGE_MARKER}\n```json\nnot json\n```"));
        let backend = ScriptedBackend::streaming(&[&broken]);
        let mut session = AnalysisSession::risk_detection("0xsafe", sample_tx());

        let state = session.run(&backend, &CancellationToken::new()).await;

        assert_eq!(state, SessionState::Completed);
        assert!(session.report().is_none());
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped() {
        let a = data_line("A");
        let backend = ScriptedBackend::streaming(&["data: {broken\n", &a, "noise\n"]);
        let mut session = AnalysisSession::risk_detection("0xsafe", sample_tx());

        session.run(&backend, &CancellationToken::new()).await;

        assert_eq!(session.conversation().len(), 1);
        assert_eq!(session.conversation().turns()[0].text, "A");
    }

    #[tokio::test]
    async fn failed_request_appends_one_system_turn_and_never_streams() {
        let backend = ScriptedBackend::failing(StatusCode::BAD_GATEWAY);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut session = AnalysisSession::risk_detection("0xsafe", sample_tx()).with_updates(tx);

        let state = session.run(&backend, &CancellationToken::new()).await;

        assert_eq!(state, SessionState::Failed);
        let turns = session.conversation().turns();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].kind, TurnKind::System);
        assert!(
            turns[0]
                .text
                .starts_with("Error during analysis: Analysis failed: Bad Gateway")
        );
        let states = drain(&mut rx);
        assert_eq!(states, vec![SessionState::Running, SessionState::Failed]);
        assert!(!states.contains(&SessionState::Streaming));
    }

    #[tokio::test]
    async fn rerunning_risk_detection_starts_a_fresh_transcript() {
        let a = data_line("A");
        let backend = ScriptedBackend::streaming(&[&a]);
        let mut session = AnalysisSession::risk_detection("0xsafe", sample_tx());
        let cancel = CancellationToken::new();

        session.run(&backend, &cancel).await;
        session.run(&backend, &cancel).await;

        assert_eq!(backend.calls(), 2);
        assert_eq!(session.conversation().len(), 1);
    }

    #[tokio::test]
    async fn intent_flow_prompts_first_without_requesting() {
        let backend = ScriptedBackend::streaming(&[]);
        let mut session = AnalysisSession::intent_match("0xsafe", sample_tx());

        let state = session.run(&backend, &CancellationToken::new()).await;

        assert_eq!(state, SessionState::Idle);
        assert_eq!(backend.calls(), 0);
        assert_eq!(session.intent_gate(), &IntentGate::AwaitingIntent);
        let turns = session.conversation().turns();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].kind, TurnKind::Assistant);
        assert_eq!(turns[0].text, INTENT_PROMPT);

        // A second run click does not duplicate the prompt.
        session.run(&backend, &CancellationToken::new()).await;
        assert_eq!(session.conversation().len(), 1);
    }

    #[tokio::test]
    async fn intent_is_captured_once_and_requested_once() {
        let line = data_line(&format!(
            "{AI_MESSAGE_MARKER}\n```json\n{{\"match_score\": 91}}\n```"
        ));
        let backend = ScriptedBackend::streaming(&[&line]);
        let mut session = AnalysisSession::intent_match("0xsafe", sample_tx());
        let cancel = CancellationToken::new();

        session.run(&backend, &cancel).await;
        let state = session
            .submit_user_message("  pay the auditor  ", &backend, &cancel)
            .await;
        assert_eq!(state, SessionState::Completed);
        assert_eq!(session.intent(), Some("pay the auditor"));
        assert_eq!(session.report().and_then(|r| r.score), Some(91));

        for follow_up in ["actually, it's rent", "are you sure?", "hello?"] {
            session.submit_user_message(follow_up, &backend, &cancel).await;
        }

        assert_eq!(backend.calls(), 1);
        assert_eq!(session.requests_issued(), 1);
        assert_eq!(session.intent(), Some("pay the auditor"));
        assert_eq!(session.conversation().count(TurnKind::User), 4);

        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen[0].get("intent"), Some("pay the auditor"));
    }

    #[tokio::test]
    async fn user_message_before_prompt_does_not_capture_intent() {
        let backend = ScriptedBackend::streaming(&[]);
        let mut session = AnalysisSession::intent_match("0xsafe", sample_tx());

        session
            .submit_user_message("early words", &backend, &CancellationToken::new())
            .await;

        assert_eq!(backend.calls(), 0);
        assert_eq!(session.intent_gate(), &IntentGate::Unprompted);
    }

    #[tokio::test]
    async fn blank_user_message_is_ignored() {
        let backend = ScriptedBackend::streaming(&[]);
        let mut session = AnalysisSession::intent_match("0xsafe", sample_tx());
        let cancel = CancellationToken::new();

        session.run(&backend, &cancel).await;
        session.submit_user_message("   ", &backend, &cancel).await;

        assert_eq!(session.intent_gate(), &IntentGate::AwaitingIntent);
        assert_eq!(session.conversation().len(), 1);
    }

    #[tokio::test]
    async fn intent_failure_uses_match_prefix() {
        let backend = ScriptedBackend::failing(StatusCode::INTERNAL_SERVER_ERROR);
        let mut session = AnalysisSession::intent_match("0xsafe", sample_tx());
        let cancel = CancellationToken::new();

        session.run(&backend, &cancel).await;
        let state = session.submit_user_message("swap", &backend, &cancel).await;

        assert_eq!(state, SessionState::Failed);
        let last = session.conversation().last().unwrap();
        assert_eq!(last.kind, TurnKind::System);
        assert!(last.text.starts_with("Error during match analysis: Match analysis failed"));
    }

    #[tokio::test]
    async fn cancellation_before_request_issues_nothing_further() {
        let backend = ScriptedBackend::streaming(&[]);
        let mut session = AnalysisSession::risk_detection("0xsafe", sample_tx());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let state = session.run(&backend, &cancel).await;

        assert_eq!(state, SessionState::Cancelled);
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn cancellation_mid_stream_stops_reading() {
        let a = data_line("A");
        let backend = ScriptedBackend::hanging(&[&a]);
        let mut session = AnalysisSession::risk_detection("0xsafe", sample_tx());
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let state = session.run(&backend, &cancel).await;

        assert_eq!(state, SessionState::Cancelled);
        assert_eq!(session.conversation().count(TurnKind::Assistant), 1);
        assert_eq!(
            session.conversation().last().map(|t| t.kind),
            Some(TurnKind::System)
        );
    }

    #[tokio::test]
    async fn idle_timeout_completes_with_notice() {
        let a = data_line("A");
        let backend = ScriptedBackend::hanging(&[&a]);
        let mut session = AnalysisSession::risk_detection("0xsafe", sample_tx())
            .with_idle_timeout(Some(Duration::from_millis(50)));

        let state = session.run(&backend, &CancellationToken::new()).await;

        assert_eq!(state, SessionState::Completed);
        let last = session.conversation().last().unwrap();
        assert_eq!(last.kind, TurnKind::System);
        assert!(last.text.contains("no data received"));
    }
}
