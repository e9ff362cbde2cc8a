//! Append-only conversation transcript.

use serde::Serialize;

use crate::analysis::StreamEvent;

/// Who a turn is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnKind {
    System,
    User,
    Assistant,
}

impl TurnKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One entry in the transcript.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationTurn {
    pub kind: TurnKind,
    pub text: String,
    /// The stream event an assistant turn was built from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_event: Option<StreamEvent>,
}

/// Ordered turns. Existing turns are never edited.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    turns: Vec<ConversationTurn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_system(&mut self, text: impl Into<String>) -> &ConversationTurn {
        self.push(TurnKind::System, text.into(), None)
    }

    pub fn push_user(&mut self, text: impl Into<String>) -> &ConversationTurn {
        self.push(TurnKind::User, text.into(), None)
    }

    pub fn push_assistant(&mut self, text: impl Into<String>) -> &ConversationTurn {
        self.push(TurnKind::Assistant, text.into(), None)
    }

    /// Append an assistant turn carrying the event it came from.
    pub fn push_event(&mut self, event: StreamEvent) -> &ConversationTurn {
        let text = event.content.clone();
        self.push(TurnKind::Assistant, text, Some(event))
    }

    fn push(
        &mut self,
        kind: TurnKind,
        text: String,
        raw_event: Option<StreamEvent>,
    ) -> &ConversationTurn {
        self.turns.push(ConversationTurn {
            kind,
            text,
            raw_event,
        });
        &self.turns[self.turns.len() - 1]
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&ConversationTurn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Count of turns of one kind.
    pub fn count(&self, kind: TurnKind) -> usize {
        self.turns.iter().filter(|t| t.kind == kind).count()
    }

    /// Drop the whole transcript (a fresh risk run starts empty).
    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turns_keep_insertion_order() {
        let mut conversation = Conversation::new();
        conversation.push_assistant("What is your intent with this transaction?");
        conversation.push_user("pay rent");
        conversation.push_event(StreamEvent::new("thinking"));
        conversation.push_system("Error during analysis: boom");

        let kinds: Vec<_> = conversation.turns().iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TurnKind::Assistant,
                TurnKind::User,
                TurnKind::Assistant,
                TurnKind::System
            ]
        );
        assert_eq!(conversation.count(TurnKind::Assistant), 2);
        assert!(conversation.turns()[2].raw_event.is_some());
        assert!(conversation.turns()[0].raw_event.is_none());
    }
}
