use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Who said a transcript line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Simple,
    /// Needs a yes/no from the user before anything happens
    Confirmable,
}

/// A single line of the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub id: Uuid,

    pub sender: Sender,

    pub text: String,

    pub kind: EntryKind,

    /// Action sent back on confirmation
    pub pending_action: Option<String>,

    /// Whether a confirmable entry has been answered
    pub resolved: bool,

    /// Whether an emergency dropped this confirmation unanswered
    pub abandoned: bool,

    pub created_at: DateTime<Utc>,
}

/// The confirmation the UI currently offers yes/no for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingConfirmation {
    pub transcript_entry_id: Uuid,
    pub action_token: String,
}

/// Why an answer could not be applied
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnswerError {
    #[error("no transcript entry {0}")]
    NotFound(Uuid),
    #[error("entry {0} does not ask for confirmation")]
    NotConfirmable(Uuid),
    #[error("entry {0} was already answered")]
    AlreadyResolved(Uuid),
    #[error("entry {0} was abandoned by an emergency")]
    Abandoned(Uuid),
}

/// Conversation transcript, append-only except for answer bookkeeping
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sender: Sender, text: impl Into<String>) -> Uuid {
        self.append(sender, text.into(), EntryKind::Simple, None)
    }

    pub fn push_confirmable(&mut self, text: impl Into<String>, action: Option<String>) -> Uuid {
        self.append(Sender::Assistant, text.into(), EntryKind::Confirmable, action)
    }

    /// Mark a confirmable entry answered, returning its action
    ///
    /// An entry can be answered once; abandoned entries cannot be answered.
    pub fn resolve(&mut self, id: Uuid) -> Result<Option<String>, AnswerError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|entry| entry.id == id)
            .ok_or(AnswerError::NotFound(id))?;

        if entry.kind != EntryKind::Confirmable {
            return Err(AnswerError::NotConfirmable(id));
        }
        if entry.resolved {
            return Err(AnswerError::AlreadyResolved(id));
        }
        if entry.abandoned {
            return Err(AnswerError::Abandoned(id));
        }

        entry.resolved = true;
        Ok(entry.pending_action.clone())
    }

    /// Drop an unanswered confirmation without resolving it
    pub fn abandon(&mut self, id: Uuid) -> bool {
        match self.entries.iter_mut().find(|entry| entry.id == id) {
            Some(entry) if entry.kind == EntryKind::Confirmable && !entry.resolved => {
                entry.abandoned = true;
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, id: Uuid) -> Option<&TranscriptEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&TranscriptEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn append(
        &mut self,
        sender: Sender,
        text: String,
        kind: EntryKind,
        pending_action: Option<String>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.entries.push(TranscriptEntry {
            id,
            sender,
            text,
            kind,
            pending_action,
            resolved: false,
            abandoned: false,
            created_at: Utc::now(),
        });
        id
    }
}
