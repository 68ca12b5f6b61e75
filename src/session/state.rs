use serde::{Deserialize, Serialize};

use crate::audio::CaptureState;
use crate::error::Peripheral;
use crate::language::Language;

use super::transcript::{PendingConfirmation, TranscriptEntry};

/// User id used until the backend identifies someone
pub const GUEST_USER_ID: &str = "guest";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Unauthenticated,
    Authenticating,
    Idle,
    Listening,
    AwaitingBackend,
    AwaitingConfirmation,
    Emergency,
}

/// Status line shown next to the robot face
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Idle,
    Scanning,
    Welcome,
    Waiting,
    Listening,
    Processing,
    Thinking,
    SendFailed,
    Error,
    Emergency,
    EmergencyStop,
}

/// Expression of the robot face
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Affect {
    #[default]
    Happy,
    Listening,
    Thinking,
    Error,
}

/// Blocking notice the UI must show
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    PermissionDenied { peripheral: Peripheral },
}

/// Identity and phase of the person at the kiosk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub display_name: String,
    pub language: Language,
    pub phase: Phase,
}

impl Session {
    pub fn new(language: Language) -> Self {
        Self {
            user_id: GUEST_USER_ID.to_string(),
            display_name: String::new(),
            language,
            phase: Phase::Unauthenticated,
        }
    }
}

/// Everything the UI needs to render the session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    #[serde(flatten)]
    pub session: Session,
    pub status: Status,
    pub affect: Affect,
    pub speaking: bool,
    pub capturing: bool,
    pub capture_state: CaptureState,
    pub sos_prompt_open: bool,
    pub notice: Option<Notice>,
    pub pending_confirmation: Option<PendingConfirmation>,
    pub transcript: Vec<TranscriptEntry>,
}

impl SessionSnapshot {
    pub fn phase(&self) -> Phase {
        self.session.phase
    }

    pub fn last_entry(&self) -> Option<&TranscriptEntry> {
        self.transcript.last()
    }
}
