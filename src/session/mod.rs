//! Kiosk session management
//!
//! This module provides the `SessionStateMachine` that drives:
//! - Face identification and the personalised greeting
//! - Voice and typed conversation turns
//! - Two-step confirmations of backend actions
//! - SOS calls and the emergency stop

mod config;
mod machine;
mod state;
mod transcript;

pub use config::SessionConfig;
pub use machine::{
    SessionDeps, SessionHandle, SessionStateMachine, UiIntent, EMERGENCY_STOP_TEXT,
    SOS_COMMAND_TEXT,
};
pub use state::{Affect, Notice, Phase, Session, SessionSnapshot, Status, GUEST_USER_ID};
pub use transcript::{
    AnswerError, EntryKind, PendingConfirmation, Sender, Transcript, TranscriptEntry,
};
