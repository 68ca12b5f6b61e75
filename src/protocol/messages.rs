use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::language::Language;

pub const IDENTIFY_FRAME: &str = "identify-frame";
pub const COMMAND: &str = "command";
pub const ACTION_CONFIRM: &str = "action-confirm";
pub const PAUSE: &str = "pause";
pub const AUDIO_UPLOAD: &str = "audio-upload";

pub const AUTH_SUCCESS: &str = "auth-success";
pub const AUTH_FAIL: &str = "auth-fail";
pub const USER_SPEECH: &str = "user-speech";
pub const COMMAND_RESPONSE: &str = "command-response";

/// Camera frame submitted for face identification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyFrame {
    pub image: String, // Base64-encoded JPEG
    pub lang: Language,
}

/// Free-text command (typed, or the fixed SOS text)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandMessage {
    pub user_id: String,
    pub text: String,
    pub lang: Language,
}

/// Positive answer to a confirmable response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionConfirmMessage {
    pub user_id: String,
    pub command: String,
    pub lang: Language,
}

/// Emergency stop
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PauseMessage {
    pub user_id: String,
    pub text: String,
    pub lang: Language,
}

/// Recorded utterance for server-side transcription
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioUploadMessage {
    pub audio_data: String, // Base64-encoded recording
    pub format: String,
    pub user_id: String,
    pub lang: Language,
}

/// Intents sent to the backend
#[derive(Debug, Clone)]
pub enum OutboundIntent {
    IdentifyFrame(IdentifyFrame),
    Command(CommandMessage),
    ActionConfirm(ActionConfirmMessage),
    Pause(PauseMessage),
    AudioUpload(AudioUploadMessage),
}

impl OutboundIntent {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::IdentifyFrame(_) => IDENTIFY_FRAME,
            Self::Command(_) => COMMAND,
            Self::ActionConfirm(_) => ACTION_CONFIRM,
            Self::Pause(_) => PAUSE,
            Self::AudioUpload(_) => AUDIO_UPLOAD,
        }
    }

    pub fn lang(&self) -> Language {
        match self {
            Self::IdentifyFrame(m) => m.lang,
            Self::Command(m) => m.lang,
            Self::ActionConfirm(m) => m.lang,
            Self::Pause(m) => m.lang,
            Self::AudioUpload(m) => m.lang,
        }
    }

    /// JSON payload as sent on the wire
    pub fn payload(&self) -> Result<Vec<u8>> {
        let payload = match self {
            Self::IdentifyFrame(m) => serde_json::to_vec(m)?,
            Self::Command(m) => serde_json::to_vec(m)?,
            Self::ActionConfirm(m) => serde_json::to_vec(m)?,
            Self::Pause(m) => serde_json::to_vec(m)?,
            Self::AudioUpload(m) => serde_json::to_vec(m)?,
        };
        Ok(payload)
    }
}

/// Backend identified the user in front of the camera
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSuccess {
    pub id: String,
    pub name: String,
}

/// Server-side transcription of an uploaded utterance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSpeech {
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    #[default]
    Simple,
    #[serde(rename = "confirm")]
    Confirmable,
    /// Anything newer than this client understands; handled as simple
    #[serde(other)]
    Unknown,
}

/// Assistant reply to a command or an uploaded utterance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub text: String,
    #[serde(rename = "type", default)]
    pub kind: ResponseKind,
    #[serde(default)]
    pub meta: Option<Value>,
    #[serde(default)]
    pub recognized_text: Option<String>,
}

impl CommandResponse {
    pub fn is_confirmable(&self) -> bool {
        self.kind == ResponseKind::Confirmable
    }

    /// Action to send back if the user confirms
    ///
    /// A string `meta` is the action itself; any other value is passed
    /// through as compact JSON.
    pub fn action_token(&self) -> Option<String> {
        match self.meta.as_ref()? {
            Value::Null => None,
            Value::String(token) => Some(token.clone()),
            other => Some(other.to_string()),
        }
    }

    /// What the backend heard, if it says so
    pub fn recognized_text(&self) -> Option<&str> {
        self.recognized_text
            .as_deref()
            .or_else(|| {
                self.meta
                    .as_ref()
                    .and_then(|meta| meta.get("recognized_text"))
                    .and_then(Value::as_str)
            })
            .filter(|text| !text.trim().is_empty())
    }
}

/// Events received from the backend
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    AuthSuccess(AuthSuccess),
    AuthFail,
    UserSpeech(UserSpeech),
    CommandResponse(CommandResponse),
}

impl InboundEvent {
    /// Decode a raw event; `Ok(None)` for events this client does not handle
    pub fn parse(event: &str, payload: &[u8]) -> Result<Option<Self>> {
        let decoded = match event {
            AUTH_SUCCESS => Self::AuthSuccess(decode(event, payload)?),
            AUTH_FAIL => Self::AuthFail,
            USER_SPEECH => Self::UserSpeech(decode(event, payload)?),
            COMMAND_RESPONSE => Self::CommandResponse(decode(event, payload)?),
            _ => return Ok(None),
        };
        Ok(Some(decoded))
    }
}

fn decode<T: serde::de::DeserializeOwned>(event: &str, payload: &[u8]) -> Result<T> {
    serde_json::from_slice(payload)
        .map_err(|e| Error::Protocol(format!("malformed {} payload: {}", event, e)))
}
