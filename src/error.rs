//! Error types for the kiosk session core

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for session core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Hardware whose access needs a user grant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Peripheral {
    Camera,
    Microphone,
}

impl fmt::Display for Peripheral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Camera => f.write_str("camera"),
            Self::Microphone => f.write_str("microphone"),
        }
    }
}

/// Errors that can occur while running a kiosk session
#[derive(Debug, Error)]
pub enum Error {
    /// Camera or microphone access was refused
    #[error("{0} permission denied")]
    PermissionDenied(Peripheral),

    /// Audio path reconfiguration failed
    #[error("audio path reconfiguration failed: {0}")]
    HardwareConfig(String),

    /// No active protocol connection
    #[error("protocol channel unavailable")]
    ChannelUnavailable,

    /// Recording, finalizing or uploading failed
    #[error("speech capture failed: {0}")]
    Capture(String),

    /// Speech output failed
    #[error("speech synthesis failed: {0}")]
    Synthesis(String),

    /// The audio path is held by another activity
    #[error("audio path busy: {0}")]
    AudioPathBusy(&'static str),

    /// Malformed or unexpected protocol traffic
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The session controller task is gone
    #[error("session controller has stopped")]
    SessionClosed,

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
