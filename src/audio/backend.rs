use std::fmt;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Configuration of the shared hardware audio path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioMode {
    /// Nothing applied yet since startup
    #[default]
    Uninitialized,
    /// Routed to the speaker for speech output
    Playback,
    /// Routed from the microphone for recording
    Capture,
}

impl fmt::Display for AudioMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => f.write_str("uninitialized"),
            Self::Playback => f.write_str("playback"),
            Self::Capture => f.write_str("capture"),
        }
    }
}

/// Settle delays around audio path switches
///
/// Values are empirically tuned for a TV-class speaker reached over
/// screen mirroring; slower sinks need larger values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioTimings {
    /// Wait after forcing playback before speech starts
    pub playback_settle_ms: u64,
    /// Wait after disabling the engine, before reconfiguring for capture
    pub engine_disable_settle_ms: u64,
    /// Wait after re-enabling the engine in capture mode
    pub engine_enable_settle_ms: u64,
    /// Wait for the recorder to release the hardware after stopping
    pub hardware_release_ms: u64,
    /// Wait after re-enabling the engine once capture is over
    pub engine_restart_settle_ms: u64,
    /// Wait after the warm-up cue following a capture
    pub warmup_settle_ms: u64,
    /// Wait after the warm-up cue preceding the greeting
    pub greeting_warmup_settle_ms: u64,
}

impl Default for AudioTimings {
    fn default() -> Self {
        Self {
            playback_settle_ms: 200,
            engine_disable_settle_ms: 50,
            engine_enable_settle_ms: 100,
            hardware_release_ms: 300,
            engine_restart_settle_ms: 500,
            warmup_settle_ms: 1000,
            greeting_warmup_settle_ms: 800,
        }
    }
}

impl AudioTimings {
    /// All delays zeroed, for hardware that switches instantly
    pub fn immediate() -> Self {
        Self {
            playback_settle_ms: 0,
            engine_disable_settle_ms: 0,
            engine_enable_settle_ms: 0,
            hardware_release_ms: 0,
            engine_restart_settle_ms: 0,
            warmup_settle_ms: 0,
            greeting_warmup_settle_ms: 0,
        }
    }

    pub fn playback_settle(&self) -> Duration {
        Duration::from_millis(self.playback_settle_ms)
    }

    pub fn engine_disable_settle(&self) -> Duration {
        Duration::from_millis(self.engine_disable_settle_ms)
    }

    pub fn engine_enable_settle(&self) -> Duration {
        Duration::from_millis(self.engine_enable_settle_ms)
    }

    pub fn hardware_release(&self) -> Duration {
        Duration::from_millis(self.hardware_release_ms)
    }

    pub fn engine_restart_settle(&self) -> Duration {
        Duration::from_millis(self.engine_restart_settle_ms)
    }

    pub fn warmup_settle(&self) -> Duration {
        Duration::from_millis(self.warmup_settle_ms)
    }

    pub fn greeting_warmup_settle(&self) -> Duration {
        Duration::from_millis(self.greeting_warmup_settle_ms)
    }
}

/// Low-level control of the device audio session
///
/// Implementations:
/// - `device::CommandAudioDevice`: route hooks and cue player run as external commands
/// - test fakes that record every call
#[async_trait::async_trait]
pub trait AudioDevice: Send + Sync {
    /// Apply the routing for `mode`
    async fn configure(&self, mode: AudioMode) -> Result<()>;

    /// Toggle the whole audio engine
    async fn set_enabled(&self, enabled: bool) -> Result<()>;

    /// Load an audio cue, optionally starting playback right away
    async fn load_cue(&self, data: &[u8], play_immediately: bool) -> Result<Box<dyn SilentCue>>;

    /// Get device name for logging
    fn name(&self) -> &str;
}

/// A loaded, replayable audio cue
#[async_trait::async_trait]
pub trait SilentCue: Send + Sync {
    /// Play the cue from the beginning
    async fn replay(&self) -> Result<()>;

    /// Release the cue's resources
    async fn unload(&self) -> Result<()>;
}
