use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::audio::AudioTimings;
use crate::language::Language;
use crate::session::SessionConfig;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub devices: DevicesConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8765,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub nats_url: String,
    /// Subjects are `<prefix>.out.<event>` and `<prefix>.in.<event>`
    pub subject_prefix: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            nats_url: "nats://localhost:4222".to_string(),
            subject_prefix: "kiosk".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub language: Language,
    pub upload_format: String,
    pub frame_interval_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        let defaults = SessionConfig::default();
        Self {
            language: defaults.language,
            upload_format: defaults.upload_format,
            frame_interval_ms: defaults.frame_interval.as_millis() as u64,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    /// Directory the recorder writes utterances into
    #[serde(default = "default_recordings_path")]
    pub recordings_path: PathBuf,
    #[serde(flatten)]
    pub timings: AudioTimings,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            recordings_path: default_recordings_path(),
            timings: AudioTimings::default(),
        }
    }
}

fn default_recordings_path() -> PathBuf {
    std::env::temp_dir().join("blossom-kiosk")
}

/// External commands backing the device adapters
///
/// Arguments may contain `{text}`, `{lang}`, `{rate}`, `{pitch}` and
/// `{path}` placeholders.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DevicesConfig {
    /// Speaks `{text}`; exits when done
    pub speak: Vec<String>,
    /// Records into `{path}` until terminated
    pub record: Vec<String>,
    /// Writes one JPEG frame to stdout
    pub snapshot: Vec<String>,
    /// Plays the file at `{path}` once
    pub cue_player: Vec<String>,
    /// Run before speech output; empty for none
    pub playback_route: Vec<String>,
    /// Run before recording; empty for none
    pub capture_route: Vec<String>,
}

impl Default for DevicesConfig {
    fn default() -> Self {
        let args = |list: &[&str]| list.iter().map(|s| s.to_string()).collect();

        Self {
            speak: args(&["espeak-ng", "-v", "{lang}", "{text}"]),
            record: args(&["arecord", "-q", "-f", "S16_LE", "-r", "16000", "{path}"]),
            snapshot: args(&["fswebcam", "-q", "--no-banner", "--jpeg", "85", "-"]),
            cue_player: args(&["mpg123", "-q", "{path}"]),
            playback_route: Vec::new(),
            capture_route: Vec::new(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("BLOSSOM").separator("__"))
            .build()
            .with_context(|| format!("failed to read config {}", path))?;

        settings
            .try_deserialize()
            .context("invalid configuration")
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            language: self.session.language,
            upload_format: self.session.upload_format.clone(),
            frame_interval: Duration::from_millis(self.session.frame_interval_ms.max(1)),
            timings: self.audio.timings.clone(),
        }
    }
}
