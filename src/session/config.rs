use std::time::Duration;

use crate::audio::AudioTimings;
use crate::auth::DEFAULT_FRAME_INTERVAL;
use crate::language::Language;

/// Configuration for a kiosk session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Language the session starts in
    pub language: Language,

    /// Format tag attached to uploaded recordings
    /// Default: "m4a"
    pub upload_format: String,

    /// Interval between identification frames while scanning
    /// Default: 1.5 seconds
    pub frame_interval: Duration,

    /// Settle delays around audio path switches
    pub timings: AudioTimings,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            language: Language::Korean,
            upload_format: "m4a".to_string(),
            frame_interval: DEFAULT_FRAME_INTERVAL,
            timings: AudioTimings::default(),
        }
    }
}
