pub mod audio;
pub mod auth;
pub mod config;
pub mod device;
pub mod error;
pub mod http;
pub mod language;
pub mod protocol;
pub mod session;

pub use audio::{
    AudioDevice, AudioMode, AudioModeArbiter, AudioTimings, CaptureState, Microphone,
    PathActivity, SilentCue, SpeechCapturePipeline, SpeechOutputPlayer, SpeechSynthesizer,
};
pub use auth::{AuthCaptureLoop, Camera};
pub use config::Config;
pub use error::{Error, Peripheral, Result};
pub use http::{create_router, AppState};
pub use language::Language;
pub use protocol::{CommandProtocolClient, EventChannel, InboundEvent, NatsChannel, RawEvent};
pub use session::{
    Phase, SessionConfig, SessionDeps, SessionHandle, SessionSnapshot, SessionStateMachine,
    UiIntent,
};
