pub mod arbiter;
pub mod backend;
pub mod capture;
pub mod speech;

pub use arbiter::{AudioModeArbiter, AudioPathState, PathActivity, PathClaim};
pub use backend::{AudioDevice, AudioMode, AudioTimings, SilentCue};
pub use capture::{CaptureState, Microphone, RecordingArtifact, SpeechCapturePipeline};
pub use speech::{SpeechFinished, SpeechOutcome, SpeechOutputPlayer, SpeechSynthesizer, UtteranceId};
