use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};

use super::arbiter::{AudioModeArbiter, PathClaim};
use crate::error::{Error, Peripheral, Result};
use crate::language::Language;
use crate::protocol::CommandProtocolClient;

/// Microphone recorder
///
/// Encoding happens inside the implementation; the pipeline only sees the
/// finished file.
#[async_trait::async_trait]
pub trait Microphone: Send + Sync {
    /// Ask for (or confirm) microphone access
    async fn request_permission(&self) -> anyhow::Result<bool>;

    /// Begin recording into a new file and return its location
    async fn start_recording(&self) -> anyhow::Result<PathBuf>;

    /// Stop the current recording and flush it to disk
    async fn stop_recording(&self) -> anyhow::Result<()>;
}

/// Lifecycle of the capture pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureState {
    #[default]
    Idle,
    RequestingPermission,
    Recording,
    Finalizing,
    Uploading,
    Error,
}

/// A recorded utterance on disk
///
/// Consumed exactly once: reading the payload removes the file.
#[derive(Debug)]
pub struct RecordingArtifact {
    location: PathBuf,
    started_at: DateTime<Utc>,
    size: Option<u64>,
}

impl RecordingArtifact {
    pub fn new(location: PathBuf) -> Self {
        Self {
            location,
            started_at: Utc::now(),
            size: None,
        }
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Size in bytes, known once finalized
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    /// Confirm the recorder left a readable file behind
    pub async fn finalize(&mut self) -> Result<u64> {
        let metadata = tokio::fs::metadata(&self.location).await.map_err(|e| {
            Error::Capture(format!(
                "recording {} not readable: {}",
                self.location.display(),
                e
            ))
        })?;

        self.size = Some(metadata.len());
        Ok(metadata.len())
    }

    /// Read the payload and delete the file
    pub async fn consume(self) -> Result<Vec<u8>> {
        let payload = tokio::fs::read(&self.location).await;
        self.discard().await;

        payload.map_err(|e| Error::Capture(format!("failed to read recording: {}", e)))
    }

    /// Delete the file without reading it
    pub async fn discard(self) {
        if let Err(e) = tokio::fs::remove_file(&self.location).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    "Failed to remove recording {}: {}",
                    self.location.display(),
                    e
                );
            }
        }
    }
}

struct ActiveCapture {
    artifact: RecordingArtifact,
    claim: PathClaim,
}

/// Microphone lifecycle: record, finalize, prime the speaker, upload
pub struct SpeechCapturePipeline {
    microphone: Arc<dyn Microphone>,
    arbiter: Arc<AudioModeArbiter>,
    protocol: Arc<CommandProtocolClient>,
    upload_format: String,
    state: watch::Sender<CaptureState>,
    active: Mutex<Option<ActiveCapture>>,
}

impl SpeechCapturePipeline {
    pub fn new(
        microphone: Arc<dyn Microphone>,
        arbiter: Arc<AudioModeArbiter>,
        protocol: Arc<CommandProtocolClient>,
        upload_format: impl Into<String>,
    ) -> Self {
        let (state, _) = watch::channel(CaptureState::Idle);

        Self {
            microphone,
            arbiter,
            protocol,
            upload_format: upload_format.into(),
            state,
            active: Mutex::new(None),
        }
    }

    pub fn state(&self) -> CaptureState {
        *self.state.borrow()
    }

    /// Watch pipeline state changes
    pub fn subscribe(&self) -> watch::Receiver<CaptureState> {
        self.state.subscribe()
    }

    /// Start recording the user
    pub async fn start_capture(&self) -> Result<()> {
        let mut active = self.active.lock().await;
        if active.is_some() || self.state() != CaptureState::Idle {
            return Err(Error::AudioPathBusy("capture already active"));
        }

        info!("Starting speech capture");
        self.set_state(CaptureState::RequestingPermission);

        match self.microphone.request_permission().await {
            Ok(true) => {}
            Ok(false) => {
                warn!("Microphone permission denied");
                self.set_state(CaptureState::Idle);
                return Err(Error::PermissionDenied(Peripheral::Microphone));
            }
            Err(e) => {
                return Err(self.fail(Error::Capture(format!(
                    "permission request failed: {:#}",
                    e
                ))));
            }
        }

        let claim = match self.arbiter.claim_for_capture() {
            Ok(claim) => claim,
            Err(e) => {
                self.set_state(CaptureState::Idle);
                return Err(e);
            }
        };

        if let Err(e) = self.arbiter.enter_capture_mode().await {
            return Err(self.fail(e));
        }

        let location = match self.microphone.start_recording().await {
            Ok(location) => location,
            Err(e) => {
                return Err(self.fail(Error::Capture(format!(
                    "failed to start recording: {:#}",
                    e
                ))));
            }
        };

        info!("Recording into {}", location.display());
        *active = Some(ActiveCapture {
            artifact: RecordingArtifact::new(location),
            claim,
        });
        self.set_state(CaptureState::Recording);

        Ok(())
    }

    /// Stop recording, prime the speaker and upload the utterance
    ///
    /// `language` is read when the upload is emitted. Returns `Ok(false)`
    /// when no recording was active.
    pub async fn stop_capture(
        &self,
        user_id: &str,
        language: watch::Receiver<Language>,
    ) -> Result<bool> {
        let Some(capture) = self.active.lock().await.take() else {
            warn!("Stop requested with no active recording");
            return Ok(false);
        };

        info!("Stopping speech capture");
        self.set_state(CaptureState::Finalizing);

        match self.finish(capture, user_id, language).await {
            Ok(()) => {
                self.set_state(CaptureState::Idle);
                Ok(true)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Drop a live recording without uploading it
    pub async fn abort_capture(&self) -> bool {
        let Some(capture) = self.active.lock().await.take() else {
            return false;
        };

        info!("Aborting speech capture");
        if let Err(e) = self.microphone.stop_recording().await {
            warn!("Failed to stop recorder during abort: {:#}", e);
        }
        capture.artifact.discard().await;
        drop(capture.claim);
        self.set_state(CaptureState::Idle);

        true
    }

    async fn finish(
        &self,
        capture: ActiveCapture,
        user_id: &str,
        language: watch::Receiver<Language>,
    ) -> Result<()> {
        let ActiveCapture {
            mut artifact,
            claim,
        } = capture;
        let timings = self.arbiter.timings().clone();

        if let Err(e) = self.microphone.stop_recording().await {
            artifact.discard().await;
            return Err(Error::Capture(format!("failed to stop recording: {:#}", e)));
        }

        let size = match artifact.finalize().await {
            Ok(size) => size,
            Err(e) => {
                artifact.discard().await;
                return Err(e);
            }
        };
        info!(
            "Recording finalized: {} ({} bytes, started {})",
            artifact.location().display(),
            size,
            artifact.started_at().to_rfc3339()
        );

        tokio::time::sleep(timings.hardware_release()).await;

        if let Err(e) = self.arbiter.restart_engine().await {
            warn!("Failed to restart audio engine after capture: {}", e);
        }
        tokio::time::sleep(timings.engine_restart_settle()).await;

        // An output path left idle after capture drops the opening words
        // of the next utterance
        self.arbiter.warm_up(timings.warmup_settle()).await;
        drop(claim);

        self.set_state(CaptureState::Uploading);
        let payload = artifact.consume().await?;
        let lang = *language.borrow();

        self.protocol
            .emit_audio_upload(&payload, &self.upload_format, user_id, lang)
            .await
            .map_err(|e| Error::Capture(format!("upload failed: {}", e)))?;

        info!("Uploaded {} bytes of {} audio", payload.len(), self.upload_format);
        Ok(())
    }

    fn fail(&self, err: Error) -> Error {
        error!("Speech capture failed: {}", err);
        self.set_state(CaptureState::Error);
        self.set_state(CaptureState::Idle);
        err
    }

    fn set_state(&self, state: CaptureState) {
        self.state.send_replace(state);
    }
}
