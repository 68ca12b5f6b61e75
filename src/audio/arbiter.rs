//! Ownership of the single shared audio path
//!
//! The arbiter is the only component that reconfigures the hardware or
//! changes `AudioPathState`. Speech output and microphone capture claim the
//! path through it, so at most one of them is active at any instant.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};

use super::backend::{AudioDevice, AudioMode, AudioTimings, SilentCue};
use crate::error::{Error, Result};

/// Near-silent MP3 replayed to force the output path open
const SILENT_CUE_MP3: &str = "SUQzBAAAAAAAI1RTU0UAAAAPAAADTGF2ZjU4LjI5LjEwMAAAAAAAAAAAAAAA//OEAAAAAAAAAAAAAAAAAAAAAAAASW5mbwAAAA8AAAAEAAABIADAwMDAwMDAwMDAwMDAwMDAwMDAwMDAwMD//////////////////////////////////////////////////////////////////wAAAAAATGF2YzU4LjU0AAAAAAAAAAAAAAAAJAAAAAAAAAAAASAA82xZAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA//OEZAAAAAAIAAAAAIQAASAAAAAAAAAAAA0OVmn/+5BAAAABuYywAAAAAxlQAAAAEBQWAAAAAAAkAQAAAAAAABABAAAAAAAAAAAAAA//OEZAAAAAAIAAAAAIQAASAAAAAAAAAAAA0OVmn/+5BAAAABuYywAAAAAxlQAAAAEBQWAAAAAAAkAQAAAAAAABABAAAAAAAAAAAAAA";

/// Current configuration of the audio path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AudioPathState {
    pub mode: AudioMode,
}

/// What currently holds the audio path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathActivity {
    #[default]
    Idle,
    Speaking,
    Capturing,
}

/// Scoped hold on the audio path; the path returns to idle on drop
#[derive(Debug)]
pub struct PathClaim {
    activity: Arc<watch::Sender<PathActivity>>,
    held: PathActivity,
}

impl PathClaim {
    pub fn activity(&self) -> PathActivity {
        self.held
    }
}

impl Drop for PathClaim {
    fn drop(&mut self) {
        let held = self.held;
        self.activity.send_if_modified(|current| {
            if *current == held {
                *current = PathActivity::Idle;
                true
            } else {
                false
            }
        });
    }
}

pub struct AudioModeArbiter {
    device: Arc<dyn AudioDevice>,
    timings: AudioTimings,
    state: watch::Sender<AudioPathState>,
    activity: Arc<watch::Sender<PathActivity>>,
    /// Serializes hardware transitions
    transition: Mutex<()>,
    cue: Mutex<Option<Box<dyn SilentCue>>>,
}

impl AudioModeArbiter {
    pub fn new(device: Arc<dyn AudioDevice>, timings: AudioTimings) -> Self {
        info!("Audio arbiter initialized for device: {}", device.name());

        let (state, _) = watch::channel(AudioPathState::default());
        let (activity, _) = watch::channel(PathActivity::Idle);

        Self {
            device,
            timings,
            state,
            activity: Arc::new(activity),
            transition: Mutex::new(()),
            cue: Mutex::new(None),
        }
    }

    pub fn timings(&self) -> &AudioTimings {
        &self.timings
    }

    pub fn mode(&self) -> AudioMode {
        self.state.borrow().mode
    }

    pub fn activity(&self) -> PathActivity {
        *self.activity.borrow()
    }

    /// Watch path activity changes
    pub fn subscribe_activity(&self) -> watch::Receiver<PathActivity> {
        self.activity.subscribe()
    }

    pub fn is_speaking(&self) -> bool {
        self.activity() == PathActivity::Speaking
    }

    pub fn is_capturing(&self) -> bool {
        self.activity() == PathActivity::Capturing
    }

    /// Route the path to the speaker
    pub async fn enter_playback_mode(&self) -> Result<()> {
        let _transition = self.transition.lock().await;
        info!("Entering playback mode (from {})", self.mode());

        if let Err(e) = self.device.configure(AudioMode::Playback).await {
            error!("Failed to configure playback mode: {:#}", e);
            return Err(Error::HardwareConfig(e.to_string()));
        }

        self.set_mode(AudioMode::Playback);
        Ok(())
    }

    /// Route the path from the microphone
    ///
    /// The engine is switched off around the reconfiguration; toggling it
    /// while live produces audible artifacts.
    pub async fn enter_capture_mode(&self) -> Result<()> {
        let _transition = self.transition.lock().await;
        info!("Entering capture mode (from {})", self.mode());

        let applied = async {
            self.device.set_enabled(false).await?;
            tokio::time::sleep(self.timings.engine_disable_settle()).await;
            self.device.configure(AudioMode::Capture).await?;
            self.device.set_enabled(true).await?;
            tokio::time::sleep(self.timings.engine_enable_settle()).await;
            anyhow::Ok(())
        }
        .await;

        if let Err(e) = applied {
            error!("Failed to configure capture mode: {:#}", e);
            // Best effort: an engine left disabled would silence the next utterance
            if let Err(e) = self.device.set_enabled(true).await {
                warn!("Failed to re-enable audio engine: {:#}", e);
            }
            return Err(Error::HardwareConfig(e.to_string()));
        }

        self.set_mode(AudioMode::Capture);
        Ok(())
    }

    /// Re-enable the audio engine once a recording released the hardware
    pub async fn restart_engine(&self) -> Result<()> {
        let _transition = self.transition.lock().await;

        self.device
            .set_enabled(true)
            .await
            .map_err(|e| Error::HardwareConfig(e.to_string()))
    }

    /// Prepare the path for an utterance
    ///
    /// Waits while a capture holds the path, then forces playback and lets
    /// it settle. Speech started right after a switch loses its first
    /// syllables on this class of device.
    pub async fn claim_for_speech(&self) -> PathClaim {
        let claim = self.wait_and_claim(PathActivity::Speaking).await;

        if let Err(e) = self.enter_playback_mode().await {
            warn!("Speaking without a confirmed playback route: {}", e);
        }
        tokio::time::sleep(self.timings.playback_settle()).await;

        claim
    }

    /// Claim the path for recording; fails if anything else holds it
    pub fn claim_for_capture(&self) -> Result<PathClaim> {
        let claimed = self.activity.send_if_modified(|current| {
            if *current == PathActivity::Idle {
                *current = PathActivity::Capturing;
                true
            } else {
                false
            }
        });

        if !claimed {
            return Err(Error::AudioPathBusy(match self.activity() {
                PathActivity::Speaking => "speech output active",
                _ => "capture already active",
            }));
        }

        Ok(PathClaim {
            activity: Arc::clone(&self.activity),
            held: PathActivity::Capturing,
        })
    }

    async fn wait_and_claim(&self, wanted: PathActivity) -> PathClaim {
        let mut rx = self.activity.subscribe();

        loop {
            let claimed = self.activity.send_if_modified(|current| {
                if *current == PathActivity::Idle {
                    *current = wanted;
                    true
                } else {
                    false
                }
            });

            if claimed {
                return PathClaim {
                    activity: Arc::clone(&self.activity),
                    held: wanted,
                };
            }

            // The sender lives in self, so the channel cannot close here
            if rx.changed().await.is_err() {
                warn!("Audio activity channel closed while waiting");
            }
        }
    }

    /// Load the silent cue once; later calls are no-ops
    pub async fn preload_cue(&self) {
        let mut cue = self.cue.lock().await;
        if cue.is_some() {
            return;
        }

        match self.device.load_cue(&silent_cue_bytes(), false).await {
            Ok(loaded) => {
                info!("Silent warm-up cue preloaded");
                *cue = Some(loaded);
            }
            Err(e) => warn!("Failed to preload silent cue: {:#}", e),
        }
    }

    /// Unload the silent cue at shutdown
    pub async fn release_cue(&self) {
        let mut cue = self.cue.lock().await;
        if let Some(loaded) = cue.take() {
            if let Err(e) = loaded.unload().await {
                warn!("Failed to unload silent cue: {:#}", e);
            } else {
                info!("Silent warm-up cue released");
            }
        }
    }

    /// Replay the silent cue and wait `settle` to force the speaker open
    ///
    /// Falls back to a transient cue when the preload failed. Never fails.
    pub async fn warm_up(&self, settle: Duration) {
        info!("Warming up speaker (settle {}ms)", settle.as_millis());

        let cue = self.cue.lock().await;
        match cue.as_ref() {
            Some(loaded) => {
                if let Err(e) = loaded.replay().await {
                    warn!("Failed to replay silent cue: {:#}", e);
                }
                tokio::time::sleep(settle).await;
            }
            None => match self.device.load_cue(&silent_cue_bytes(), true).await {
                Ok(transient) => {
                    tokio::time::sleep(settle).await;
                    if let Err(e) = transient.unload().await {
                        warn!("Failed to unload transient cue: {:#}", e);
                    }
                }
                Err(e) => {
                    warn!("Failed to create transient cue: {:#}", e);
                    tokio::time::sleep(settle).await;
                }
            },
        }
    }

    fn set_mode(&self, mode: AudioMode) {
        self.state.send_replace(AudioPathState { mode });
        info!("Audio path now in {} mode", mode);
    }
}

fn silent_cue_bytes() -> Vec<u8> {
    base64::engine::general_purpose::STANDARD
        .decode(SILENT_CUE_MP3)
        .unwrap_or_default()
}
