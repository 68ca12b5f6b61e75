//! Face-capture authentication loop
//!
//! While running, a frame is captured and submitted for identification
//! right away and then on every tick of a fixed period. The loop only ends
//! through `stop()`; failed frames are logged and skipped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::{Error, Peripheral, Result};
use crate::language::Language;
use crate::protocol::CommandProtocolClient;

/// Default interval between identification frames
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(1500);

/// Front camera used for identification
#[async_trait::async_trait]
pub trait Camera: Send + Sync {
    /// Ask for (or confirm) camera access
    async fn request_permission(&self) -> anyhow::Result<bool>;

    /// Take a still frame, encoded (JPEG)
    async fn capture_frame(&self) -> anyhow::Result<Vec<u8>>;
}

pub struct AuthCaptureLoop {
    camera: Arc<dyn Camera>,
    protocol: Arc<CommandProtocolClient>,
    interval: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
    frames_sent: Arc<AtomicU64>,
}

impl AuthCaptureLoop {
    pub fn new(
        camera: Arc<dyn Camera>,
        protocol: Arc<CommandProtocolClient>,
        interval: Duration,
    ) -> Self {
        Self {
            camera,
            protocol,
            interval,
            task: Mutex::new(None),
            frames_sent: Arc::new(AtomicU64::new(0)),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Frames handed to a connected channel since this loop was created
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::SeqCst)
    }

    /// Start scanning; returns `Ok(false)` if already running
    ///
    /// Each frame is tagged with the language current at submission.
    pub async fn start(&self, language: watch::Receiver<Language>) -> Result<bool> {
        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|task| !task.is_finished()) {
            return Ok(false);
        }

        match self.camera.request_permission().await {
            Ok(true) => {}
            Ok(false) => {
                warn!("Camera permission denied");
                return Err(Error::PermissionDenied(Peripheral::Camera));
            }
            Err(e) => {
                warn!("Camera permission request failed: {:#}", e);
                return Err(Error::PermissionDenied(Peripheral::Camera));
            }
        }

        info!(
            "Starting identification loop (every {}ms)",
            self.interval.as_millis()
        );

        let camera = Arc::clone(&self.camera);
        let protocol = Arc::clone(&self.protocol);
        let frames_sent = Arc::clone(&self.frames_sent);
        let period = self.interval;

        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                let frame = match camera.capture_frame().await {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!("Failed to capture identification frame: {:#}", e);
                        continue;
                    }
                };

                let lang = *language.borrow();
                // Intents are dropped without a connection; those are not counted
                let connected = protocol.is_connected();
                match protocol.emit_identify_frame(&frame, lang).await {
                    Ok(()) if connected => {
                        frames_sent.fetch_add(1, Ordering::SeqCst);
                    }
                    Ok(()) => debug!("Identification frame dropped, channel unavailable"),
                    Err(e) => warn!("Failed to submit identification frame: {}", e),
                }
            }
        }));

        Ok(true)
    }

    /// Stop scanning; returns whether a running loop was stopped
    pub async fn stop(&self) -> bool {
        let Some(task) = self.task.lock().await.take() else {
            return false;
        };

        task.abort();
        info!(
            "Identification loop stopped ({} frames sent)",
            self.frames_sent()
        );
        true
    }
}

impl Drop for AuthCaptureLoop {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}
