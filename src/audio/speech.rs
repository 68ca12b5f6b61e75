use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::arbiter::AudioModeArbiter;
use crate::error::Error;
use crate::language::{Language, VoiceParams};

/// Text-to-speech engine
///
/// Consumed as an opaque capability: speak and report done or error.
#[async_trait::async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Speak `text`, resolving once the utterance has finished
    async fn speak(&self, text: &str, voice: &VoiceParams) -> anyhow::Result<()>;

    /// Cut off whatever is being spoken
    async fn stop(&self) -> anyhow::Result<()>;
}

/// Identifier of one `speak()` request
pub type UtteranceId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeechOutcome {
    Completed,
    /// Cut off by a newer utterance or an explicit stop
    Interrupted,
    Failed(String),
}

/// Reported once per utterance when it stops occupying the speaker
#[derive(Debug, Clone)]
pub struct SpeechFinished {
    pub utterance: UtteranceId,
    pub outcome: SpeechOutcome,
}

struct InFlight {
    id: UtteranceId,
    task: JoinHandle<()>,
}

/// Plays one utterance at a time; a new request always interrupts the last
pub struct SpeechOutputPlayer {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    arbiter: Arc<AudioModeArbiter>,
    events: mpsc::UnboundedSender<SpeechFinished>,
    current: Mutex<Option<InFlight>>,
    next_id: AtomicU64,
}

impl SpeechOutputPlayer {
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        arbiter: Arc<AudioModeArbiter>,
        events: mpsc::UnboundedSender<SpeechFinished>,
    ) -> Self {
        Self {
            synthesizer,
            arbiter,
            events,
            current: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Whether an utterance currently holds the audio path
    pub fn is_speaking(&self) -> bool {
        self.arbiter.is_speaking()
    }

    /// Speak `text` in `language`, interrupting any utterance in flight
    ///
    /// Returns immediately; completion is reported as a `SpeechFinished`
    /// event carrying the returned id.
    pub async fn speak(&self, text: impl Into<String>, language: Language) -> UtteranceId {
        let text = text.into();
        let mut current = self.current.lock().await;
        self.interrupt(&mut current).await;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        info!("Speech request {} ({}): \"{}\"", id, language, text);

        let synthesizer = Arc::clone(&self.synthesizer);
        let arbiter = Arc::clone(&self.arbiter);
        let events = self.events.clone();

        let task = tokio::spawn(async move {
            let claim = arbiter.claim_for_speech().await;
            info!("Speech {} started", id);

            let outcome = match synthesizer.speak(&text, &language.voice()).await {
                Ok(()) => {
                    info!("Speech {} completed", id);
                    SpeechOutcome::Completed
                }
                Err(e) => {
                    let err = Error::Synthesis(format!("{:#}", e));
                    warn!("Speech {} failed: {}", id, err);
                    SpeechOutcome::Failed(err.to_string())
                }
            };

            drop(claim);
            let _ = events.send(SpeechFinished {
                utterance: id,
                outcome,
            });
        });

        *current = Some(InFlight { id, task });
        id
    }

    /// Stop the current utterance, if any
    pub async fn stop(&self) {
        let mut current = self.current.lock().await;
        self.interrupt(&mut current).await;
    }

    async fn interrupt(&self, current: &mut Option<InFlight>) {
        let Some(in_flight) = current.take() else {
            return;
        };

        if in_flight.task.is_finished() {
            return;
        }

        if let Err(e) = self.synthesizer.stop().await {
            warn!("Failed to stop speech engine: {:#}", e);
        }
        in_flight.task.abort();

        match in_flight.task.await {
            // Finished on its own before the abort landed; already reported
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {
                info!("Speech {} interrupted", in_flight.id);
                let _ = self.events.send(SpeechFinished {
                    utterance: in_flight.id,
                    outcome: SpeechOutcome::Interrupted,
                });
            }
            Err(e) => warn!("Speech task {} panicked: {}", in_flight.id, e),
        }
    }
}
