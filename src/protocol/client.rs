use std::sync::Arc;

use base64::Engine;
use futures::stream::{BoxStream, StreamExt};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::messages::{
    ActionConfirmMessage, AudioUploadMessage, CommandMessage, IdentifyFrame, InboundEvent,
    OutboundIntent, PauseMessage,
};
use crate::error::{Error, Result};
use crate::language::Language;

/// Raw event as carried by the transport
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub name: String,
    pub payload: Vec<u8>,
}

/// Bidirectional named-event transport to the backend
///
/// Implementations:
/// - `NatsChannel`: subjects on a NATS server
/// - in-memory channels in tests
#[async_trait::async_trait]
pub trait EventChannel: Send + Sync {
    /// Whether a connection to the backend is currently up
    fn is_connected(&self) -> bool;

    /// Send one event
    async fn emit(&self, event: &str, payload: Vec<u8>) -> anyhow::Result<()>;

    /// Stream every inbound event, in arrival order
    async fn listen(&self) -> anyhow::Result<BoxStream<'static, RawEvent>>;
}

struct Listener {
    lang: Language,
    task: JoinHandle<()>,
}

/// Typed intents out, typed events in
///
/// Sends are fire-and-forget: nothing is retried, and with no connection
/// an intent is silently dropped.
pub struct CommandProtocolClient {
    channel: Arc<dyn EventChannel>,
    listener: Mutex<Option<Listener>>,
}

impl CommandProtocolClient {
    pub fn new(channel: Arc<dyn EventChannel>) -> Self {
        Self {
            channel,
            listener: Mutex::new(None),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    pub async fn is_attached(&self) -> bool {
        self.listener
            .lock()
            .await
            .as_ref()
            .is_some_and(|listener| !listener.task.is_finished())
    }

    /// Forward inbound events to `sink`
    ///
    /// Attaching again with the same language is a no-op; a different
    /// language replaces the listener.
    pub async fn attach(
        &self,
        lang: Language,
        sink: mpsc::UnboundedSender<InboundEvent>,
    ) -> Result<()> {
        let mut listener = self.listener.lock().await;

        if let Some(current) = listener.as_ref() {
            if current.lang == lang && !current.task.is_finished() {
                debug!("Listeners already attached for {}", lang);
                return Ok(());
            }
        }

        if let Some(previous) = listener.take() {
            info!("Re-attaching listeners ({} -> {})", previous.lang, lang);
            previous.task.abort();
        }

        if !self.channel.is_connected() {
            warn!("Cannot attach listeners: channel not connected");
            return Err(Error::ChannelUnavailable);
        }

        let mut events = self
            .channel
            .listen()
            .await
            .map_err(|e| Error::Protocol(format!("failed to listen: {:#}", e)))?;

        let task = tokio::spawn(async move {
            info!("Inbound listener started");

            while let Some(raw) = events.next().await {
                match InboundEvent::parse(&raw.name, &raw.payload) {
                    Ok(Some(event)) => {
                        debug!("Received {}", raw.name);
                        if sink.send(event).is_err() {
                            break;
                        }
                    }
                    Ok(None) => debug!("Ignoring unhandled event: {}", raw.name),
                    Err(e) => warn!("Dropping inbound event: {}", e),
                }
            }

            info!("Inbound listener stopped");
        });

        *listener = Some(Listener { lang, task });
        info!("Listeners attached for {}", lang);

        Ok(())
    }

    /// Stop forwarding inbound events; safe to call repeatedly
    pub async fn detach(&self) {
        if let Some(listener) = self.listener.lock().await.take() {
            listener.task.abort();
            info!("Listeners detached");
        }
    }

    /// Send an intent to the backend
    pub async fn send(&self, intent: OutboundIntent) -> Result<()> {
        let event = intent.event_name();

        if !self.channel.is_connected() {
            debug!("Channel unavailable, dropping {} intent", event);
            return Ok(());
        }

        let payload = intent.payload()?;
        let bytes = payload.len();

        self.channel
            .emit(event, payload)
            .await
            .map_err(|e| Error::Protocol(format!("failed to emit {}: {:#}", event, e)))?;

        info!("Emitted {} (bytes={}, lang={})", event, bytes, intent.lang());
        Ok(())
    }

    pub async fn emit_identify_frame(&self, image: &[u8], lang: Language) -> Result<()> {
        self.send(OutboundIntent::IdentifyFrame(IdentifyFrame {
            image: base64::engine::general_purpose::STANDARD.encode(image),
            lang,
        }))
        .await
    }

    pub async fn emit_command(&self, user_id: &str, text: &str, lang: Language) -> Result<()> {
        self.send(OutboundIntent::Command(CommandMessage {
            user_id: user_id.to_string(),
            text: text.to_string(),
            lang,
        }))
        .await
    }

    pub async fn emit_action_confirm(
        &self,
        user_id: &str,
        command: &str,
        lang: Language,
    ) -> Result<()> {
        self.send(OutboundIntent::ActionConfirm(ActionConfirmMessage {
            user_id: user_id.to_string(),
            command: command.to_string(),
            lang,
        }))
        .await
    }

    pub async fn emit_pause(&self, user_id: &str, text: &str, lang: Language) -> Result<()> {
        self.send(OutboundIntent::Pause(PauseMessage {
            user_id: user_id.to_string(),
            text: text.to_string(),
            lang,
        }))
        .await
    }

    pub async fn emit_audio_upload(
        &self,
        audio: &[u8],
        format: &str,
        user_id: &str,
        lang: Language,
    ) -> Result<()> {
        self.send(OutboundIntent::AudioUpload(AudioUploadMessage {
            audio_data: base64::engine::general_purpose::STANDARD.encode(audio),
            format: format.to_string(),
            user_id: user_id.to_string(),
            lang,
        }))
        .await
    }
}

impl Drop for CommandProtocolClient {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.get_mut().take() {
            listener.task.abort();
        }
    }
}
