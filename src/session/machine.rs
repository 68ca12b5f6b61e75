use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::config::SessionConfig;
use super::state::{Affect, Notice, Phase, Session, SessionSnapshot, Status};
use super::transcript::{PendingConfirmation, Sender, Transcript};
use crate::audio::{
    AudioDevice, AudioModeArbiter, Microphone, SpeechCapturePipeline, SpeechFinished,
    SpeechOutcome, SpeechOutputPlayer, SpeechSynthesizer, UtteranceId,
};
use crate::auth::{AuthCaptureLoop, Camera};
use crate::error::{Error, Result};
use crate::language::Language;
use crate::protocol::{AuthSuccess, CommandProtocolClient, CommandResponse, EventChannel, InboundEvent};

/// Command text sent when the user confirms an SOS call
pub const SOS_COMMAND_TEXT: &str = "SOS 긴급 호출";

/// Text sent with the emergency stop
pub const EMERGENCY_STOP_TEXT: &str = "로봇 비상 정지";

/// Requests coming from the kiosk UI
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum UiIntent {
    /// Login button: start face identification
    Login,
    /// Microphone button: start or stop recording
    MicPress,
    SubmitText { text: String },
    Confirm { entry_id: Uuid, accept: bool },
    /// SOS button: ask before calling for help
    SosRequest,
    SosConfirm,
    SosCancel,
    EmergencyStop,
    SetLanguage { language: Language },
    DismissNotice,
    /// Back to the authentication screen
    Logout,
    Shutdown,
}

/// Device collaborators the session drives
pub struct SessionDeps {
    pub channel: Arc<dyn EventChannel>,
    pub audio: Arc<dyn AudioDevice>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub microphone: Arc<dyn Microphone>,
    pub camera: Arc<dyn Camera>,
}

/// Cloneable handle to a running session controller
#[derive(Clone)]
pub struct SessionHandle {
    intents: mpsc::UnboundedSender<UiIntent>,
    snapshot: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    pub fn send(&self, intent: UiIntent) -> Result<()> {
        self.intents.send(intent).map_err(|_| Error::SessionClosed)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    /// Wait until a published snapshot satisfies `predicate`
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&SessionSnapshot) -> bool,
    ) -> Result<SessionSnapshot> {
        let mut rx = self.snapshot.clone();
        let snapshot = rx
            .wait_for(predicate)
            .await
            .map_err(|_| Error::SessionClosed)?;
        Ok(snapshot.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AfterSpeech {
    /// Greeting done: start the conversation
    EnterConversation,
    /// Simple response spoken: ready for the next turn
    ReturnIdle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EmergencyKind {
    Sos,
    Stop,
}

/// Top-level orchestrator of a kiosk session
///
/// Runs as a single task: UI intents, backend events, speech completions
/// and capture completions are handled one at a time, in arrival order per
/// source.
pub struct SessionStateMachine {
    session: Session,
    transcript: Transcript,
    pending: Option<PendingConfirmation>,
    status: Status,
    affect: Affect,
    notice: Option<Notice>,
    sos_prompt_open: bool,
    /// One-shot: set by the first auth-success of a session
    greeted: bool,
    awaiting_speech: Option<(UtteranceId, AfterSpeech)>,

    arbiter: Arc<AudioModeArbiter>,
    player: SpeechOutputPlayer,
    capture: Arc<SpeechCapturePipeline>,
    auth_loop: AuthCaptureLoop,
    protocol: Arc<CommandProtocolClient>,

    inbound_tx: mpsc::UnboundedSender<InboundEvent>,
    capture_tx: mpsc::UnboundedSender<Result<bool>>,
    capture_task: Option<JoinHandle<()>>,
    /// How often a session without backend listeners retries attaching
    reattach_interval: Duration,
    language: watch::Sender<Language>,
    snapshot: watch::Sender<SessionSnapshot>,
}

impl SessionStateMachine {
    /// Build the component graph and run the controller in its own task
    pub fn spawn(deps: SessionDeps, config: SessionConfig) -> (SessionHandle, JoinHandle<()>) {
        info!(
            "Creating kiosk session (language={}, upload format={})",
            config.language, config.upload_format
        );

        let (intent_tx, intent_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (speech_tx, speech_rx) = mpsc::unbounded_channel();
        let (capture_tx, capture_rx) = mpsc::unbounded_channel();

        let arbiter = Arc::new(AudioModeArbiter::new(deps.audio, config.timings.clone()));
        let protocol = Arc::new(CommandProtocolClient::new(deps.channel));
        let player = SpeechOutputPlayer::new(deps.synthesizer, Arc::clone(&arbiter), speech_tx);
        let capture = Arc::new(SpeechCapturePipeline::new(
            deps.microphone,
            Arc::clone(&arbiter),
            Arc::clone(&protocol),
            config.upload_format.clone(),
        ));
        let auth_loop = AuthCaptureLoop::new(deps.camera, Arc::clone(&protocol), config.frame_interval);

        let session = Session::new(config.language);
        let (language, _) = watch::channel(config.language);

        let machine = Self {
            session,
            transcript: Transcript::new(),
            pending: None,
            status: Status::Idle,
            affect: Affect::Happy,
            notice: None,
            sos_prompt_open: false,
            greeted: false,
            awaiting_speech: None,
            arbiter,
            player,
            capture,
            auth_loop,
            protocol,
            inbound_tx,
            capture_tx,
            capture_task: None,
            reattach_interval: config.frame_interval,
            language,
            snapshot: watch::channel(initial_snapshot(config.language)).0,
        };

        let snapshot = machine.snapshot.subscribe();
        let task = tokio::spawn(machine.run(intent_rx, inbound_rx, speech_rx, capture_rx));

        (
            SessionHandle {
                intents: intent_tx,
                snapshot,
            },
            task,
        )
    }

    async fn run(
        mut self,
        mut intents: mpsc::UnboundedReceiver<UiIntent>,
        mut inbound: mpsc::UnboundedReceiver<InboundEvent>,
        mut speech: mpsc::UnboundedReceiver<SpeechFinished>,
        mut captures: mpsc::UnboundedReceiver<Result<bool>>,
    ) {
        info!("Session controller started");

        if let Err(e) = self.arbiter.enter_playback_mode().await {
            warn!("Initial playback mode not applied: {}", e);
        }
        self.arbiter.preload_cue().await;
        self.publish();

        let mut activity = self.arbiter.subscribe_activity();
        let mut capture_state = self.capture.subscribe();
        let mut reattach = tokio::time::interval(self.reattach_interval);
        reattach.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                intent = intents.recv() => match intent {
                    Some(UiIntent::Shutdown) | None => break,
                    Some(intent) => self.handle_intent(intent).await,
                },
                Some(event) = inbound.recv() => self.handle_inbound(event).await,
                Some(finished) = speech.recv() => self.handle_speech_finished(finished),
                Some(result) = captures.recv() => self.handle_capture_finished(result),
                Ok(()) = activity.changed() => {}
                Ok(()) = capture_state.changed() => {}
                _ = reattach.tick() => self.ensure_attached().await,
            }

            self.publish();
        }

        self.teardown().await;
        self.arbiter.release_cue().await;
        self.publish();

        info!("Session controller stopped");
    }

    // ========================================================================
    // UI intents
    // ========================================================================

    async fn handle_intent(&mut self, intent: UiIntent) {
        debug!("UI intent in {:?}: {:?}", self.session.phase, intent);

        match intent {
            UiIntent::Login => self.start_authentication().await,
            UiIntent::MicPress => self.toggle_microphone().await,
            UiIntent::SubmitText { text } => self.submit_text(&text).await,
            UiIntent::Confirm { entry_id, accept } => self.answer_confirmation(entry_id, accept).await,
            UiIntent::SosRequest => {
                self.sos_prompt_open = true;
                let prompt = self.phrases().sos_prompt;
                self.speak(prompt).await;
            }
            UiIntent::SosConfirm => self.trigger_emergency(EmergencyKind::Sos).await,
            UiIntent::SosCancel => {
                if self.sos_prompt_open {
                    self.sos_prompt_open = false;
                    let cancelled = self.phrases().sos_cancelled;
                    self.speak(cancelled).await;
                }
            }
            UiIntent::EmergencyStop => self.trigger_emergency(EmergencyKind::Stop).await,
            UiIntent::SetLanguage { language } => self.set_language(language).await,
            UiIntent::DismissNotice => self.notice = None,
            UiIntent::Logout => self.teardown().await,
            // Handled by the run loop
            UiIntent::Shutdown => {}
        }
    }

    async fn start_authentication(&mut self) {
        if self.session.phase != Phase::Unauthenticated {
            debug!("Login ignored in {:?}", self.session.phase);
            return;
        }

        // Poke the speaker early so the greeting is not clipped
        self.arbiter.warm_up(Duration::ZERO).await;

        if let Err(e) = self
            .protocol
            .attach(self.session.language, self.inbound_tx.clone())
            .await
        {
            warn!("Backend listeners not attached: {}", e);
        }

        match self.auth_loop.start(self.language.subscribe()).await {
            Ok(_) => {
                info!("Authenticating");
                self.session.phase = Phase::Authenticating;
                self.status = Status::Scanning;
            }
            Err(Error::PermissionDenied(peripheral)) => {
                self.notice = Some(Notice::PermissionDenied { peripheral });
                self.protocol.detach().await;
            }
            Err(e) => {
                error!("Failed to start identification: {}", e);
                self.status = Status::Error;
                self.affect = Affect::Error;
            }
        }
    }

    async fn toggle_microphone(&mut self) {
        if !self.greeted {
            debug!("Microphone ignored before authentication");
            return;
        }

        match self.session.phase {
            Phase::Idle | Phase::Emergency | Phase::AwaitingConfirmation => {
                self.start_listening().await
            }
            Phase::Listening => self.stop_listening(),
            phase => debug!("Microphone ignored in {:?}", phase),
        }
    }

    async fn start_listening(&mut self) {
        self.cancel_awaited_speech();
        self.player.stop().await;

        match self.capture.start_capture().await {
            Ok(()) => {
                self.session.phase = Phase::Listening;
                self.status = Status::Listening;
                self.affect = Affect::Listening;
            }
            Err(Error::PermissionDenied(peripheral)) => {
                self.notice = Some(Notice::PermissionDenied { peripheral });
            }
            Err(e) => {
                error!("Failed to start listening: {}", e);
                self.status = Status::Error;
                self.affect = Affect::Error;
            }
        }
    }

    fn stop_listening(&mut self) {
        self.session.phase = Phase::AwaitingBackend;
        self.status = Status::Processing;
        self.affect = Affect::Thinking;

        let capture = Arc::clone(&self.capture);
        let user_id = self.session.user_id.clone();
        let language = self.language.subscribe();
        let results = self.capture_tx.clone();

        self.capture_task = Some(tokio::spawn(async move {
            let result = capture.stop_capture(&user_id, language).await;
            let _ = results.send(result);
        }));
    }

    async fn submit_text(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        if !self.greeted {
            debug!("Text ignored before authentication");
            return;
        }

        if self.session.phase == Phase::Listening && self.capture.abort_capture().await {
            info!("Discarded recording in favour of typed text");
        }

        info!("Text command: {}", text);
        self.transcript.push(Sender::User, text);
        self.status = Status::Processing;
        self.affect = Affect::Thinking;

        if let Err(e) = self
            .protocol
            .emit_command(&self.session.user_id, text, self.session.language)
            .await
        {
            error!("Failed to send command: {}", e);
        }

        self.session.phase = Phase::AwaitingBackend;
    }

    async fn answer_confirmation(&mut self, entry_id: Uuid, accept: bool) {
        let action = match self.transcript.resolve(entry_id) {
            Ok(action) => action,
            Err(e) => {
                warn!("Ignoring confirmation answer: {}", e);
                return;
            }
        };

        let was_live = self
            .pending
            .as_ref()
            .is_some_and(|pending| pending.transcript_entry_id == entry_id);
        if was_live {
            self.pending = None;
        } else {
            info!("Answer for superseded confirmation {} honored", entry_id);
        }

        let phrases = self.phrases();
        if accept {
            self.transcript.push(Sender::User, phrases.confirm_yes);
            self.status = Status::Processing;
            self.affect = Affect::Thinking;

            let command = action.unwrap_or_default();
            if let Err(e) = self
                .protocol
                .emit_action_confirm(&self.session.user_id, &command, self.session.language)
                .await
            {
                error!("Failed to confirm action: {}", e);
            }
        } else {
            self.transcript.push(Sender::User, phrases.confirm_no);
            self.speak(phrases.cancelled).await;
        }

        if was_live && self.session.phase == Phase::AwaitingConfirmation {
            self.session.phase = Phase::Idle;
        }
    }

    /// SOS and emergency stop ignore phase and confirmation state
    async fn trigger_emergency(&mut self, kind: EmergencyKind) {
        warn!("Emergency {:?} in {:?}", kind, self.session.phase);

        self.sos_prompt_open = false;
        self.awaiting_speech = None;

        if self.capture.abort_capture().await {
            info!("Discarded live recording");
        }

        if let Some(pending) = self.pending.take() {
            self.transcript.abandon(pending.transcript_entry_id);
            info!("Abandoned confirmation {}", pending.transcript_entry_id);
        }

        let phrases = self.phrases();
        let (notice, acknowledgment, status) = match kind {
            EmergencyKind::Sos => (phrases.sos_notice, phrases.sos_sent, Status::Emergency),
            EmergencyKind::Stop => (phrases.stop_notice, phrases.stop_ack, Status::EmergencyStop),
        };

        self.transcript.push(Sender::System, notice);
        self.status = status;
        self.affect = Affect::Error;
        self.speak(acknowledgment).await;

        let user_id = self.session.user_id.clone();
        let lang = self.session.language;
        let sent = match kind {
            EmergencyKind::Sos => self.protocol.emit_command(&user_id, SOS_COMMAND_TEXT, lang).await,
            EmergencyKind::Stop => self.protocol.emit_pause(&user_id, EMERGENCY_STOP_TEXT, lang).await,
        };
        if let Err(e) = sent {
            error!("Failed to send emergency intent: {}", e);
        }

        self.session.phase = Phase::Emergency;
    }

    async fn set_language(&mut self, language: Language) {
        if self.session.language == language {
            return;
        }

        info!("Switching language {} -> {}", self.session.language, language);
        self.session.language = language;
        self.language.send_replace(language);

        if self.protocol.is_attached().await {
            if let Err(e) = self.protocol.attach(language, self.inbound_tx.clone()).await {
                warn!("Failed to re-attach listeners: {}", e);
            }
        }
    }

    /// Attach listeners for an active session that has none
    ///
    /// Covers a channel that was down at login, a failed re-attach after a
    /// language switch and a listener whose stream ended.
    async fn ensure_attached(&mut self) {
        if self.session.phase == Phase::Unauthenticated
            || !self.protocol.is_connected()
            || self.protocol.is_attached().await
        {
            return;
        }

        info!("Channel available, attaching backend listeners");
        if let Err(e) = self
            .protocol
            .attach(self.session.language, self.inbound_tx.clone())
            .await
        {
            warn!("Backend listeners still not attached: {}", e);
        }
    }

    /// Back to a fresh, unauthenticated session
    async fn teardown(&mut self) {
        info!("Tearing down session for {}", self.session.user_id);

        self.auth_loop.stop().await;
        self.awaiting_speech = None;
        self.player.stop().await;

        self.capture.abort_capture().await;
        if let Some(task) = self.capture_task.take() {
            // A stop in flight owns the recorder; let it release the hardware
            if let Err(e) = task.await {
                warn!("Capture task failed during teardown: {}", e);
            }
        }

        self.protocol.detach().await;

        self.session = Session::new(self.session.language);
        self.transcript.clear();
        self.pending = None;
        self.greeted = false;
        self.sos_prompt_open = false;
        self.status = Status::Idle;
        self.affect = Affect::Happy;
        self.notice = None;
    }

    // ========================================================================
    // Backend events
    // ========================================================================

    async fn handle_inbound(&mut self, event: InboundEvent) {
        match event {
            InboundEvent::AuthSuccess(user) => self.on_auth_success(user).await,
            InboundEvent::AuthFail => debug!("Identification failed, still scanning"),
            InboundEvent::UserSpeech(speech) => {
                if !self.greeted {
                    debug!("user-speech ignored before authentication");
                    return;
                }
                info!("Backend heard: {}", speech.text);
                self.transcript.push(Sender::User, speech.text);
                self.status = Status::Thinking;
                self.affect = Affect::Thinking;
            }
            InboundEvent::CommandResponse(response) => self.on_command_response(response).await,
        }
    }

    async fn on_auth_success(&mut self, user: AuthSuccess) {
        if self.greeted
            || !matches!(self.session.phase, Phase::Authenticating | Phase::Emergency)
        {
            debug!("Ignoring auth-success for {} in {:?}", user.id, self.session.phase);
            return;
        }

        info!("Authenticated {} ({})", user.name, user.id);
        self.auth_loop.stop().await;
        self.greeted = true;
        self.session.user_id = user.id;
        self.session.display_name = user.name;
        self.status = Status::Welcome;

        if let Err(e) = self.arbiter.enter_playback_mode().await {
            warn!("Greeting without a confirmed playback route: {}", e);
        }
        // Same priming as after a capture, or the name gets clipped
        let settle = self.arbiter.timings().greeting_warmup_settle();
        self.arbiter.warm_up(settle).await;

        let greeting = self.phrases().greeting(&self.session.display_name);
        self.transcript.push(Sender::Assistant, greeting.clone());
        let utterance = self.speak(greeting).await;
        self.awaiting_speech = Some((utterance, AfterSpeech::EnterConversation));
    }

    async fn on_command_response(&mut self, response: CommandResponse) {
        if !self.greeted {
            debug!("command-response ignored before authentication");
            return;
        }

        info!(
            "Response ({:?}) in {:?}: {}",
            response.kind, self.session.phase, response.text
        );
        self.status = Status::Waiting;
        self.affect = Affect::Happy;

        if let Some(heard) = response.recognized_text() {
            self.transcript.push(Sender::User, heard);
        }

        if response.is_confirmable() {
            let action = response.action_token();
            let entry_id = self
                .transcript
                .push_confirmable(response.text.clone(), action.clone());

            let previous = self.pending.replace(PendingConfirmation {
                transcript_entry_id: entry_id,
                action_token: action.unwrap_or_default(),
            });
            if let Some(previous) = previous {
                warn!(
                    "Confirmation {} superseded by {}",
                    previous.transcript_entry_id, entry_id
                );
            }

            if self.session.phase != Phase::Listening {
                self.session.phase = Phase::AwaitingConfirmation;
            }
            self.speak(response.text).await;
        } else {
            self.transcript.push(Sender::Assistant, response.text.clone());
            let utterance = self.speak(response.text).await;
            self.awaiting_speech = Some((utterance, AfterSpeech::ReturnIdle));
        }
    }

    fn handle_speech_finished(&mut self, finished: SpeechFinished) {
        match &finished.outcome {
            SpeechOutcome::Completed => self.affect = Affect::Happy,
            SpeechOutcome::Failed(reason) => {
                warn!("Utterance {} failed: {}", finished.utterance, reason);
                self.affect = Affect::Happy;
            }
            SpeechOutcome::Interrupted => {
                debug!("Utterance {} interrupted", finished.utterance)
            }
        }

        if let Some((utterance, after)) = self.awaiting_speech {
            if utterance == finished.utterance {
                self.awaiting_speech = None;
                self.apply_after_speech(after);
            }
        }
    }

    fn handle_capture_finished(&mut self, result: Result<bool>) {
        self.capture_task = None;

        match result {
            Ok(true) => info!("Utterance uploaded, waiting for backend"),
            Ok(false) => {}
            Err(e) => {
                error!("Speech upload failed: {}", e);
                if !self.greeted {
                    return;
                }
                self.status = Status::SendFailed;
                self.affect = Affect::Error;
                if self.session.phase == Phase::AwaitingBackend {
                    self.session.phase = Phase::Idle;
                }
            }
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Speak in the session language
    ///
    /// The utterance being cut off counts as finished, so any transition
    /// waiting on it is applied first.
    async fn speak(&mut self, text: impl Into<String>) -> UtteranceId {
        if let Some((_, after)) = self.awaiting_speech.take() {
            self.apply_after_speech(after);
        }
        self.player.speak(text, self.session.language).await
    }

    fn cancel_awaited_speech(&mut self) {
        if let Some((_, after)) = self.awaiting_speech.take() {
            self.apply_after_speech(after);
        }
    }

    fn apply_after_speech(&mut self, after: AfterSpeech) {
        match after {
            AfterSpeech::EnterConversation => {
                // Identification may complete after an emergency raised while scanning
                if matches!(
                    self.session.phase,
                    Phase::Authenticating | Phase::Emergency
                ) {
                    info!("Greeting finished, entering conversation");
                    self.session.phase = Phase::Idle;
                    self.status = Status::Waiting;
                }
            }
            AfterSpeech::ReturnIdle => {
                if matches!(
                    self.session.phase,
                    Phase::AwaitingBackend | Phase::Emergency
                ) {
                    self.session.phase = Phase::Idle;
                }
            }
        }
    }

    fn phrases(&self) -> &'static crate::language::Phrases {
        self.session.language.phrases()
    }

    fn publish(&self) {
        self.snapshot.send_replace(SessionSnapshot {
            session: self.session.clone(),
            status: self.status,
            affect: self.affect,
            speaking: self.arbiter.is_speaking(),
            capturing: self.arbiter.is_capturing(),
            capture_state: self.capture.state(),
            sos_prompt_open: self.sos_prompt_open,
            notice: self.notice.clone(),
            pending_confirmation: self.pending.clone(),
            transcript: self.transcript.entries().to_vec(),
        });
    }
}

fn initial_snapshot(language: Language) -> SessionSnapshot {
    SessionSnapshot {
        session: Session::new(language),
        status: Status::Idle,
        affect: Affect::Happy,
        speaking: false,
        capturing: false,
        capture_state: Default::default(),
        sos_prompt_open: false,
        notice: None,
        pending_confirmation: None,
        transcript: Vec::new(),
    }
}
