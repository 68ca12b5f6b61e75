// Shared fakes for the integration tests
//
// Every fake records what it was asked to do so tests can assert on the
// exact sequence of device and channel traffic.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use blossom_kiosk::audio::{AudioDevice, AudioMode, Microphone, SilentCue, SpeechSynthesizer};
use blossom_kiosk::auth::Camera;
use blossom_kiosk::language::VoiceParams;
use blossom_kiosk::protocol::{EventChannel, RawEvent};
use blossom_kiosk::session::{
    Phase, SessionConfig, SessionDeps, SessionHandle, SessionSnapshot, SessionStateMachine,
};
use blossom_kiosk::AudioTimings;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;

pub const WAIT: Duration = Duration::from_secs(5);

/// Poll `condition` until it holds, panicking after `WAIT`
pub async fn eventually(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// ============================================================================
// Channel
// ============================================================================

/// In-memory backend: records emits, injects inbound events
pub struct FakeChannel {
    connected: AtomicBool,
    emitted: Mutex<Vec<(String, Value)>>,
    inbound: broadcast::Sender<RawEvent>,
}

impl FakeChannel {
    pub fn new() -> Arc<Self> {
        let (inbound, _) = broadcast::channel(64);
        Arc::new(Self {
            connected: AtomicBool::new(true),
            emitted: Mutex::new(Vec::new()),
            inbound,
        })
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn listeners(&self) -> usize {
        self.inbound.receiver_count()
    }

    /// Deliver an event as if the backend sent it
    pub fn inject(&self, event: &str, payload: Value) {
        let raw = RawEvent {
            name: event.to_string(),
            payload: serde_json::to_vec(&payload).unwrap(),
        };
        self.inbound.send(raw).expect("no listener attached");
    }

    pub fn emitted(&self) -> Vec<(String, Value)> {
        self.emitted.lock().unwrap().clone()
    }

    pub fn emitted_named(&self, event: &str) -> Vec<Value> {
        self.emitted()
            .into_iter()
            .filter(|(name, _)| name == event)
            .map(|(_, payload)| payload)
            .collect()
    }

    pub fn clear(&self) {
        self.emitted.lock().unwrap().clear();
    }

    /// Wait for the first emit of `event` and return its payload
    pub async fn next_emit(&self, event: &str) -> Value {
        eventually(event, || !self.emitted_named(event).is_empty()).await;
        self.emitted_named(event).remove(0)
    }
}

#[async_trait::async_trait]
impl EventChannel for FakeChannel {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn emit(&self, event: &str, payload: Vec<u8>) -> Result<()> {
        let payload: Value = serde_json::from_slice(&payload)?;
        self.emitted
            .lock()
            .unwrap()
            .push((event.to_string(), payload));
        Ok(())
    }

    async fn listen(&self) -> Result<BoxStream<'static, RawEvent>> {
        let rx = self.inbound.subscribe();
        Ok(stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(event) => return Some((event, rx)),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .boxed())
    }
}

// ============================================================================
// Speech synthesizer
// ============================================================================

/// Synthesizer that finishes instantly unless held
pub struct FakeSynthesizer {
    spoken: Mutex<Vec<(String, &'static str)>>,
    hold: AtomicBool,
    fail: AtomicBool,
    release: Notify,
    stops: AtomicU64,
}

impl FakeSynthesizer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            spoken: Mutex::new(Vec::new()),
            hold: AtomicBool::new(false),
            fail: AtomicBool::new(false),
            release: Notify::new(),
            stops: AtomicU64::new(0),
        })
    }

    /// Keep each utterance going until `release()`
    pub fn hold(&self, hold: bool) {
        self.hold.store(hold, Ordering::SeqCst);
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Let the current held utterance finish
    pub fn release(&self) {
        self.release.notify_one();
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken
            .lock()
            .unwrap()
            .iter()
            .map(|(text, _)| text.clone())
            .collect()
    }

    pub fn voices(&self) -> Vec<&'static str> {
        self.spoken.lock().unwrap().iter().map(|(_, tag)| *tag).collect()
    }

    pub fn stops(&self) -> u64 {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SpeechSynthesizer for FakeSynthesizer {
    async fn speak(&self, text: &str, voice: &VoiceParams) -> Result<()> {
        self.spoken
            .lock()
            .unwrap()
            .push((text.to_string(), voice.language_tag));

        if self.hold.load(Ordering::SeqCst) {
            self.release.notified().await;
        }
        if self.fail.load(Ordering::SeqCst) {
            bail!("speech engine unavailable");
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Microphone
// ============================================================================

/// Recorder that writes a fixed payload into a temp directory
pub struct FakeMicrophone {
    dir: tempfile::TempDir,
    payload: Vec<u8>,
    granted: AtomicBool,
    recordings: Mutex<Vec<PathBuf>>,
    stops: AtomicU64,
}

impl FakeMicrophone {
    pub fn new(payload: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            dir: tempfile::tempdir().unwrap(),
            payload: payload.to_vec(),
            granted: AtomicBool::new(true),
            recordings: Mutex::new(Vec::new()),
            stops: AtomicU64::new(0),
        })
    }

    pub fn deny(&self) {
        self.granted.store(false, Ordering::SeqCst);
    }

    pub fn recordings(&self) -> Vec<PathBuf> {
        self.recordings.lock().unwrap().clone()
    }

    pub fn stops(&self) -> u64 {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Microphone for FakeMicrophone {
    async fn request_permission(&self) -> Result<bool> {
        Ok(self.granted.load(Ordering::SeqCst))
    }

    async fn start_recording(&self) -> Result<PathBuf> {
        let mut recordings = self.recordings.lock().unwrap();
        let path = self
            .dir
            .path()
            .join(format!("utterance-{}.m4a", recordings.len()));
        std::fs::write(&path, b"")?;
        recordings.push(path.clone());
        Ok(path)
    }

    async fn stop_recording(&self) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        let Some(path) = self.recordings.lock().unwrap().last().cloned() else {
            bail!("not recording");
        };
        std::fs::write(path, &self.payload)?;
        Ok(())
    }
}

// ============================================================================
// Camera
// ============================================================================

pub struct FakeCamera {
    granted: AtomicBool,
    frames: AtomicU64,
}

impl FakeCamera {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            granted: AtomicBool::new(true),
            frames: AtomicU64::new(0),
        })
    }

    pub fn deny(&self) {
        self.granted.store(false, Ordering::SeqCst);
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Camera for FakeCamera {
    async fn request_permission(&self) -> Result<bool> {
        Ok(self.granted.load(Ordering::SeqCst))
    }

    async fn capture_frame(&self) -> Result<Vec<u8>> {
        let n = self.frames.fetch_add(1, Ordering::SeqCst);
        Ok(format!("jpeg-frame-{}", n).into_bytes())
    }
}

// ============================================================================
// Audio device
// ============================================================================

/// Audio device that logs every call
pub struct FakeAudioDevice {
    log: Arc<Mutex<Vec<String>>>,
    fail_capture: AtomicBool,
    fail_cue: AtomicBool,
}

impl FakeAudioDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            log: Arc::new(Mutex::new(Vec::new())),
            fail_capture: AtomicBool::new(false),
            fail_cue: AtomicBool::new(false),
        })
    }

    pub fn fail_capture(&self, fail: bool) {
        self.fail_capture.store(fail, Ordering::SeqCst);
    }

    pub fn fail_cue(&self, fail: bool) {
        self.fail_cue.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.log.lock().unwrap().clear();
    }

    fn record(&self, call: impl Into<String>) {
        self.log.lock().unwrap().push(call.into());
    }
}

#[async_trait::async_trait]
impl AudioDevice for FakeAudioDevice {
    async fn configure(&self, mode: AudioMode) -> Result<()> {
        self.record(format!("configure:{}", mode));
        if mode == AudioMode::Capture && self.fail_capture.load(Ordering::SeqCst) {
            bail!("route rejected");
        }
        Ok(())
    }

    async fn set_enabled(&self, enabled: bool) -> Result<()> {
        self.record(format!("enabled:{}", enabled));
        Ok(())
    }

    async fn load_cue(&self, data: &[u8], play_immediately: bool) -> Result<Box<dyn SilentCue>> {
        if self.fail_cue.load(Ordering::SeqCst) {
            bail!("decoder unavailable");
        }
        self.record(format!("load_cue:{}:{}", data.len(), play_immediately));
        Ok(Box::new(FakeCue {
            log: Arc::clone(&self.log),
        }))
    }

    fn name(&self) -> &str {
        "fake"
    }
}

struct FakeCue {
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait::async_trait]
impl SilentCue for FakeCue {
    async fn replay(&self) -> Result<()> {
        self.log.lock().unwrap().push("replay".to_string());
        Ok(())
    }

    async fn unload(&self) -> Result<()> {
        self.log.lock().unwrap().push("unload".to_string());
        Ok(())
    }
}

// ============================================================================
// Kiosk harness
// ============================================================================

/// A running session wired to fakes
pub struct Kiosk {
    pub handle: SessionHandle,
    pub task: JoinHandle<()>,
    pub channel: Arc<FakeChannel>,
    pub synth: Arc<FakeSynthesizer>,
    pub mic: Arc<FakeMicrophone>,
    pub camera: Arc<FakeCamera>,
    pub audio: Arc<FakeAudioDevice>,
}

pub const RECORDED: &[u8] = b"\x00\x00\x00\x20ftypM4A recorded utterance";

impl Kiosk {
    pub fn start() -> Self {
        Self::start_with(SessionConfig {
            timings: AudioTimings::immediate(),
            ..SessionConfig::default()
        })
    }

    pub fn start_with(config: SessionConfig) -> Self {
        let channel = FakeChannel::new();
        let synth = FakeSynthesizer::new();
        let mic = FakeMicrophone::new(RECORDED);
        let camera = FakeCamera::new();
        let audio = FakeAudioDevice::new();

        let deps = SessionDeps {
            channel: channel.clone(),
            audio: audio.clone(),
            synthesizer: synth.clone(),
            microphone: mic.clone(),
            camera: camera.clone(),
        };
        let (handle, task) = SessionStateMachine::spawn(deps, config);

        Self {
            handle,
            task,
            channel,
            synth,
            mic,
            camera,
            audio,
        }
    }

    pub async fn wait_for(
        &self,
        what: &str,
        predicate: impl FnMut(&SessionSnapshot) -> bool,
    ) -> SessionSnapshot {
        match tokio::time::timeout(WAIT, self.handle.wait_for(predicate)).await {
            Ok(Ok(snapshot)) => snapshot,
            Ok(Err(e)) => panic!("session closed waiting for {}: {}", what, e),
            Err(_) => panic!(
                "timed out waiting for {} (last snapshot: {:?})",
                what,
                self.handle.snapshot()
            ),
        }
    }

    pub async fn wait_phase(&self, phase: Phase) -> SessionSnapshot {
        self.wait_for(&format!("{:?}", phase), |s| s.phase() == phase)
            .await
    }

    /// Log in as `id`/`name` and wait for the conversation to open
    pub async fn login(&self, id: &str, name: &str) -> SessionSnapshot {
        self.handle
            .send(blossom_kiosk::UiIntent::Login)
            .unwrap();
        self.wait_phase(Phase::Authenticating).await;

        self.channel.inject(
            "auth-success",
            serde_json::json!({ "id": id, "name": name }),
        );
        self.wait_for("conversation", |s| {
            s.phase() == Phase::Idle && !s.speaking
        })
        .await
    }
}
