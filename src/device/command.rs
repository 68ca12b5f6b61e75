//! Collaborators backed by external programs

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, Notify};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audio::{AudioDevice, AudioMode, Microphone, SilentCue, SpeechSynthesizer};
use crate::auth::Camera;
use crate::language::VoiceParams;

/// How long a recorder gets to flush after SIGINT
const RECORDER_FLUSH_TIMEOUT: Duration = Duration::from_secs(3);

/// Upper bound for one camera snapshot
const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(5);

/// Program plus argument template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
}

impl CommandLine {
    /// `None` for an empty list
    pub fn from_args(args: &[String]) -> Option<Self> {
        let (program, rest) = args.split_first()?;
        Some(Self {
            program: program.clone(),
            args: rest.to_vec(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments with `{name}` placeholders replaced
    pub fn render(&self, vars: &[(&str, &str)]) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                vars.iter().fold(arg.clone(), |acc, (name, value)| {
                    acc.replace(&format!("{{{}}}", name), value)
                })
            })
            .collect()
    }

    fn command(&self, vars: &[(&str, &str)]) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(self.render(vars))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        command
    }
}

fn required(args: &[String], what: &str) -> Result<CommandLine> {
    CommandLine::from_args(args).with_context(|| format!("no {} command configured", what))
}

async fn run_to_completion(mut command: Command, what: &str) -> Result<()> {
    let output = command
        .kill_on_drop(true)
        .output()
        .await
        .with_context(|| format!("failed to spawn {}", what))?;

    if !output.stderr.is_empty() {
        debug!("{} stderr: {}", what, String::from_utf8_lossy(&output.stderr).trim());
    }
    if !output.status.success() {
        bail!("{} exited with {}", what, output.status);
    }
    Ok(())
}

// ============================================================================
// Speech synthesis
// ============================================================================

/// Speaks by running a TTS program once per utterance
pub struct CommandSynthesizer {
    command: CommandLine,
    interrupt: Notify,
}

impl CommandSynthesizer {
    pub fn new(args: &[String]) -> Result<Self> {
        Ok(Self {
            command: required(args, "speak")?,
            interrupt: Notify::new(),
        })
    }
}

#[async_trait::async_trait]
impl SpeechSynthesizer for CommandSynthesizer {
    async fn speak(&self, text: &str, voice: &VoiceParams) -> Result<()> {
        let rate = voice.rate.to_string();
        let pitch = voice.pitch.to_string();
        let mut command = self.command.command(&[
            ("text", text),
            ("lang", voice.language_tag),
            ("rate", rate.as_str()),
            ("pitch", pitch.as_str()),
        ]);

        let interrupted = self.interrupt.notified();
        tokio::pin!(interrupted);

        let mut child = command
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.command.program()))?;

        tokio::select! {
            status = child.wait() => {
                let status = status.context("speech process failed")?;
                if !status.success() {
                    bail!("{} exited with {}", self.command.program(), status);
                }
                Ok(())
            }
            _ = &mut interrupted => {
                child.kill().await.context("failed to kill speech process")?;
                Ok(())
            }
        }
    }

    async fn stop(&self) -> Result<()> {
        self.interrupt.notify_waiters();
        Ok(())
    }
}

// ============================================================================
// Microphone
// ============================================================================

/// Records by running a recorder until it is interrupted
pub struct CommandMicrophone {
    command: CommandLine,
    directory: PathBuf,
    extension: String,
    recorder: Mutex<Option<Child>>,
}

impl CommandMicrophone {
    pub fn new(args: &[String], directory: impl Into<PathBuf>, extension: &str) -> Result<Self> {
        Ok(Self {
            command: required(args, "record")?,
            directory: directory.into(),
            extension: extension.to_string(),
            recorder: Mutex::new(None),
        })
    }

    fn next_location(&self) -> PathBuf {
        self.directory
            .join(format!("utterance-{}.{}", Uuid::new_v4(), self.extension))
    }
}

#[async_trait::async_trait]
impl Microphone for CommandMicrophone {
    async fn request_permission(&self) -> Result<bool> {
        // No grant dialog on Linux; a writable spool directory is enough
        tokio::fs::create_dir_all(&self.directory)
            .await
            .with_context(|| format!("cannot create {}", self.directory.display()))?;
        Ok(true)
    }

    async fn start_recording(&self) -> Result<PathBuf> {
        let mut recorder = self.recorder.lock().await;
        if recorder.is_some() {
            bail!("recorder already running");
        }

        let location = self.next_location();
        let path = location.to_string_lossy();
        let child = self
            .command
            .command(&[("path", &*path)])
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.command.program()))?;

        info!("Recorder {} started (pid {:?})", self.command.program(), child.id());
        *recorder = Some(child);
        Ok(location)
    }

    async fn stop_recording(&self) -> Result<()> {
        let Some(mut child) = self.recorder.lock().await.take() else {
            return Ok(());
        };

        // SIGINT lets recorders write their container trailer
        if let Some(pid) = child.id() {
            let pid = pid.to_string();
            let status = Command::new("kill")
                .args(["-INT", pid.as_str()])
                .status()
                .await
                .context("failed to signal recorder")?;
            if !status.success() {
                warn!("kill -INT {} exited with {}", pid, status);
            }
        }

        match timeout(RECORDER_FLUSH_TIMEOUT, child.wait()).await {
            Ok(status) => {
                let status = status.context("recorder failed")?;
                debug!("Recorder exited with {}", status);
            }
            Err(_) => {
                warn!("Recorder ignored SIGINT, killing it");
                child.kill().await.context("failed to kill recorder")?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// Camera
// ============================================================================

/// Takes stills with a snapshot program that writes JPEG to stdout
pub struct CommandCamera {
    command: CommandLine,
}

impl CommandCamera {
    pub fn new(args: &[String]) -> Result<Self> {
        Ok(Self {
            command: required(args, "snapshot")?,
        })
    }
}

#[async_trait::async_trait]
impl Camera for CommandCamera {
    async fn request_permission(&self) -> Result<bool> {
        Ok(true)
    }

    async fn capture_frame(&self) -> Result<Vec<u8>> {
        let mut command = self.command.command(&[]);
        command.stdout(Stdio::piped()).kill_on_drop(true);

        let output = timeout(SNAPSHOT_TIMEOUT, command.output())
            .await
            .context("snapshot timed out")?
            .with_context(|| format!("failed to spawn {}", self.command.program()))?;

        if !output.status.success() {
            bail!(
                "{} exited with {}: {}",
                self.command.program(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        if output.stdout.is_empty() {
            bail!("{} produced no image", self.command.program());
        }
        Ok(output.stdout)
    }
}

// ============================================================================
// Audio routing and cues
// ============================================================================

/// Audio path control through optional route hooks
///
/// There is no engine to toggle; `set_enabled` only logs.
pub struct CommandAudioDevice {
    playback_route: Option<CommandLine>,
    capture_route: Option<CommandLine>,
    cue_player: Option<CommandLine>,
    spool: PathBuf,
}

impl CommandAudioDevice {
    pub fn new(
        playback_route: &[String],
        capture_route: &[String],
        cue_player: &[String],
        spool: impl Into<PathBuf>,
    ) -> Self {
        Self {
            playback_route: CommandLine::from_args(playback_route),
            capture_route: CommandLine::from_args(capture_route),
            cue_player: CommandLine::from_args(cue_player),
            spool: spool.into(),
        }
    }
}

#[async_trait::async_trait]
impl AudioDevice for CommandAudioDevice {
    async fn configure(&self, mode: AudioMode) -> Result<()> {
        let hook = match mode {
            AudioMode::Playback => self.playback_route.as_ref(),
            AudioMode::Capture => self.capture_route.as_ref(),
            AudioMode::Uninitialized => None,
        };

        match hook {
            Some(hook) => {
                let mode = mode.to_string();
                run_to_completion(hook.command(&[("mode", mode.as_str())]), hook.program()).await
            }
            None => Ok(()),
        }
    }

    async fn set_enabled(&self, enabled: bool) -> Result<()> {
        debug!("Audio engine {}", if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    async fn load_cue(&self, data: &[u8], play_immediately: bool) -> Result<Box<dyn SilentCue>> {
        let player = self
            .cue_player
            .clone()
            .context("no cue player configured")?;

        tokio::fs::create_dir_all(&self.spool)
            .await
            .with_context(|| format!("cannot create {}", self.spool.display()))?;
        let path = self.spool.join(format!("cue-{}.mp3", Uuid::new_v4()));
        tokio::fs::write(&path, data)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;

        let cue = FileCue {
            path,
            player,
        };
        if play_immediately {
            cue.replay().await?;
        }
        Ok(Box::new(cue))
    }

    fn name(&self) -> &str {
        "command"
    }
}

/// Cue file on disk, played by the configured player
struct FileCue {
    path: PathBuf,
    player: CommandLine,
}

impl FileCue {
    fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl SilentCue for FileCue {
    async fn replay(&self) -> Result<()> {
        let path = self.path().to_string_lossy();
        let mut child = self
            .player
            .command(&[("path", &*path)])
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.player.program()))?;

        // Playback runs on; callers only need the output path kicked
        tokio::spawn(async move {
            if let Err(e) = child.wait().await {
                warn!("Cue player failed: {}", e);
            }
        });
        Ok(())
    }

    async fn unload(&self) -> Result<()> {
        tokio::fs::remove_file(self.path())
            .await
            .with_context(|| format!("failed to remove {}", self.path.display()))
    }
}
