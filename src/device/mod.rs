//! Device adapters for a Linux kiosk
//!
//! Every capability is an external program configured under `[devices]`:
//! - Speech synthesis (`speak`)
//! - Microphone recording (`record`)
//! - Camera snapshots (`snapshot`)
//! - Audio route hooks and the warm-up cue player

mod command;

pub use command::{
    CommandAudioDevice, CommandCamera, CommandLine, CommandMicrophone, CommandSynthesizer,
};
