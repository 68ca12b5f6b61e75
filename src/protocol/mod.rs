pub mod client;
pub mod messages;
pub mod nats;

pub use client::{CommandProtocolClient, EventChannel, RawEvent};
pub use messages::{
    ActionConfirmMessage, AudioUploadMessage, AuthSuccess, CommandMessage, CommandResponse,
    IdentifyFrame, InboundEvent, OutboundIntent, PauseMessage, ResponseKind, UserSpeech,
};
pub use nats::NatsChannel;
