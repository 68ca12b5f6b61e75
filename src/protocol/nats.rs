use anyhow::{Context, Result};
use async_nats::Client;
use futures::stream::{BoxStream, StreamExt};
use tracing::info;

use super::client::{EventChannel, RawEvent};

/// Event channel over NATS
///
/// Outbound events go to `<prefix>.out.<event>`; inbound events arrive on
/// `<prefix>.in.<event>`.
pub struct NatsChannel {
    client: Client,
    prefix: String,
}

impl NatsChannel {
    /// Connect to NATS server
    pub async fn connect(url: &str, prefix: impl Into<String>) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self {
            client,
            prefix: prefix.into(),
        })
    }

    fn outbound_subject(&self, event: &str) -> String {
        format!("{}.out.{}", self.prefix, event)
    }

    fn inbound_subject(&self) -> String {
        format!("{}.in.>", self.prefix)
    }
}

#[async_trait::async_trait]
impl EventChannel for NatsChannel {
    fn is_connected(&self) -> bool {
        self.client.connection_state() == async_nats::connection::State::Connected
    }

    async fn emit(&self, event: &str, payload: Vec<u8>) -> Result<()> {
        let subject = self.outbound_subject(event);

        self.client
            .publish(subject.clone(), payload.into())
            .await
            .with_context(|| format!("Failed to publish to {}", subject))?;

        Ok(())
    }

    async fn listen(&self) -> Result<BoxStream<'static, RawEvent>> {
        let subject = self.inbound_subject();

        info!("Subscribing to backend events on {}", subject);

        let subscriber = self
            .client
            .subscribe(subject.clone())
            .await
            .context("Failed to subscribe to backend events")?;

        let event_prefix = format!("{}.in.", self.prefix);

        Ok(subscriber
            .map(move |msg| {
                let subject = msg.subject.to_string();
                RawEvent {
                    name: subject
                        .strip_prefix(&event_prefix)
                        .unwrap_or(&subject)
                        .to_string(),
                    payload: msg.payload.to_vec(),
                }
            })
            .boxed())
    }
}
