// Message bus seam: publish/subscribe over named channels.
// Transports implement [`MessageBus`]; everything above it works with
// typed envelopes through the helpers in this module.
use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use tokio::sync::mpsc;

pub mod local;

pub use local::LocalBus;

pub type Result<T> = std::result::Result<T, BusError>;

#[derive(thiserror::Error, Debug)]
pub enum BusError {
    #[error("bus closed")]
    Closed,
    #[error("codec failure: {0}")]
    Codec(#[from] lariat_wire::Error),
    #[error("transport failure: {0}")]
    Transport(String),
}

/// Publish/subscribe transport. Delivery is at-most-once and unordered
/// across channels; a subscription sees messages in the order the bus
/// hands them over.
#[async_trait]
pub trait MessageBus: Send + Sync + 'static {
    async fn publish(&self, channel: &str, frame: Bytes) -> Result<()>;

    /// Fan-out subscription: every subscriber on the channel sees every
    /// message. `buffer` bounds the undelivered backlog.
    async fn subscribe(&self, channel: &str, buffer: usize) -> Result<RawSubscription>;

    /// Competing-consumer subscription: each message on the channel goes
    /// to exactly one member of the channel's queue group.
    async fn subscribe_queue(&self, channel: &str, buffer: usize) -> Result<RawSubscription>;
}

/// Undecoded subscription stream handed out by a transport.
pub struct RawSubscription {
    rx: mpsc::Receiver<Bytes>,
}

impl RawSubscription {
    pub fn new(rx: mpsc::Receiver<Bytes>) -> Self {
        Self { rx }
    }

    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    // Stops further deliveries; frames already buffered still drain.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

/// Typed view over a [`RawSubscription`], decoding one envelope per frame.
pub struct Subscription<T> {
    raw: RawSubscription,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Subscription<T> {
    pub fn new(raw: RawSubscription) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    /// Next decoded message; `Ok(None)` once the stream closes, `Err` for
    /// a frame that does not decode as `T`.
    pub async fn next(&mut self) -> Result<Option<T>> {
        match self.raw.recv().await {
            Some(frame) => lariat_wire::decode(&frame).map(Some).map_err(BusError::from),
            None => Ok(None),
        }
    }

    pub fn close(&mut self) {
        self.raw.close();
    }
}

/// Encode `message` and publish it on `channel`.
pub async fn publish<T: Serialize>(bus: &dyn MessageBus, channel: &str, message: &T) -> Result<()> {
    let frame = lariat_wire::encode(message)?;
    bus.publish(channel, frame).await
}

pub async fn subscribe<T: DeserializeOwned>(
    bus: &dyn MessageBus,
    channel: &str,
    buffer: usize,
) -> Result<Subscription<T>> {
    Ok(Subscription::new(bus.subscribe(channel, buffer).await?))
}

pub async fn subscribe_queue<T: DeserializeOwned>(
    bus: &dyn MessageBus,
    channel: &str,
    buffer: usize,
) -> Result<Subscription<T>> {
    Ok(Subscription::new(bus.subscribe_queue(channel, buffer).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Note {
        body: String,
    }

    #[tokio::test]
    async fn typed_subscription_decodes_frames() {
        let bus = LocalBus::new();
        let mut notes = subscribe::<Note>(&bus, "notes", 8).await.expect("subscribe");
        publish(
            &bus,
            "notes",
            &Note {
                body: "typed".into(),
            },
        )
        .await
        .expect("publish");
        let note = notes.next().await.expect("next").expect("message");
        assert_eq!(note.body, "typed");
    }

    #[tokio::test]
    async fn typed_subscription_surfaces_decode_errors() {
        let bus = LocalBus::new();
        let mut notes = subscribe::<Note>(&bus, "notes", 8).await.expect("subscribe");
        bus.publish("notes", Bytes::from_static(b"not json"))
            .await
            .expect("publish");
        let err = notes.next().await.expect_err("decode failure");
        assert!(matches!(err, BusError::Codec(_)));
    }

    #[tokio::test]
    async fn closed_subscription_returns_none() {
        let bus = LocalBus::new();
        let mut notes = subscribe::<Note>(&bus, "notes", 8).await.expect("subscribe");
        notes.close();
        assert!(notes.next().await.expect("next").is_none());
    }
}
