//! Message source module
//!
//! Inbound messages travel from a [`MessageSource`] through a bounded queue
//! to the single consumer in [`crate::pipeline`]. The queue preserves
//! arrival order; a full queue makes producers wait.

pub mod ingest;

pub use ingest::IngestSource;

use tokio::sync::mpsc;

use crate::error::SourceError;

/// Default queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// A message as delivered by the source, topic already prefix-stripped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: u8,
    /// Delivered from the broker's retained store
    pub retain: bool,
}

impl IncomingMessage {
    /// Create a QoS 0, non-retained message
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos: 0,
            retain: false,
        }
    }

    pub fn with_qos(mut self, qos: u8) -> Self {
        self.qos = qos;
        self
    }

    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    /// Payload for log output
    pub fn payload_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// Queue entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueItem {
    Message(IncomingMessage),
    /// Stops the consumer after everything queued before it
    Shutdown,
}

/// Bounded, ordered message queue
pub struct MessageQueue;

impl MessageQueue {
    /// Create a queue holding at most `capacity` items
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero; configuration validation rejects that.
    pub fn bounded(capacity: usize) -> (QueueSender, mpsc::Receiver<QueueItem>) {
        let (tx, rx) = mpsc::channel(capacity);
        (QueueSender { inner: tx }, rx)
    }
}

/// Producer side of the message queue
#[derive(Debug, Clone)]
pub struct QueueSender {
    inner: mpsc::Sender<QueueItem>,
}

impl QueueSender {
    /// Enqueue a message, waiting for free space
    pub async fn send(&self, message: IncomingMessage) -> Result<(), SourceError> {
        self.inner
            .send(QueueItem::Message(message))
            .await
            .map_err(|_| SourceError::QueueClosed)
    }

    /// Enqueue the shutdown sentinel
    pub async fn shutdown(&self) -> Result<(), SourceError> {
        self.inner
            .send(QueueItem::Shutdown)
            .await
            .map_err(|_| SourceError::QueueClosed)
    }

    /// Free slots
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

/// Something that delivers messages for a set of subscriptions
pub trait MessageSource {
    /// Register interest in a subscription filter
    fn subscribe(&mut self, filter: &str) -> Result<(), SourceError>;

    /// Filters registered so far
    fn subscriptions(&self) -> &[String];
}
