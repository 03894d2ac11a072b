//! Ingest source fed by the HTTP publish endpoint

use tracing::{debug, info};

use super::{IncomingMessage, MessageSource, QueueSender};
use crate::error::SourceError;
use crate::topic::{is_valid_filter, matches_subscription};

/// Message source that accepts published messages and queues the ones
/// matching a subscription
#[derive(Debug, Clone)]
pub struct IngestSource {
    prefix: String,
    filters: Vec<String>,
    sender: QueueSender,
}

impl IngestSource {
    /// Create a source with a topic prefix
    ///
    /// A non-empty prefix is normalized to end with `/`.
    pub fn new(prefix: impl Into<String>, sender: QueueSender) -> Self {
        let mut prefix = prefix.into();
        if !prefix.is_empty() && !prefix.ends_with('/') {
            prefix.push('/');
        }

        Self {
            prefix,
            filters: Vec::new(),
            sender,
        }
    }

    /// Normalized prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Strip the prefix from a full topic
    pub fn strip_prefix<'a>(&self, topic: &'a str) -> Result<&'a str, SourceError> {
        topic
            .strip_prefix(self.prefix.as_str())
            .ok_or_else(|| SourceError::MissingPrefix {
                topic: topic.to_string(),
                prefix: self.prefix.clone(),
            })
    }

    /// Whether a prefix-stripped topic matches any subscription
    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.filters
            .iter()
            .any(|filter| matches_subscription(filter, topic))
    }

    /// Accept a published message
    ///
    /// Returns `Ok(true)` when the message was queued and `Ok(false)` when
    /// no subscription matches it. Waits while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns `SourceError::MissingPrefix` if the topic does not start with
    /// the prefix, and `SourceError::QueueClosed` once the consumer is gone.
    pub async fn accept(
        &self,
        full_topic: &str,
        payload: Vec<u8>,
        qos: u8,
        retain: bool,
    ) -> Result<bool, SourceError> {
        let topic = self.strip_prefix(full_topic)?;

        if !self.is_subscribed(topic) {
            debug!(topic = %full_topic, "No subscription matches topic");
            return Ok(false);
        }

        let message = IncomingMessage {
            topic: topic.to_string(),
            payload,
            qos,
            retain,
        };
        self.sender.send(message).await?;
        Ok(true)
    }

    /// Queue the shutdown sentinel
    pub async fn shutdown(&self) -> Result<(), SourceError> {
        self.sender.shutdown().await
    }
}

impl MessageSource for IngestSource {
    fn subscribe(&mut self, filter: &str) -> Result<(), SourceError> {
        if !is_valid_filter(filter) {
            return Err(SourceError::InvalidFilter(filter.to_string()));
        }

        if !self.filters.iter().any(|f| f == filter) {
            info!(filter = %format!("{}{}", self.prefix, filter), "Subscribing");
            self.filters.push(filter.to_string());
        }
        Ok(())
    }

    fn subscriptions(&self) -> &[String] {
        &self.filters
    }
}
