//! Queue consumer
//!
//! One loop pops messages in arrival order and fully processes each one
//! (dispatch, then every write) before taking the next. Each message is
//! processed on its own task so that a panic in the engine or in a sink only
//! loses that message. The loop ends on the shutdown sentinel or when every
//! producer is gone.

use std::any::Any;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::metrics::PipelineStats;
use crate::sink::RecordSink;
use crate::source::{IncomingMessage, QueueItem};
use crate::transformer::{RuleEngine, WriteOutcome, WriteSummary};

/// Consumer side of the message queue
pub struct Pipeline<S> {
    engine: Arc<RuleEngine>,
    sink: Arc<S>,
    receiver: mpsc::Receiver<QueueItem>,
    stats: Arc<PipelineStats>,
}

impl<S: RecordSink + 'static> Pipeline<S> {
    pub fn new(engine: Arc<RuleEngine>, sink: Arc<S>, receiver: mpsc::Receiver<QueueItem>) -> Self {
        Self {
            engine,
            sink,
            receiver,
            stats: Arc::new(PipelineStats::new()),
        }
    }

    /// Share an existing statistics instance
    pub fn with_stats(mut self, stats: Arc<PipelineStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    /// Run the loop on the current task until shutdown
    pub async fn run(self) -> Arc<PipelineStats> {
        let Pipeline {
            engine,
            sink,
            mut receiver,
            stats,
        } = self;

        info!(rules = engine.rules().len(), "Queue consumer started");

        while let Some(item) = receiver.recv().await {
            match item {
                QueueItem::Message(message) => {
                    let topic = message.topic.clone();
                    let task = tokio::spawn(process_message(
                        Arc::clone(&engine),
                        Arc::clone(&sink),
                        Arc::clone(&stats),
                        message,
                    ));

                    if let Err(e) = task.await {
                        stats.errors.inc();
                        if e.is_panic() {
                            let panic = e.into_panic();
                            error!(
                                topic = %topic,
                                error_type = "panic",
                                error = %panic_message(panic.as_ref()),
                                "Failed to process message"
                            );
                        } else {
                            error!(
                                topic = %topic,
                                error_type = "cancelled",
                                error = %e,
                                "Failed to process message"
                            );
                        }
                    }
                }
                QueueItem::Shutdown => {
                    info!("Shutdown requested");
                    break;
                }
            }
        }

        info!(received = stats.received.get(), "Queue consumer stopped");
        stats
    }

    /// Run the loop on a new task
    pub fn spawn(self) -> JoinHandle<Arc<PipelineStats>> {
        tokio::spawn(self.run())
    }
}

async fn process_message<S: RecordSink>(
    engine: Arc<RuleEngine>,
    sink: Arc<S>,
    stats: Arc<PipelineStats>,
    message: IncomingMessage,
) {
    debug!(
        topic = %message.topic,
        qos = message.qos,
        retain = message.retain,
        payload = %message.payload_lossy(),
        "Received message"
    );
    stats.received.inc();

    let (dispatched, report) = engine.dispatch_with_report(&message);
    stats.record_dispatch(&report);

    let mut summary = WriteSummary::default();
    for item in &dispatched {
        let outcome = engine.write_one(&message.topic, item, sink.as_ref()).await;
        if outcome != WriteOutcome::Suppressed {
            stats.record_rule(item.rule.topic(), outcome == WriteOutcome::Failed);
        }
        summary.add(outcome);
    }
    stats.record_writes(&summary);
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
