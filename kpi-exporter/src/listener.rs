//! Topic listener.
//!
//! A [`TopicListener`] owns the subscription to one topic. It enumerates the
//! topic's partitions on the shared bus connection and consumes each one in
//! its own task. Every message is decoded with the listener's [`KpiKind`] and
//! exported before the next message on that partition is awaited.
//!
//! Undecodable messages are logged and skipped. A fatal bus error on any
//! partition stops the whole listener; it then reports a single
//! [`ListenerOutcome`] back to its caller.

use std::sync::Arc;

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use kpi_common::KpiKind;

use crate::bus::{BusError, BusMessage, MessageBus, PartitionStream};
use crate::exporter::SharedExporter;
use crate::registry::{MetricRegistry, RegistryError};

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct TopicLabels {
    topic: String,
}

/// Per-topic consumption counters.
#[derive(Clone)]
pub struct ListenerMetrics {
    messages_received: Family<TopicLabels, Counter>,
    decode_errors: Family<TopicLabels, Counter>,
}

impl ListenerMetrics {
    /// Register the consumption counters.
    pub fn register(registry: &MetricRegistry) -> Result<Self, RegistryError> {
        Ok(Self {
            messages_received: registry.counter_family(
                "kpi_exporter_messages_received",
                "Number of messages received per topic",
            )?,
            decode_errors: registry.counter_family(
                "kpi_exporter_decode_errors",
                "Number of messages per topic that could not be decoded",
            )?,
        })
    }

    fn record_message(&self, topic: &str) {
        self.messages_received
            .get_or_create(&TopicLabels {
                topic: topic.to_string(),
            })
            .inc();
    }

    fn record_decode_error(&self, topic: &str) {
        self.decode_errors
            .get_or_create(&TopicLabels {
                topic: topic.to_string(),
            })
            .inc();
    }
}

/// How a listener terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerOutcome {
    /// Every partition stream ended cleanly or shutdown was requested.
    Completed,
    /// Subscription failed or a partition hit a fatal bus error.
    Failed(BusError),
}

impl ListenerOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, ListenerOutcome::Failed(_))
    }
}

/// Consumes every partition of one topic.
pub struct TopicListener<B: MessageBus> {
    topic: String,
    kind: KpiKind,
    bus: Arc<B>,
    exporter: SharedExporter,
    metrics: ListenerMetrics,
}

impl<B: MessageBus> TopicListener<B> {
    /// Create a listener for `topic`, decoding its messages as `kind`.
    pub fn new(
        topic: impl Into<String>,
        kind: KpiKind,
        bus: Arc<B>,
        exporter: SharedExporter,
        metrics: ListenerMetrics,
    ) -> Self {
        Self {
            topic: topic.into(),
            kind,
            bus,
            exporter,
            metrics,
        }
    }

    /// Consume the topic until every partition ends, a fatal error occurs,
    /// or `shutdown` becomes `true`.
    ///
    /// The bus handle is released when this returns.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> ListenerOutcome {
        let topic = self.topic.as_str();

        if topic.is_empty() {
            let err = BusError::subscription(topic, "topic name is empty");
            error!(kind = %self.kind, error = %err, "Listener failed");
            return ListenerOutcome::Failed(err);
        }

        let partitions = tokio::select! {
            biased;
            _ = cancelled(&mut shutdown) => {
                info!(topic, "Shutdown requested before subscribing");
                return ListenerOutcome::Completed;
            }
            result = self.bus.partitions(topic) => result,
        };

        let partitions = match partitions {
            Ok(partitions) if partitions.is_empty() => {
                let err = BusError::subscription(topic, "topic has no partitions");
                error!(topic, error = %err, "Failed to subscribe");
                return ListenerOutcome::Failed(err);
            }
            Ok(partitions) => partitions,
            Err(err) => {
                error!(topic, error = %err, "Failed to subscribe");
                return ListenerOutcome::Failed(err);
            }
        };

        let mut tasks = JoinSet::new();
        for &partition in &partitions {
            let stream = match self.bus.consume_partition(topic, partition) {
                Ok(stream) => stream,
                Err(err) => {
                    error!(topic, partition, error = %err, "Failed to consume partition");
                    tasks.abort_all();
                    return ListenerOutcome::Failed(err);
                }
            };

            let worker = PartitionWorker {
                topic: self.topic.clone(),
                partition,
                kind: self.kind,
                exporter: Arc::clone(&self.exporter),
                metrics: self.metrics.clone(),
            };
            tasks.spawn(worker.run(stream, shutdown.clone()));
        }

        info!(
            topic,
            kind = %self.kind,
            partitions = partitions.len(),
            "Listening"
        );

        let mut failure: Option<BusError> = None;
        while let Some(joined) = tasks.join_next().await {
            let err = match joined {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err,
                Err(join_err) if join_err.is_cancelled() => continue,
                Err(join_err) => {
                    BusError::Connection(format!("partition task panicked: {join_err}"))
                }
            };

            if failure.is_none() {
                // A fatal error is connection level; the sibling partitions
                // cannot make progress either.
                tasks.abort_all();
                failure = Some(err);
            }
        }

        match failure {
            Some(err) => {
                error!(topic, error = %err, "Listener failed");
                ListenerOutcome::Failed(err)
            }
            None => {
                info!(topic, "Listener completed");
                ListenerOutcome::Completed
            }
        }
    }
}

struct PartitionWorker {
    topic: String,
    partition: i32,
    kind: KpiKind,
    exporter: SharedExporter,
    metrics: ListenerMetrics,
}

impl PartitionWorker {
    async fn run<S: PartitionStream>(
        self,
        mut stream: S,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), BusError> {
        let topic = self.topic.as_str();
        let partition = self.partition;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancelled(&mut shutdown) => {
                    debug!(topic, partition, "Partition consumer cancelled");
                    return Ok(());
                }
                next = stream.next_message() => next,
            };

            match next {
                Some(Ok(message)) => self.handle(&message),
                Some(Err(err)) if !err.is_fatal() => {
                    warn!(topic, partition, error = %err, "Consumer error, continuing");
                }
                Some(Err(err)) => {
                    error!(topic, partition, error = %err, "Partition consumer failed");
                    return Err(err);
                }
                None => {
                    debug!(topic, partition, "Partition stream ended");
                    return Ok(());
                }
            }
        }
    }

    fn handle(&self, message: &BusMessage) {
        self.metrics.record_message(&self.topic);

        match self.kind.decode(&message.payload) {
            Ok(kpi) => self.exporter.export(&kpi),
            Err(err) => {
                self.metrics.record_decode_error(&self.topic);
                warn!(
                    topic = %self.topic,
                    partition = message.partition,
                    offset = message.offset,
                    error = %err,
                    "Skipping undecodable message"
                );
            }
        }
    }
}

/// Resolve once `shutdown` holds `true`.
///
/// A dropped sender can never request shutdown, so this then never resolves.
pub(crate) async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    let closed = shutdown.wait_for(|stop| *stop).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}
