//! Kafka implementation of the message bus.
//!
//! One `StreamConsumer` is shared by every listener. Each (topic, partition)
//! gets its own split partition queue, assigned at the newest offset, so the
//! partitions are consumed independently. The consumer's main queue still has
//! to be polled for events, which a background driver task does until the
//! connection is closed.

use std::sync::Arc;
use std::time::Duration;

use rdkafka::ClientConfig;
use rdkafka::consumer::stream_consumer::StreamPartitionQueue;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::Message;
use rdkafka::{Offset, TopicPartitionList};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use kpi_common::KafkaConfig;

use super::{BusConnector, BusError, BusMessage, MessageBus, PartitionStream};

/// Opens [`KafkaBus`] connections from configuration.
#[derive(Debug, Clone)]
pub struct KafkaConnector {
    config: KafkaConfig,
}

impl KafkaConnector {
    /// Create a connector for the configured broker.
    pub fn new(config: KafkaConfig) -> Self {
        Self { config }
    }

    fn client_config(&self) -> ClientConfig {
        let mut client = ClientConfig::new();
        client
            .set("bootstrap.servers", &self.config.broker)
            .set("group.id", &self.config.group_id)
            .set("client.id", &self.config.client_id)
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false")
            .set("enable.partition.eof", "false");
        client
    }
}

impl BusConnector for KafkaConnector {
    type Bus = KafkaBus;

    async fn connect(&self) -> Result<KafkaBus, BusError> {
        info!(broker = %self.config.broker, "Connecting to Kafka");

        let consumer: StreamConsumer = self
            .client_config()
            .create()
            .map_err(|e| BusError::Connection(format!("failed to create consumer: {e}")))?;
        let consumer = Arc::new(consumer);
        let timeout = Duration::from_millis(self.config.metadata_timeout_ms);

        // Creating the client does not touch the network; a metadata round
        // trip is what proves the broker is reachable.
        let metadata_consumer = Arc::clone(&consumer);
        let brokers = tokio::task::spawn_blocking(move || {
            metadata_consumer
                .fetch_metadata(None, timeout)
                .map(|metadata| metadata.brokers().len())
        })
        .await
        .map_err(|e| BusError::Connection(format!("metadata task failed: {e}")))?
        .map_err(|e| BusError::Connection(format!("broker unreachable: {e}")))?;

        info!(broker = %self.config.broker, brokers, "Connected to Kafka");

        let (stop_tx, stop_rx) = watch::channel(false);
        let driver = tokio::spawn(drive_main_queue(Arc::clone(&consumer), stop_rx));

        Ok(KafkaBus {
            consumer,
            timeout,
            stop: stop_tx,
            driver,
        })
    }
}

/// Poll the main consumer queue so librdkafka can serve events.
async fn drive_main_queue(consumer: Arc<StreamConsumer>, mut stop: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            biased;
            _ = stop.changed() => break,
            result = consumer.recv() => match result {
                Ok(message) => {
                    // Assigned partitions are split off, so this only happens
                    // for partitions nobody asked for.
                    debug!(
                        topic = message.topic(),
                        partition = message.partition(),
                        "Ignoring message on the main queue"
                    );
                }
                Err(e) => warn!(error = %e, "Kafka consumer error"),
            },
        }
    }
    debug!("Kafka main queue driver stopped");
}

/// Shared Kafka connection.
pub struct KafkaBus {
    consumer: Arc<StreamConsumer>,
    timeout: Duration,
    stop: watch::Sender<bool>,
    driver: JoinHandle<()>,
}

impl MessageBus for KafkaBus {
    type Stream = KafkaPartitionStream;

    async fn partitions(&self, topic: &str) -> Result<Vec<i32>, BusError> {
        let consumer = Arc::clone(&self.consumer);
        let timeout = self.timeout;
        let name = topic.to_string();

        tokio::task::spawn_blocking(move || -> Result<Vec<i32>, BusError> {
            let metadata = consumer
                .fetch_metadata(Some(name.as_str()), timeout)
                .map_err(|e| BusError::subscription(&name, e.to_string()))?;

            let entry = metadata
                .topics()
                .iter()
                .find(|t| t.name() == name)
                .ok_or_else(|| BusError::subscription(&name, "topic missing from metadata"))?;

            if let Some(err) = entry.error() {
                return Err(BusError::subscription(&name, format!("{err:?}")));
            }

            Ok(entry.partitions().iter().map(|p| p.id()).collect())
        })
        .await
        .map_err(|e| BusError::subscription(topic, format!("metadata task failed: {e}")))?
    }

    fn consume_partition(
        &self,
        topic: &str,
        partition: i32,
    ) -> Result<KafkaPartitionStream, BusError> {
        let queue = self
            .consumer
            .split_partition_queue(topic, partition)
            .ok_or_else(|| {
                BusError::subscription(topic, format!("cannot split partition {partition}"))
            })?;

        let mut assignment = TopicPartitionList::new();
        assignment
            .add_partition_offset(topic, partition, Offset::End)
            .map_err(|e| BusError::subscription(topic, e.to_string()))?;
        self.consumer
            .incremental_assign(&assignment)
            .map_err(|e| BusError::subscription(topic, e.to_string()))?;

        debug!(topic, partition, "Assigned partition at newest offset");

        Ok(KafkaPartitionStream { queue })
    }

    fn close(self) -> Result<(), BusError> {
        let _ = self.stop.send(true);
        self.driver.abort();

        if let Err(e) = self.consumer.unassign() {
            return Err(BusError::Close(e.to_string()));
        }

        info!("Kafka connection closed");
        Ok(())
    }
}

/// Messages from one split Kafka partition queue.
pub struct KafkaPartitionStream {
    queue: StreamPartitionQueue<rdkafka::consumer::DefaultConsumerContext>,
}

impl PartitionStream for KafkaPartitionStream {
    async fn next_message(&mut self) -> Option<Result<BusMessage, BusError>> {
        let result = self.queue.recv().await.map(|message| BusMessage {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        });

        Some(result.map_err(classify_error))
    }
}

/// Map a consumer error onto the bus taxonomy.
fn classify_error(err: KafkaError) -> BusError {
    match err.rdkafka_error_code() {
        Some(
            RDKafkaErrorCode::AllBrokersDown
            | RDKafkaErrorCode::Fatal
            | RDKafkaErrorCode::UnknownTopicOrPartition
            | RDKafkaErrorCode::UnknownTopic
            | RDKafkaErrorCode::UnknownPartition,
        ) => BusError::Connection(err.to_string()),
        _ => BusError::Transient(err.to_string()),
    }
}
