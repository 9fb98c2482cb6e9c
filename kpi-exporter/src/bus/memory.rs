//! In-process message bus.
//!
//! [`MemoryBroker`] holds topics and partitions in memory and hands out
//! [`MemoryBus`] connections. Tests publish payloads, inject consumer errors
//! and end partition streams through the broker while listeners consume them.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{BusConnector, BusError, BusMessage, MessageBus, PartitionStream};

type Delivery = Result<BusMessage, BusError>;

struct PartitionLog {
    sender: Option<mpsc::UnboundedSender<Delivery>>,
    receiver: Option<mpsc::UnboundedReceiver<Delivery>>,
    next_offset: i64,
}

impl PartitionLog {
    fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender: Some(sender),
            receiver: Some(receiver),
            next_offset: 0,
        }
    }
}

#[derive(Default)]
struct BrokerState {
    topics: HashMap<String, Vec<PartitionLog>>,
    connect_error: Option<String>,
    connections_opened: usize,
    connections_closed: usize,
}

/// In-memory broker shared between a test and the connections it hands out.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl MemoryBroker {
    /// Create an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a topic with the given number of partitions.
    pub fn create_topic(&self, topic: impl Into<String>, partitions: usize) {
        let logs = (0..partitions).map(|_| PartitionLog::new()).collect();
        self.state.lock().topics.insert(topic.into(), logs);
    }

    /// Append a payload to a partition, returning its offset.
    pub fn publish(
        &self,
        topic: &str,
        partition: i32,
        payload: impl Into<Vec<u8>>,
    ) -> Result<i64, BusError> {
        let mut state = self.state.lock();
        let log = partition_log(&mut state, topic, partition)?;
        let offset = log.next_offset;

        let message = BusMessage {
            topic: topic.to_string(),
            partition,
            offset,
            payload: payload.into(),
        };
        deliver(log, topic, Ok(message))?;

        log.next_offset += 1;
        Ok(offset)
    }

    /// Queue a consumer error on a partition.
    pub fn inject_error(
        &self,
        topic: &str,
        partition: i32,
        error: BusError,
    ) -> Result<(), BusError> {
        let mut state = self.state.lock();
        let log = partition_log(&mut state, topic, partition)?;
        deliver(log, topic, Err(error))
    }

    /// End a partition stream once its queued messages are drained.
    pub fn close_partition(&self, topic: &str, partition: i32) -> Result<(), BusError> {
        let mut state = self.state.lock();
        partition_log(&mut state, topic, partition)?.sender = None;
        Ok(())
    }

    /// End every partition stream of a topic.
    pub fn close_topic(&self, topic: &str) -> Result<(), BusError> {
        let mut state = self.state.lock();
        let logs = state
            .topics
            .get_mut(topic)
            .ok_or_else(|| BusError::subscription(topic, "unknown topic"))?;
        for log in logs {
            log.sender = None;
        }
        Ok(())
    }

    /// Make subsequent connection attempts fail.
    pub fn refuse_connections(&self, reason: impl Into<String>) {
        self.state.lock().connect_error = Some(reason.into());
    }

    /// Number of connections handed out.
    pub fn connections_opened(&self) -> usize {
        self.state.lock().connections_opened
    }

    /// Number of connections closed.
    pub fn connections_closed(&self) -> usize {
        self.state.lock().connections_closed
    }
}

fn partition_log<'a>(
    state: &'a mut BrokerState,
    topic: &str,
    partition: i32,
) -> Result<&'a mut PartitionLog, BusError> {
    state
        .topics
        .get_mut(topic)
        .and_then(|logs| usize::try_from(partition).ok().and_then(|i| logs.get_mut(i)))
        .ok_or_else(|| BusError::subscription(topic, format!("unknown partition {partition}")))
}

fn deliver(log: &PartitionLog, topic: &str, delivery: Delivery) -> Result<(), BusError> {
    log.sender
        .as_ref()
        .ok_or_else(|| BusError::subscription(topic, "partition is closed"))?
        .send(delivery)
        .map_err(|_| BusError::subscription(topic, "partition stream was dropped"))
}

impl BusConnector for MemoryBroker {
    type Bus = MemoryBus;

    async fn connect(&self) -> Result<MemoryBus, BusError> {
        let mut state = self.state.lock();
        if let Some(reason) = &state.connect_error {
            return Err(BusError::Connection(reason.clone()));
        }
        state.connections_opened += 1;

        Ok(MemoryBus {
            state: Arc::clone(&self.state),
        })
    }
}

/// Connection to a [`MemoryBroker`].
pub struct MemoryBus {
    state: Arc<Mutex<BrokerState>>,
}

impl MessageBus for MemoryBus {
    type Stream = MemoryPartitionStream;

    async fn partitions(&self, topic: &str) -> Result<Vec<i32>, BusError> {
        let state = self.state.lock();
        let logs = state
            .topics
            .get(topic)
            .ok_or_else(|| BusError::subscription(topic, "unknown topic"))?;

        Ok((0..logs.len()).filter_map(|i| i32::try_from(i).ok()).collect())
    }

    fn consume_partition(
        &self,
        topic: &str,
        partition: i32,
    ) -> Result<MemoryPartitionStream, BusError> {
        let mut state = self.state.lock();
        let receiver = partition_log(&mut state, topic, partition)?
            .receiver
            .take()
            .ok_or_else(|| {
                BusError::subscription(topic, format!("partition {partition} already consumed"))
            })?;

        Ok(MemoryPartitionStream { receiver })
    }

    fn close(self) -> Result<(), BusError> {
        self.state.lock().connections_closed += 1;
        Ok(())
    }
}

/// Messages from one in-memory partition.
pub struct MemoryPartitionStream {
    receiver: mpsc::UnboundedReceiver<Delivery>,
}

impl PartitionStream for MemoryPartitionStream {
    async fn next_message(&mut self) -> Option<Result<BusMessage, BusError>> {
        self.receiver.recv().await
    }
}
