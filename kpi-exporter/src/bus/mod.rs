//! Message bus abstraction.
//!
//! A [`BusConnector`] opens one shared [`MessageBus`] connection. Listeners
//! enumerate a topic's partitions through it and open one ordered
//! [`PartitionStream`] per partition. The connection is closed exactly once,
//! by value, after every listener has released it.

use std::future::Future;

use thiserror::Error;

pub mod kafka;
pub mod memory;

pub use kafka::{KafkaBus, KafkaConnector};
pub use memory::{MemoryBroker, MemoryBus};

/// A raw message received from one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: Vec<u8>,
}

/// Errors reported by the message bus.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BusError {
    /// The connection could not be established or was lost.
    #[error("Bus connection error: {0}")]
    Connection(String),

    /// A topic or partition could not be subscribed to.
    #[error("Subscription to '{topic}' failed: {message}")]
    Subscription { topic: String, message: String },

    /// A consumer error that does not end the stream.
    #[error("Transient consumer error: {0}")]
    Transient(String),

    /// Releasing the connection failed.
    #[error("Failed to close bus connection: {0}")]
    Close(String),
}

impl BusError {
    /// Create a subscription error.
    pub fn subscription(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Subscription {
            topic: topic.into(),
            message: message.into(),
        }
    }

    /// Whether the error ends consumption of the stream that reported it.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, BusError::Transient(_))
    }
}

/// Ordered stream of messages from a single partition.
pub trait PartitionStream: Send + 'static {
    /// Wait for the next message.
    ///
    /// Returns `None` once the partition stream has ended cleanly.
    fn next_message(
        &mut self,
    ) -> impl Future<Output = Option<Result<BusMessage, BusError>>> + Send;
}

/// A shared connection to the message bus.
///
/// Implementations must be safe to use from several listeners at once.
pub trait MessageBus: Send + Sync + 'static {
    type Stream: PartitionStream;

    /// Enumerate the partitions of a topic.
    fn partitions(&self, topic: &str) -> impl Future<Output = Result<Vec<i32>, BusError>> + Send;

    /// Start consuming one partition of a topic.
    fn consume_partition(&self, topic: &str, partition: i32) -> Result<Self::Stream, BusError>;

    /// Release the connection.
    fn close(self) -> Result<(), BusError>;
}

/// Factory for the shared bus connection.
pub trait BusConnector: Send + Sync {
    type Bus: MessageBus;

    /// Open a new connection.
    fn connect(&self) -> impl Future<Output = Result<Self::Bus, BusError>> + Send;
}
