//! Prometheus exporter for VOLTHA and ONOS KPI telemetry.
//!
//! This crate consumes the KPI topics published on Kafka by VOLTHA, ONOS and
//! the ONOS AAA application, decodes every event and exposes the latest values
//! as Prometheus gauges on an HTTP endpoint.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │  Kafka topics   │────>│ TopicListener×N │────>│   KpiExporter   │
//! │ (*.kpis)        │     │ (decode)        │     │ (set gauges)    │
//! └─────────────────┘     └─────────────────┘     └────────┬────────┘
//!                                                          │
//!                         ┌─────────────────┐     ┌────────v────────┐
//!                         │   HTTP Server   │<────│ MetricRegistry  │
//!                         │   (/metrics)    │     │                 │
//!                         └─────────────────┘     └─────────────────┘
//! ```
//!
//! The [`Coordinator`] owns the shared bus connection and runs one
//! [`TopicListener`] per topic until every listener has stopped.
//!
//! # Usage
//!
//! ```bash
//! kpi-exporter --config config.json5
//! kpi-exporter --broker kafka:9092 --listen 0.0.0.0:8080
//! ```
//!
//! # Configuration
//!
//! See [`config::ExporterConfig`] for configuration options.

pub mod bus;
pub mod config;
pub mod coordinator;
pub mod exporter;
pub mod http;
pub mod listener;
pub mod registry;
pub mod status;

pub use bus::{BusConnector, BusError, KafkaConnector, MemoryBroker, MessageBus};
pub use config::ExporterConfig;
pub use coordinator::{Coordinator, CoordinatorError, CoordinatorReport};
pub use exporter::{KpiExporter, SharedExporter};
pub use http::{HttpServer, create_router};
pub use listener::{ListenerMetrics, ListenerOutcome, TopicListener};
pub use registry::{MetricRegistry, RegistryError, SharedRegistry};
pub use status::{ListenerState, ListenerStatus};
