use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;
use crate::kpi::KpiKind;

/// Kafka connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KafkaConfig {
    /// Bootstrap broker address ("host:port").
    #[serde(default = "default_broker")]
    pub broker: String,

    /// Consumer group id reported to the broker. Offsets are never committed.
    #[serde(default = "default_group_id")]
    pub group_id: String,

    /// Client id reported to the broker.
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Timeout for metadata requests (connect check, partition lookup).
    #[serde(default = "default_metadata_timeout")]
    pub metadata_timeout_ms: u64,
}

fn default_broker() -> String {
    "voltha-kafka.default.svc.cluster.local:9092".to_string()
}

fn default_group_id() -> String {
    "kpi-exporter".to_string()
}

fn default_client_id() -> String {
    "kpi-exporter".to_string()
}

fn default_metadata_timeout() -> u64 {
    5000
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            broker: default_broker(),
            group_id: default_group_id(),
            client_id: default_client_id(),
            metadata_timeout_ms: default_metadata_timeout(),
        }
    }
}

/// Topic name for each KPI source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicsConfig {
    #[serde(default = "default_voltha_topic")]
    pub voltha: String,

    #[serde(default = "default_onos_topic")]
    pub onos: String,

    #[serde(default = "default_onos_aaa_topic")]
    pub onos_aaa: String,
}

fn default_voltha_topic() -> String {
    "voltha.kpis".to_string()
}

fn default_onos_topic() -> String {
    "onos.kpis".to_string()
}

fn default_onos_aaa_topic() -> String {
    "onos.aaa.stats.kpis".to_string()
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            voltha: default_voltha_topic(),
            onos: default_onos_topic(),
            onos_aaa: default_onos_aaa_topic(),
        }
    }
}

impl TopicsConfig {
    /// Topic bindings in a fixed order.
    pub fn bindings(&self) -> Vec<(String, KpiKind)> {
        vec![
            (self.voltha.clone(), KpiKind::Voltha),
            (self.onos.clone(), KpiKind::Onos),
            (self.onos_aaa.clone(), KpiKind::OnosAaa),
        ]
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// Structured JSON format.
    Json,
}

/// Common logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Load a configuration file in JSON5 format.
pub fn load_config<T: for<'de> Deserialize<'de>>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    tracing::debug!(path = %path.display(), "Loading configuration");

    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Load a configuration from a JSON5 string.
pub fn parse_config<T: for<'de> Deserialize<'de>>(content: &str) -> Result<T> {
    Ok(json5::from_str(content)?)
}
