//! Configuration for the KPI exporter.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use kpi_common::{KafkaConfig, LoggingConfig, TopicsConfig};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] kpi_common::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete exporter configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Kafka connection settings.
    #[serde(default)]
    pub kafka: KafkaConfig,

    /// Topic consumed for each KPI source.
    #[serde(default)]
    pub topics: TopicsConfig,

    /// Prometheus HTTP endpoint settings.
    #[serde(default)]
    pub prometheus: PrometheusConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Prometheus HTTP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path for metrics endpoint (default: "/metrics").
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_path() -> String {
    "/metrics".to_string()
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
        }
    }
}

impl PrometheusConfig {
    /// Parsed listen address.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen.parse().map_err(|_| {
            ConfigError::Validation(format!("Invalid listen address: {}", self.listen))
        })
    }
}

impl ExporterConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: ExporterConfig = kpi_common::load_config(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ExporterConfig = kpi_common::parse_config(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.kafka.broker.trim().is_empty() {
            return Err(ConfigError::Validation(
                "kafka.broker must not be empty".to_string(),
            ));
        }

        if self.kafka.metadata_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "kafka.metadata_timeout_ms must be > 0".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for (topic, kind) in self.topics.bindings() {
            if topic.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "Topic for {kind} must not be empty"
                )));
            }
            if !seen.insert(topic.clone()) {
                return Err(ConfigError::Validation(format!(
                    "Topic '{topic}' is configured more than once"
                )));
            }
        }

        self.prometheus.listen_addr()?;

        if !self.prometheus.path.starts_with('/') {
            return Err(ConfigError::Validation(
                "Metrics path must start with /".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kpi_common::LogFormat;
    use std::io::Write;

    #[test]
    fn test_parse_minimal_config() {
        let config = ExporterConfig::parse("{}").unwrap();

        assert_eq!(
            config.kafka.broker,
            "voltha-kafka.default.svc.cluster.local:9092"
        );
        assert_eq!(config.topics.voltha, "voltha.kpis");
        assert_eq!(config.topics.onos, "onos.kpis");
        assert_eq!(config.topics.onos_aaa, "onos.aaa.stats.kpis");
        assert_eq!(config.prometheus.listen, "0.0.0.0:8080");
        assert_eq!(config.prometheus.path, "/metrics");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            kafka: {
                broker: "kafka:9092",
                group_id: "exporter-a",
                metadata_timeout_ms: 1000,
            },
            topics: {
                voltha: "v.kpis",
                onos: "o.kpis",
                onos_aaa: "aaa.kpis",
            },
            prometheus: {
                listen: "127.0.0.1:9091",
                path: "/prometheus/metrics",
            },
            logging: {
                level: "debug",
                format: "json",
            },
        }"#;

        let config = ExporterConfig::parse(json).unwrap();

        assert_eq!(config.kafka.broker, "kafka:9092");
        assert_eq!(config.kafka.group_id, "exporter-a");
        assert_eq!(config.kafka.client_id, "kpi-exporter");
        assert_eq!(config.kafka.metadata_timeout_ms, 1000);
        assert_eq!(config.topics.onos_aaa, "aaa.kpis");
        assert_eq!(config.prometheus.path, "/prometheus/metrics");
        assert_eq!(
            config.prometheus.listen_addr().unwrap(),
            "127.0.0.1:9091".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_validate_empty_broker() {
        let result = ExporterConfig::parse(r#"{ kafka: { broker: "" } }"#);
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_validate_zero_metadata_timeout() {
        let result = ExporterConfig::parse("{ kafka: { metadata_timeout_ms: 0 } }");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_empty_topic() {
        let result = ExporterConfig::parse(r#"{ topics: { onos: "" } }"#);
        assert!(result.unwrap_err().to_string().contains("onos"));
    }

    #[test]
    fn test_validate_duplicate_topic() {
        let result = ExporterConfig::parse(r#"{ topics: { onos: "voltha.kpis" } }"#);
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("configured more than once")
        );
    }

    #[test]
    fn test_validate_invalid_listen() {
        let json = r#"{
            prometheus: { listen: "not-an-address" }
        }"#;

        let result = ExporterConfig::parse(json);
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Invalid listen address")
        );
    }

    #[test]
    fn test_validate_invalid_path() {
        let json = r#"{
            prometheus: { path: "no-leading-slash" }
        }"#;

        let result = ExporterConfig::parse(json);
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("must start with /")
        );
    }

    #[test]
    fn test_parse_error() {
        let result = ExporterConfig::parse("{ kafka: ");
        assert!(matches!(
            result,
            Err(ConfigError::Load(kpi_common::Error::Parse(_)))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{ kafka: {{ broker: "file-broker:9092" }} }}"#).unwrap();

        let config = ExporterConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.kafka.broker, "file-broker:9092");
    }

    #[test]
    fn test_load_from_file_validates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{ prometheus: {{ path: "metrics" }} }}"#).unwrap();

        let result = ExporterConfig::load_from_file(file.path());
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let result = ExporterConfig::load_from_file("/nonexistent/kpi-exporter.json5");
        assert!(matches!(
            result,
            Err(ConfigError::Load(kpi_common::Error::Io(_)))
        ));
    }
}
