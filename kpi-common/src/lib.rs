//! KPI Exporter Common Library
//!
//! Shared types and utilities for the KPI exporter:
//!
//! - [`kpi`] - KPI record types for each source system (`VolthaKpi`, `OnosKpi`, `OnosAaaKpi`)
//! - [`decode`] - Payload decoding, selected by [`KpiKind`]
//! - [`config`] - Kafka, topic and logging configuration (JSON5 format)
//! - [`error`] - Error types

pub mod config;
pub mod decode;
pub mod error;
pub mod kpi;

// Re-export commonly used types at the crate root
pub use config::{KafkaConfig, LogFormat, LoggingConfig, TopicsConfig, load_config, parse_config};
pub use decode::{decode_onos, decode_onos_aaa, decode_voltha};
pub use error::{DecodeError, Error, Result};
pub use kpi::{
    Kpi, KpiKind, OnosAaaKpi, OnosKpi, OnosPort, SliceData, SliceMetadata, VolthaKpi,
    VolthaMetrics,
};

/// Initialize tracing with the given configuration.
///
/// `RUST_LOG` takes precedence over the configured level when set.
///
/// # Example
///
/// ```ignore
/// use kpi_common::{LoggingConfig, LogFormat, init_tracing};
///
/// let config = LoggingConfig {
///     level: "info".to_string(),
///     format: LogFormat::Json,
/// };
/// init_tracing(&config)?;
/// ```
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
