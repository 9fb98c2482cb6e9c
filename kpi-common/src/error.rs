use thiserror::Error;

/// Common error type for KPI exporter components.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Reasons a raw KPI payload could not be turned into a record.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Malformed {kind} payload: {source}")]
    Malformed {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("{kind} payload is not a JSON object")]
    NotAnObject { kind: &'static str },

    #[error("{kind} payload is missing required field '{field}'")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },
}
