use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExporterError {
    /// Missing or invalid inverter address / option. Fatal at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed metric schema or a metric name the registry rejected. Fatal at startup.
    #[error("Schema error: {0}")]
    Schema(String),

    /// Probe or fetch failure (timeout, refused connection, bad status).
    #[error("Transport error: {0}")]
    Transport(String),

    /// Response body was not the expected `{"data": {...}}` JSON.
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("HTTP server error: {0}")]
    Server(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExporterError {
    /// Whether this error must terminate the process.
    ///
    /// Only startup errors are fatal; everything raised during a collection
    /// cycle feeds the backoff instead.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ExporterError::Config(_) | ExporterError::Schema(_) | ExporterError::Server(_)
        )
    }
}

/// A field that could not be published. Logged, never propagated.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FieldMappingWarning {
    #[error("field '{field}' is not declared for endpoint '{endpoint}'")]
    UnknownField { endpoint: String, field: String },

    #[error("field '{field}' has unconvertible value {value}")]
    Unconvertible { field: String, value: String },
}

pub type Result<T> = std::result::Result<T, ExporterError>;
