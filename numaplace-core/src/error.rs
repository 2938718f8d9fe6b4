use thiserror::Error;

#[derive(Error, Debug)]
pub enum NumaError {
    #[error("Invalid topology: {message}")]
    InvalidTopology { message: String },

    #[error("Invalid NUMA node: {node} (host has {available} nodes)")]
    InvalidNode { node: usize, available: usize },

    #[error("Invalid CPU ID: {cpu} (host has {available} CPUs)")]
    InvalidCpu { cpu: usize, available: usize },

    #[error("Invalid input for {field}: {message}")]
    InvalidInput { field: String, message: String },

    #[error("Insufficient memory: requested {requested} bytes, available {available} bytes")]
    InsufficientMemory { requested: u64, available: u64 },

    #[error("Invariant violated in {operation}: {message}")]
    InvariantViolation { operation: String, message: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type NumaResult<T> = std::result::Result<T, NumaError>;

impl NumaError {
    pub(crate) fn invalid_input(field: impl Into<String>, message: impl Into<String>) -> Self {
        NumaError::InvalidInput {
            field: field.into(),
            message: message.into(),
        }
    }

    pub(crate) fn invariant(operation: impl Into<String>, message: impl Into<String>) -> Self {
        NumaError::InvariantViolation {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Whether this error signals a caller bug rather than an I/O or parse failure
    pub fn is_configuration_error(&self) -> bool {
        !matches!(
            self,
            NumaError::Io(_) | NumaError::TomlParse(_) | NumaError::Json(_)
        )
    }
}
