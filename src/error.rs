use serde_json::json;
use std::fmt::Display;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("index not found for {0}")]
    IndexNotFound(String),

    #[error("invalid index: {0}")]
    InvalidIndex(String),

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("invalid region: {0}")]
    InvalidRegion(String),

    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Malformed value in a column the engine has to interpret.
    pub(crate) fn record<V: Display>(column: &str, value: &[u8], reason: V) -> Self {
        Error::InvalidRecord(format!(
            "{} column {:?}: {}",
            column,
            String::from_utf8_lossy(value),
            reason
        ))
    }

    pub(crate) fn missing_column(column: &str, index: usize) -> Self {
        Error::InvalidRecord(format!("missing {} column (field {})", column, index + 1))
    }

    /// Short machine-readable name.
    pub fn error_type(&self) -> &'static str {
        match self {
            Error::IndexNotFound(_) => "IndexNotFound",
            Error::InvalidIndex(_) => "InvalidIndex",
            Error::InvalidHeader(_) => "InvalidHeader",
            Error::InvalidRecord(_) => "InvalidRecord",
            Error::InvalidRegion(_) => "InvalidRegion",
            Error::InvalidMetadata(_) => "InvalidMetadata",
            Error::Io(_) | Error::Internal(_) => "InternalError",
        }
    }

    /// Failure report printed by the binary in `--json` mode.
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "error": self.error_type(),
            "message": self.to_string(),
        })
    }
}
