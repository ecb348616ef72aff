//! Error types for record-sift-core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
    /// Malformed filter: unknown operator or a value of the wrong shape.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The key-value collaborator failed to read or write history.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// A record could not be viewed as a JSON value.
    #[error("Record error: {0}")]
    Record(#[from] serde_json::Error),
}

impl SearchError {
    pub fn configuration(message: impl Into<String>) -> Self {
        SearchError::Configuration(message.into())
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, SearchError::Configuration(_))
    }
}

pub type Result<T> = std::result::Result<T, SearchError>;
