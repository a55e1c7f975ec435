use thiserror::Error;

use crate::providers::table::TableError;

/// The public failure type returned by every store, render and follow-up operation.
///
/// Each variant maps to one class of failure the caller can act on:
/// missing data, a rejected write, or an external collaborator that failed.
#[derive(Error, Debug)]
pub enum FormError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// A dedup rule rejected the write. `message` is already localized.
    #[error("Duplicate submission rejected by rule '{rule_id}': {message}")]
    Conflict { rule_id: String, message: String },

    #[error("External resource failure: {0}")]
    ExternalResource(String),

    #[error("Table access failed: {0}")]
    Table(#[from] TableError),

    #[error("Invalid page token: {0}")]
    InvalidPageToken(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl FormError {
    /// True when the failure comes from a render/send/table collaborator rather
    /// than from the caller's input.
    pub fn is_external(&self) -> bool {
        matches!(self, FormError::ExternalResource(_) | FormError::Table(_))
    }
}
