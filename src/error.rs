//! Error kinds for the query/gateway layer.
//!
//! The orchestrator and CLI use `anyhow::Result` end to end. `WickedError`
//! exists at the query-engine/gateway boundary so the HTTP surface can map
//! failures to stable `{code, message}` envelopes without downcasting
//! opaque `anyhow::Error`s.

use thiserror::Error;

/// Stable error kinds surfaced by the query engine and gateway.
#[derive(Debug, Error)]
pub enum WickedError {
    /// Malformed path, invalid project name, unknown verb, out-of-range
    /// depth. Never retried.
    #[error("invalid input: {0}")]
    InputError(String),

    /// Symbol id or project missing. `suggestions` is populated from the
    /// fuzzy search tier when the caller supplied a name instead of an id.
    #[error("not found: {message}")]
    NotFound {
        message: String,
        suggestions: Vec<String>,
    },

    /// SQLite constraint, I/O, or schema mismatch.
    #[error("storage error: {0}")]
    StorageError(String),

    /// Schema version mismatch; caller must request a rebuild.
    #[error("schema mismatch: index is at {found}, expected {expected}")]
    SchemaMismatch { found: String, expected: String },
}

impl WickedError {
    pub fn code(&self) -> &'static str {
        match self {
            WickedError::InputError(_) => "bad_input",
            WickedError::NotFound { .. } => "not_found",
            WickedError::StorageError(_) => "storage_error",
            WickedError::SchemaMismatch { .. } => "schema_mismatch",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            WickedError::InputError(_) => 400,
            WickedError::NotFound { .. } => 404,
            WickedError::SchemaMismatch { .. } => 409,
            WickedError::StorageError(_) => 500,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        WickedError::NotFound {
            message: message.into(),
            suggestions: Vec::new(),
        }
    }

    pub fn not_found_with_suggestions(message: impl Into<String>, suggestions: Vec<String>) -> Self {
        WickedError::NotFound {
            message: message.into(),
            suggestions,
        }
    }
}

impl From<rusqlite::Error> for WickedError {
    fn from(err: rusqlite::Error) -> Self {
        WickedError::StorageError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_maps_input_error_to_400() {
        assert_eq!(WickedError::InputError("x".into()).http_status(), 400);
        assert_eq!(WickedError::not_found("x").http_status(), 404);
        assert_eq!(
            WickedError::SchemaMismatch {
                found: "1".into(),
                expected: "2".into()
            }
            .http_status(),
            409
        );
    }
}
