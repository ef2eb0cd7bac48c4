//! Error taxonomy of the engine.

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by the analyzers, the merge engine and the store adapters.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// Caller input rejected before any I/O took place.
    #[error("validation error: {0}")]
    Validation(String),

    /// The backend refused the call because credentials are missing or expired.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// Network or API failure while reading or writing.
    #[error("backend error: {message}")]
    Backend {
        /// HTTP-like status reported by the backend, when known.
        status: Option<u16>,
        /// Description of the failure.
        message: String,
    },

    /// A sheet's header row does not match the versioned schema.
    #[error("sheet '{sheet}' does not match schema: expected [{expected}], found [{found}]")]
    SchemaMismatch {
        sheet: String,
        expected: String,
        found: String,
    },
}

impl EngineError {
    pub fn backend(message: impl Into<String>) -> Self {
        EngineError::Backend {
            status: None,
            message: message.into(),
        }
    }

    /// Classify a backend failure by status code.
    ///
    /// 401 becomes [`EngineError::NotAuthorized`]; 403, 404 and 429 carry a
    /// user-facing explanation ahead of the backend's own detail.
    pub fn from_status(status: u16, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        let message = match status {
            401 => return EngineError::NotAuthorized(detail),
            403 => format!(
                "access denied (403): make sure you can edit this spreadsheet. {}",
                detail
            ),
            404 => format!(
                "spreadsheet or sheet not found (404): check the store id and sheet names. {}",
                detail
            ),
            429 => format!("request quota exceeded (429): try again later. {}", detail),
            _ => detail,
        };
        EngineError::Backend {
            status: Some(status),
            message: message.trim_end().to_string(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, EngineError::Validation(_))
    }
}
