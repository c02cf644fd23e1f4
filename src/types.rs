//! Error types for Questline
//!
//! The error taxonomy maps directly to client-visible status codes:
//! - `Config` - missing credential or bad deployment config (500)
//! - `InvalidInput` - missing or malformed request field (400)
//! - `NotFound` - challenge absent or not owned by the caller (404)
//! - `Database` / `Completion` / `Parse` - internal failures (500)
//!
//! Internal detail is logged server-side; clients only ever see the terse
//! message carried by the variant.

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, QuestlineError>;

/// All errors surfaced by the challenge engine
#[derive(Error, Debug)]
pub enum QuestlineError {
    /// Deployment configuration problem (e.g. missing completion API key)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Request is missing a required field or carries a malformed value
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Challenge (or profile) absent, or not owned by the requesting user
    #[error("Not found: {0}")]
    NotFound(String),

    /// MongoDB operation failed
    #[error("Database error: {0}")]
    Database(String),

    /// External completion API call failed or returned a non-success status
    #[error("Completion API error: {0}")]
    Completion(String),

    /// External completion response was not the structured data we asked for
    #[error("Parse error: {0}")]
    Parse(String),

    /// HTTP transport error (request body, serialization)
    #[error("HTTP error: {0}")]
    Http(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl QuestlineError {
    /// HTTP status code this error maps to at the API edge
    pub fn status_code(&self) -> u16 {
        match self {
            QuestlineError::InvalidInput(_) => 400,
            QuestlineError::NotFound(_) => 404,
            QuestlineError::Config(_)
            | QuestlineError::Database(_)
            | QuestlineError::Completion(_)
            | QuestlineError::Parse(_)
            | QuestlineError::Http(_)
            | QuestlineError::Io(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_mapping() {
        assert_eq!(QuestlineError::InvalidInput("x".into()).status_code(), 400);
        assert_eq!(QuestlineError::NotFound("x".into()).status_code(), 404);
        assert_eq!(QuestlineError::Config("x".into()).status_code(), 500);
        assert_eq!(QuestlineError::Database("x".into()).status_code(), 500);
        assert_eq!(QuestlineError::Completion("x".into()).status_code(), 500);
    }
}
