//! Error types for the intent execution engine

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {

    // =============================
    // Handler Errors
    // =============================

    /// A required entity field is missing or malformed. Reported before any
    /// store call is made.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Secondary effect failed: {0}")]
    SecondaryEffect(String),

    // =============================
    // Collaborator Errors
    // =============================

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("UUID parse error: {0}")]
    Uuid(#[from] uuid::Error),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Short guidance shown to the end user in front of the raw error.
    pub fn guidance(&self) -> &'static str {
        match self {
            Self::Validation(_) => "Some required details are missing.",
            Self::NotFound(_) => "I couldn't find the record you referred to.",
            Self::Store(_) => "Saving your changes failed.",
            Self::SecondaryEffect(_) => "Part of the request could not be completed.",
            _ => "Sorry, something went wrong while processing your request.",
        }
    }
}
