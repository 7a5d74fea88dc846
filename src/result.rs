//! Uniform execution result handed to reply synthesis

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineError;

pub const GENERIC_APOLOGY: &str =
    "Sorry, I ran into a problem while processing your request. Please try again.";

pub const NOT_UNDERSTOOD: &str = "I don't understand that request. \
Try something like \"create a company called Acme\" or ask for help.";

/// Invariant: `success == false` implies `error` is set, and
/// `success == true` implies `data` or `message` is set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ExecutionResult {
    pub fn ok(data: Value, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            message: Some(message.into()),
        }
    }

    pub fn message_only(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            error: None,
            message: Some(message.into()),
        }
    }

    pub fn failure(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            message: Some(message.into()),
        }
    }

    pub fn not_understood() -> Self {
        Self::failure("unrecognized action", NOT_UNDERSTOOD)
    }

    /// Validation and lookup failures keep their guidance; everything else
    /// gets the generic apology in front.
    pub fn from_error(err: &EngineError) -> Self {
        let message = match err {
            EngineError::Validation(detail) | EngineError::NotFound(detail) => {
                format!("{} {}", err.guidance(), detail)
            }
            _ => format!("{} ({})", GENERIC_APOLOGY, err.guidance()),
        };
        Self::failure(err.to_string(), message)
    }

    pub fn is_well_formed(&self) -> bool {
        if self.success {
            self.data.is_some() || self.message.is_some()
        } else {
            self.error.is_some()
        }
    }
}
