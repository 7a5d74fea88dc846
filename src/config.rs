//! Runtime configuration from the environment
//!
//! `.env` is loaded first when present; real environment variables win.

use crate::audit::DEFAULT_AUDIT_RETENTION;
use crate::error::EngineError;
use crate::handlers::HandlerSettings;
use crate::models::DEFAULT_CURRENCY;
use crate::Result;
use std::env;
use tracing::warn;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_CONTINGENCY_PERCENTAGE: f64 = 10.0;
pub const DEFAULT_GEMINI_MODEL_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent";

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Empty when unset; the Gemini collaborators then degrade to fallbacks.
    pub gemini_api_key: String,
    pub gemini_model_url: String,
    pub port: u16,
    pub default_currency: String,
    pub default_contingency_percentage: f64,
    /// Audit records kept in memory before the oldest are evicted.
    pub audit_max_records: usize,
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: String::new(),
            gemini_model_url: DEFAULT_GEMINI_MODEL_URL.to_string(),
            port: DEFAULT_PORT,
            default_currency: DEFAULT_CURRENCY.to_string(),
            default_contingency_percentage: DEFAULT_CONTINGENCY_PERCENTAGE,
            audit_max_records: DEFAULT_AUDIT_RETENTION,
            log_level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let gemini_api_key = get("GEMINI_API_KEY").unwrap_or_default();
        if gemini_api_key.is_empty() {
            warn!("GEMINI_API_KEY not set, language-model features will use fallbacks");
        }

        let port = match get("PORT").or_else(|| get("API_PORT")) {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| EngineError::Config(format!("PORT must be a port number, got '{}'", raw)))?,
            None => defaults.port,
        };

        let default_contingency_percentage = match get("DEFAULT_CONTINGENCY_PERCENTAGE") {
            Some(raw) => {
                let value = raw.parse::<f64>().map_err(|_| {
                    EngineError::Config(format!(
                        "DEFAULT_CONTINGENCY_PERCENTAGE must be a number, got '{}'",
                        raw
                    ))
                })?;
                if !(0.0..=100.0).contains(&value) {
                    return Err(EngineError::Config(format!(
                        "DEFAULT_CONTINGENCY_PERCENTAGE must be between 0 and 100, got {}",
                        value
                    )));
                }
                value
            }
            None => defaults.default_contingency_percentage,
        };

        let audit_max_records = match get("AUDIT_MAX_RECORDS") {
            Some(raw) => match raw.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(EngineError::Config(format!(
                        "AUDIT_MAX_RECORDS must be a positive integer, got '{}'",
                        raw
                    )))
                }
            },
            None => defaults.audit_max_records,
        };

        Ok(Self {
            gemini_api_key,
            gemini_model_url: get("GEMINI_MODEL_URL").unwrap_or(defaults.gemini_model_url),
            port,
            default_currency: get("DEFAULT_CURRENCY")
                .map(|c| c.to_uppercase())
                .unwrap_or(defaults.default_currency),
            default_contingency_percentage,
            audit_max_records,
            log_level: get("RUST_LOG").unwrap_or(defaults.log_level),
        })
    }

    pub fn handler_settings(&self) -> HandlerSettings {
        HandlerSettings {
            default_currency: self.default_currency.clone(),
            default_contingency_percentage: self.default_contingency_percentage,
        }
    }

    pub fn has_gemini(&self) -> bool {
        !self.gemini_api_key.is_empty()
    }
}
