//! Structured intents as produced by the language-model collaborator
//!
//! The entity bag is untrusted: values may be missing, mistyped or
//! stringly-typed. [`Entities`] offers tolerant typed accessors; the
//! per-action commands in [`crate::handlers`] are built from it.

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

use crate::error::EngineError;
use crate::Result;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionTag {
    CreateCompany,
    #[serde(rename = "get_companies", alias = "get_company")]
    GetCompanies,
    UpdateCompany,
    DeleteCompany,

    CreateContact,
    #[serde(rename = "get_contacts", alias = "get_contact")]
    GetContacts,
    UpdateContact,
    DeleteContact,

    CreateDeal,
    #[serde(rename = "get_deals", alias = "get_deal")]
    GetDeals,
    UpdateDeal,
    DeleteDeal,

    CreateProject,
    #[serde(rename = "get_projects", alias = "get_project")]
    GetProjects,
    UpdateProject,
    DeleteProject,

    CreateTimeEntry,
    #[serde(rename = "get_time_entries", alias = "get_time_entry")]
    GetTimeEntries,
    UpdateTimeEntry,
    DeleteTimeEntry,

    Help,
    #[serde(other)]
    Unknown,
}

impl ActionTag {
    pub const ALL: [ActionTag; 22] = [
        ActionTag::CreateCompany,
        ActionTag::GetCompanies,
        ActionTag::UpdateCompany,
        ActionTag::DeleteCompany,
        ActionTag::CreateContact,
        ActionTag::GetContacts,
        ActionTag::UpdateContact,
        ActionTag::DeleteContact,
        ActionTag::CreateDeal,
        ActionTag::GetDeals,
        ActionTag::UpdateDeal,
        ActionTag::DeleteDeal,
        ActionTag::CreateProject,
        ActionTag::GetProjects,
        ActionTag::UpdateProject,
        ActionTag::DeleteProject,
        ActionTag::CreateTimeEntry,
        ActionTag::GetTimeEntries,
        ActionTag::UpdateTimeEntry,
        ActionTag::DeleteTimeEntry,
        ActionTag::Help,
        ActionTag::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionTag::CreateCompany => "create_company",
            ActionTag::GetCompanies => "get_companies",
            ActionTag::UpdateCompany => "update_company",
            ActionTag::DeleteCompany => "delete_company",
            ActionTag::CreateContact => "create_contact",
            ActionTag::GetContacts => "get_contacts",
            ActionTag::UpdateContact => "update_contact",
            ActionTag::DeleteContact => "delete_contact",
            ActionTag::CreateDeal => "create_deal",
            ActionTag::GetDeals => "get_deals",
            ActionTag::UpdateDeal => "update_deal",
            ActionTag::DeleteDeal => "delete_deal",
            ActionTag::CreateProject => "create_project",
            ActionTag::GetProjects => "get_projects",
            ActionTag::UpdateProject => "update_project",
            ActionTag::DeleteProject => "delete_project",
            ActionTag::CreateTimeEntry => "create_time_entry",
            ActionTag::GetTimeEntries => "get_time_entries",
            ActionTag::UpdateTimeEntry => "update_time_entry",
            ActionTag::DeleteTimeEntry => "delete_time_entry",
            ActionTag::Help => "help",
            ActionTag::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ActionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

//
// ================= Intent =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredIntent {
    pub action: ActionTag,
    #[serde(default)]
    pub entities: Entities,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default)]
    pub original_text: String,
}

impl StructuredIntent {
    pub fn new(action: ActionTag, entities: Value, original_text: impl Into<String>) -> Self {
        Self {
            action,
            entities: Entities::from_value(entities),
            confidence: 1.0,
            original_text: original_text.into(),
        }
    }

    /// Decode an untrusted intent without rejecting it. A missing or
    /// unrecognised `action` becomes `unknown`; a non-object `entities`
    /// becomes an empty bag.
    pub fn from_value(value: Value) -> Self {
        let Value::Object(mut map) = value else {
            return Self::unknown("");
        };

        let original_text = match map.remove("originalText") {
            Some(Value::String(text)) => text,
            _ => String::new(),
        };
        let action = map
            .remove("action")
            .and_then(|v| serde_json::from_value::<ActionTag>(v).ok())
            .unwrap_or(ActionTag::Unknown);
        if action == ActionTag::Unknown {
            return Self::unknown(original_text);
        }

        Self {
            action,
            entities: Entities::from_value(map.remove("entities").unwrap_or_default()),
            confidence: map
                .remove("confidence")
                .and_then(|v| v.as_f64())
                .map_or(0.0, |c| (c as f32).clamp(0.0, 1.0)),
            original_text,
        }
    }

    /// What the language-model collaborator returns when it fails.
    pub fn unknown(original_text: impl Into<String>) -> Self {
        Self {
            action: ActionTag::Unknown,
            entities: Entities::default(),
            confidence: 0.0,
            original_text: original_text.into(),
        }
    }
}

//
// ================= Entities =================
//

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Entities(Map<String, Value>);

impl Entities {
    /// Anything but a JSON object yields an empty bag.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has(&self, key: &str) -> bool {
        self.0.get(key).is_some_and(|v| !v.is_null())
    }

    /// Non-blank string value, trimmed. Numbers and booleans are stringified.
    pub fn text(&self, key: &str) -> Option<String> {
        let raw = match self.0.get(key)? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => return None,
        };
        (!raw.is_empty()).then_some(raw)
    }

    /// First non-blank string among `keys`.
    pub fn first_text(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|key| self.text(key))
    }

    /// Finite numeric value. Accepts strings such as `"$50,000"` or `"50k"`.
    pub fn number(&self, key: &str) -> Result<Option<f64>> {
        let invalid = |got: String| EngineError::validation(format!("'{}' must be a number, got {}", key, got));
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_f64()
                .filter(|v| v.is_finite())
                .map(Some)
                .ok_or_else(|| invalid(n.to_string())),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => parse_amount(s)
                .map(Some)
                .ok_or_else(|| invalid(format!("'{}'", s))),
            Some(other) => Err(invalid(other.to_string())),
        }
    }

    pub fn first_number(&self, keys: &[&str]) -> Result<Option<f64>> {
        for key in keys {
            if let Some(n) = self.number(key)? {
                return Ok(Some(n));
            }
        }
        Ok(None)
    }

    pub fn flag(&self, key: &str) -> Option<bool> {
        match self.0.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "y" | "1" => Some(true),
                "false" | "no" | "n" | "0" => Some(false),
                _ => None,
            },
            Value::Number(n) => n.as_i64().map(|n| n != 0),
            _ => None,
        }
    }

    pub fn id(&self, key: &str) -> Result<Option<Uuid>> {
        match self.text(key) {
            Some(raw) => Uuid::parse_str(&raw)
                .map(Some)
                .map_err(|_| EngineError::validation(format!("'{}' is not a valid id: {}", key, raw))),
            None => Ok(None),
        }
    }

    pub fn date(&self, key: &str) -> Result<Option<NaiveDate>> {
        match self.text(key) {
            Some(raw) => {
                // Accept full timestamps by keeping only the date part.
                let day = raw.get(..10).unwrap_or(&raw);
                NaiveDate::parse_from_str(day, "%Y-%m-%d").map(Some).map_err(|_| {
                    EngineError::validation(format!("'{}' must be a date (YYYY-MM-DD), got '{}'", key, raw))
                })
            }
            None => Ok(None),
        }
    }

    /// List of strings; a comma-separated string is split.
    pub fn list(&self, key: &str) -> Vec<String> {
        match self.0.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Some(Value::String(s)) => s
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Deserialize a nested value such as a resource list.
    pub fn nested<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| EngineError::validation(format!("'{}' is malformed: {}", key, e))),
        }
    }
}

fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | '€' | '£' | ' '))
        .collect();
    let lowered = cleaned.to_lowercase();

    let (digits, multiplier) = if let Some(stripped) = lowered.strip_suffix('k') {
        (stripped, 1_000.0)
    } else if let Some(stripped) = lowered.strip_suffix('m') {
        (stripped, 1_000_000.0)
    } else {
        (lowered.as_str(), 1.0)
    };

    // `f64::from_str` also takes "NaN" and "inf", and large exponents overflow.
    digits
        .parse::<f64>()
        .ok()
        .map(|n| n * multiplier)
        .filter(|n| n.is_finite())
}
