//! Gemini-powered intent parser

use super::IntentParser;
use crate::gemini::{strip_code_fence, GeminiClient, GenerationOptions};
use crate::intent::{ActionTag, Entities, StructuredIntent};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

const SYSTEM_PROMPT: &str = r#"You convert CRM requests into JSON. Reply with one JSON object and nothing else:
{"action": "<tag>", "entities": {...}, "confidence": <0..1>}

Action tags:
create_company, get_companies, update_company, delete_company,
create_contact, get_contacts, update_contact, delete_contact,
create_deal, get_deals, update_deal, delete_deal,
create_project, get_projects, update_project, delete_project,
create_time_entry, get_time_entries, update_time_entry, delete_time_entry,
help, unknown

Entity keys (camelCase, include only what the user said):
companyName, companyId, industry, website, email, phone, address, notes,
contactFirstName, contactLastName, contactEmail, contactPhone, contactPosition, contactId,
dealTitle, dealId, dealValue, currency, dealStage (lead|qualified|proposal|negotiation|closed-won|closed-lost),
probability, expectedCloseDate (YYYY-MM-DD),
projectName, projectId, status (planning|active|on-hold|completed|cancelled), startDate, endDate,
totalRevenue, contingencyPercentage, resource, expense, resources, expenses,
timeEntryId, hours, description, date, billable, hourlyRate,
search, open, minValue, maxValue, minProbability, maxProbability, minHours, maxHours,
newName, newTitle, topic.

To turn a deal into a project use create_project with dealTitle.
If the request is not about the CRM use "unknown" with confidence 0."#;

#[derive(Debug, Deserialize)]
struct RawIntent {
    #[serde(default)]
    action: Value,
    #[serde(default)]
    entities: Value,
    #[serde(default)]
    confidence: Option<f32>,
}

pub struct GeminiIntentParser {
    client: GeminiClient,
}

impl GeminiIntentParser {
    pub fn new(client: GeminiClient) -> Self {
        Self { client }
    }

    /// Model output to intent. Unrecognised tags map to `unknown`.
    fn interpret(raw_text: &str, model_confidence: f32, original: &str) -> StructuredIntent {
        let raw: RawIntent = match serde_json::from_str(strip_code_fence(raw_text)) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Model output was not a valid intent");
                return StructuredIntent::unknown(original);
            }
        };

        let action: ActionTag = serde_json::from_value(raw.action).unwrap_or(ActionTag::Unknown);
        if action == ActionTag::Unknown {
            return StructuredIntent::unknown(original);
        }

        StructuredIntent {
            action,
            entities: Entities::from_value(raw.entities),
            confidence: raw.confidence.unwrap_or(model_confidence).clamp(0.0, 1.0),
            original_text: original.to_string(),
        }
    }
}

#[async_trait]
impl IntentParser for GeminiIntentParser {
    async fn parse(&self, text: &str) -> StructuredIntent {
        match self
            .client
            .generate(SYSTEM_PROMPT, text, GenerationOptions::json())
            .await
        {
            Ok((answer, confidence)) => {
                let intent = Self::interpret(&answer, confidence, text);
                info!(action = %intent.action, confidence = intent.confidence, "Intent parsed");
                intent
            }
            Err(e) => {
                warn!(error = %e, "Intent parsing failed, treating message as unknown");
                StructuredIntent::unknown(text)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpret_fenced_json() {
        let raw = "```json\n{\"action\":\"create_company\",\"entities\":{\"companyName\":\"Acme\",\"dealValue\":50000},\"confidence\":0.9}\n```";
        let intent = GeminiIntentParser::interpret(raw, 0.5, "add acme");

        assert_eq!(intent.action, ActionTag::CreateCompany);
        assert_eq!(intent.entities.text("companyName").as_deref(), Some("Acme"));
        assert!((intent.confidence - 0.9).abs() < 1e-6);
        assert_eq!(intent.original_text, "add acme");
    }

    #[test]
    fn test_interpret_unknown_tag_degrades() {
        let intent = GeminiIntentParser::interpret(r#"{"action":"launch_rocket"}"#, 0.9, "go");
        assert_eq!(intent.action, ActionTag::Unknown);
        assert_eq!(intent.confidence, 0.0);
    }

    #[test]
    fn test_interpret_garbage_degrades() {
        let intent = GeminiIntentParser::interpret("I think you want a company", 0.9, "hm");
        assert_eq!(intent.action, ActionTag::Unknown);
        assert_eq!(intent.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_unconfigured_client_yields_unknown() {
        let client = GeminiClient::new("", "http://127.0.0.1:9").unwrap();
        let parser = GeminiIntentParser::new(client);

        let intent = parser.parse("create a company called Acme").await;
        assert_eq!(intent.action, ActionTag::Unknown);
        assert_eq!(intent.confidence, 0.0);
    }
}
