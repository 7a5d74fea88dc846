//! Intent dispatcher - the engine's single entry point
//!
//! INTENT → PARSE COMMAND → HANDLE → RESULT → AUDIT
//!
//! `execute` never fails. Handler and store errors are folded into the
//! returned [`ExecutionResult`], and every call leaves one audit record.

use crate::audit::{compute_intent_fingerprint, AuditLog, ExecutionRecord};
use crate::handlers::{ActionHandlers, Command, HandlerSettings};
use crate::intent::{ActionTag, StructuredIntent};
use crate::result::ExecutionResult;
use crate::store::RecordStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct IntentDispatcher {
    handlers: ActionHandlers,
    audit_log: AuditLog,
}

impl IntentDispatcher {
    pub fn new(store: Arc<dyn RecordStore>, settings: HandlerSettings) -> Self {
        Self {
            handlers: ActionHandlers::new(store, settings),
            audit_log: AuditLog::new(),
        }
    }

    /// Cap the audit trail at `max_records`, oldest evicted first.
    pub fn with_audit_retention(mut self, max_records: usize) -> Self {
        self.audit_log = AuditLog::with_retention(max_records);
        self
    }

    pub fn handlers(&self) -> &ActionHandlers {
        &self.handlers
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit_log
    }

    pub async fn execute(&self, intent: &StructuredIntent) -> ExecutionResult {
        let start_time = Instant::now();
        info!(
            action = %intent.action,
            confidence = intent.confidence,
            "Executing intent"
        );

        let result = self.run(intent).await;

        let elapsed_ms = start_time.elapsed().as_millis() as u64;
        if result.success {
            info!(action = %intent.action, elapsed_ms, "Intent succeeded");
        } else {
            warn!(
                action = %intent.action,
                error = result.error.as_deref().unwrap_or_default(),
                elapsed_ms,
                "Intent failed"
            );
        }

        let record = ExecutionRecord {
            audit_id: Uuid::new_v4(),
            action: intent.action,
            intent_fingerprint: compute_intent_fingerprint(intent),
            success: result.success,
            error: result.error.clone(),
            elapsed_ms,
            created_at: Utc::now(),
        };
        if let Err(e) = self.audit_log.record(record).await {
            warn!(error = %e, "Failed to write audit record");
        }

        result
    }

    async fn run(&self, intent: &StructuredIntent) -> ExecutionResult {
        if intent.action == ActionTag::Unknown {
            return ExecutionResult::not_understood();
        }

        let command = match Command::parse(intent.action, &intent.entities) {
            Ok(command) => command,
            Err(e) => {
                debug!(action = %intent.action, error = %e, "Intent rejected before dispatch");
                return ExecutionResult::from_error(&e);
            }
        };

        match self.handlers.handle(command).await {
            Ok(result) => result,
            Err(e) => ExecutionResult::from_error(&e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::ScriptedStore;
    use serde_json::json;

    fn dispatcher(store: &Arc<ScriptedStore>) -> IntentDispatcher {
        IntentDispatcher::new(store.clone(), HandlerSettings::default())
    }

    #[tokio::test]
    async fn test_every_tag_yields_well_formed_result() {
        let store = ScriptedStore::new();
        let d = dispatcher(&store);

        for tag in ActionTag::ALL {
            for entities in [json!({}), json!({ "companyName": "Acme", "hours": 2 })] {
                let result = d.execute(&StructuredIntent::new(tag, entities, "probe")).await;
                assert!(result.is_well_formed(), "{} produced {:?}", tag, result);
            }
        }
    }

    #[tokio::test]
    async fn test_unknown_and_help_never_touch_store() {
        let store = ScriptedStore::new();
        let d = dispatcher(&store);

        let unknown = d.execute(&StructuredIntent::unknown("sing me a song")).await;
        assert!(!unknown.success);
        assert_eq!(unknown.message.as_deref(), Some(crate::result::NOT_UNDERSTOOD));

        let help = d
            .execute(&StructuredIntent::new(ActionTag::Help, json!({ "topic": "deals" }), "help"))
            .await;
        assert!(help.success);

        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_validation_failure_carries_guidance() {
        let store = ScriptedStore::new();
        let d = dispatcher(&store);

        let result = d
            .execute(&StructuredIntent::new(
                ActionTag::CreateContact,
                json!({ "contactFirstName": "Ada" }),
                "add Ada",
            ))
            .await;

        assert!(!result.success);
        assert!(result.error.is_some());
        assert!(result.message.unwrap().contains("first and last name"));
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_becomes_apology() {
        let store = ScriptedStore::new();
        store.companies.fail_creates();
        let d = dispatcher(&store);

        let result = d
            .execute(&StructuredIntent::new(
                ActionTag::CreateCompany,
                json!({ "companyName": "Acme" }),
                "add acme",
            ))
            .await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("company create rejected"));
        assert!(result.message.unwrap().starts_with(crate::result::GENERIC_APOLOGY));
    }

    #[tokio::test]
    async fn test_every_execution_is_audited() {
        let store = ScriptedStore::new();
        let d = dispatcher(&store);
        let intent = StructuredIntent::new(ActionTag::GetCompanies, json!({}), "list companies");

        d.execute(&intent).await;
        d.execute(&StructuredIntent::unknown("??")).await;

        let records = d.audit_log().list().await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().any(|r| r.action == ActionTag::GetCompanies && r.success));
        assert!(records.iter().any(|r| r.action == ActionTag::Unknown && !r.success));

        let listed = records
            .iter()
            .find(|r| r.action == ActionTag::GetCompanies)
            .unwrap();
        assert!(d.audit_log().verify_integrity(listed.audit_id, &intent).await.unwrap());
    }

    #[tokio::test]
    async fn test_audit_trail_stays_within_retention() {
        let store = ScriptedStore::new();
        let d = dispatcher(&store).with_audit_retention(25);

        for i in 0..200 {
            d.execute(&StructuredIntent::unknown(format!("noise {}", i))).await;
        }

        assert_eq!(d.audit_log().len().await, 25);
        assert_eq!(d.audit_log().list().await.unwrap().len(), 25);
    }
}
