use crm_intent_engine::{
    config::EngineConfig,
    dispatcher::IntentDispatcher,
    intent::{ActionTag, StructuredIntent},
    store::InMemoryRecordStore,
};
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = EngineConfig::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!("CRM intent engine demo starting");

    let dispatcher = IntentDispatcher::new(
        Arc::new(InMemoryRecordStore::new()),
        config.handler_settings(),
    )
    .with_audit_retention(config.audit_max_records);

    let script = [
        StructuredIntent::new(
            ActionTag::CreateCompany,
            json!({ "companyName": "Acme", "industry": "Manufacturing", "dealValue": 50000 }),
            "Add Acme, a manufacturer, with a 50k deal",
        ),
        StructuredIntent::new(
            ActionTag::CreateContact,
            json!({ "contactFirstName": "Ada", "contactLastName": "Lovelace", "companyName": "acme" }),
            "Ada Lovelace works at Acme",
        ),
        StructuredIntent::new(
            ActionTag::UpdateDeal,
            json!({ "dealTitle": "Acme", "dealStage": "negotiation" }),
            "Move the Acme deal to negotiation",
        ),
        StructuredIntent::new(
            ActionTag::CreateProject,
            json!({ "dealTitle": "Acme" }),
            "Turn the Acme deal into a project",
        ),
        StructuredIntent::new(
            ActionTag::UpdateProject,
            json!({
                "projectName": "Acme",
                "resource": { "name": "Ada", "role": "Lead engineer", "hourlyRate": 120, "hoursAllocated": 200 }
            }),
            "Staff Ada on the Acme project for 200 hours at 120",
        ),
        StructuredIntent::new(
            ActionTag::CreateTimeEntry,
            json!({ "projectName": "Acme", "hours": 6, "description": "Kickoff workshop" }),
            "Log 6 hours of kickoff on Acme",
        ),
        StructuredIntent::new(ActionTag::GetProjects, json!({}), "Show my projects"),
        StructuredIntent::unknown("What's the weather like?"),
    ];

    println!("\n=== INTENT EXECUTION ===");
    for intent in &script {
        let result = dispatcher.execute(intent).await;
        println!("\n> {}", intent.original_text);
        println!("  [{}] {}", intent.action, if result.success { "ok" } else { "failed" });
        if let Some(message) = &result.message {
            println!("  {}", message);
        }
        if let Some(error) = &result.error {
            println!("  error: {}", error);
        }
    }

    let records = dispatcher.audit_log().list().await?;
    println!("\n=== AUDIT TRAIL ({} records) ===", records.len());
    for record in records {
        println!(
            "  {} {:<18} success={} {}ms {}",
            record.created_at.format("%H:%M:%S%.3f"),
            record.action.as_str(),
            record.success,
            record.elapsed_ms,
            &record.intent_fingerprint[..12.min(record.intent_fingerprint.len())]
        );
    }

    Ok(())
}
