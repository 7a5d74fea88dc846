use crm_intent_engine::{
    api::{start_server, ApiState},
    config::EngineConfig,
    dispatcher::IntentDispatcher,
    gemini::GeminiClient,
    parser::GeminiIntentParser,
    reply::GeminiReplySynthesizer,
    store::InMemoryRecordStore,
};
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

    info!("CRM intent engine - API server");
    info!(port = config.port, gemini = config.has_gemini(), "Configuration loaded");

    // Parser and synthesizer each get their own pooled client
    let parser = GeminiIntentParser::new(GeminiClient::new(
        config.gemini_api_key.clone(),
        config.gemini_model_url.clone(),
    )?);
    let synthesizer = GeminiReplySynthesizer::new(GeminiClient::new(
        config.gemini_api_key.clone(),
        config.gemini_model_url.clone(),
    )?);

    let dispatcher = IntentDispatcher::new(
        Arc::new(InMemoryRecordStore::new()),
        config.handler_settings(),
    )
    .with_audit_retention(config.audit_max_records);

    let state = ApiState {
        dispatcher: Arc::new(dispatcher),
        parser: Arc::new(parser),
        synthesizer: Arc::new(synthesizer),
    };

    info!("Engine initialized, starting API server");
    start_server(state, config.port).await?;

    Ok(())
}
