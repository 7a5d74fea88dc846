//! REST API server for the intent engine
//!
//! A thin adapter: structured intents go straight to the dispatcher, free
//! text goes through the parser first and the synthesizer afterwards.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::dispatcher::IntentDispatcher;
use crate::handlers::help;
use crate::intent::StructuredIntent;
use crate::parser::IntentParser;
use crate::reply::{ReplyContext, ReplySynthesizer};
use crate::result::ExecutionResult;

//
// ================= Request Models =================
//

#[derive(Debug, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Either a single `message` or a transcript; the last user turn is used.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

impl ChatRequest {
    fn user_text(&self) -> Option<&str> {
        self.message
            .as_deref()
            .or_else(|| {
                self.messages
                    .iter()
                    .rev()
                    .find(|m| m.role == "user")
                    .map(|m| m.content.as_str())
            })
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }
}

#[derive(Debug, Deserialize)]
pub struct HelpQuery {
    pub topic: Option<String>,
}

//
// ================= Response Models =================
//

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub reply: String,
    pub intent: StructuredIntent,
    pub result: ExecutionResult,
    pub timestamp: String,
}

//
// ================= API State =================
//

#[derive(Clone)]
pub struct ApiState {
    pub dispatcher: Arc<IntentDispatcher>,
    pub parser: Arc<dyn IntentParser>,
    pub synthesizer: Arc<dyn ReplySynthesizer>,
}

//
// ================= Endpoints =================
//

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Any JSON body is accepted; a malformed intent degrades to `unknown`.
async fn execute_intent(
    State(state): State<ApiState>,
    Json(body): Json<serde_json::Value>,
) -> Json<ExecutionResult> {
    let intent = StructuredIntent::from_value(body);
    info!(action = %intent.action, "Received structured intent");
    Json(state.dispatcher.execute(&intent).await)
}

async fn chat_handler(
    State(state): State<ApiState>,
    Json(req): Json<ChatRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    let Some(text) = req.user_text() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "No user message found" })),
        );
    };

    let intent = state.parser.parse(text).await;
    let result = state.dispatcher.execute(&intent).await;
    let reply = state
        .synthesizer
        .synthesize(ReplyContext {
            action: intent.action,
            original_text: text,
            result: &result,
        })
        .await;

    let response = ChatResponse {
        reply,
        intent,
        result,
        timestamp: chrono::Utc::now().to_rfc3339(),
    };
    (
        StatusCode::OK,
        Json(serde_json::to_value(response).unwrap_or_default()),
    )
}

async fn help_handler(
    axum::extract::Query(query): axum::extract::Query<HelpQuery>,
) -> Json<ExecutionResult> {
    Json(help::lookup(query.topic.as_deref()))
}

//
// ================= Router =================
//

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/intents/execute", post(execute_intent))
        .route("/api/chat", post(chat_handler))
        .route("/api/help", get(help_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

//
// ================= Server Startup =================
//

pub async fn start_server(
    state: ApiState,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::HandlerSettings;
    use crate::intent::ActionTag;
    use crate::parser::StaticIntentParser;
    use crate::reply::MessageReplySynthesizer;
    use crate::store::InMemoryRecordStore;
    use serde_json::json;

    fn state() -> ApiState {
        let parser = StaticIntentParser::new().with_rule(
            "add acme",
            StructuredIntent::new(ActionTag::CreateCompany, json!({ "companyName": "Acme" }), ""),
        );
        ApiState {
            dispatcher: Arc::new(IntentDispatcher::new(
                Arc::new(InMemoryRecordStore::new()),
                HandlerSettings::default(),
            )),
            parser: Arc::new(parser),
            synthesizer: Arc::new(MessageReplySynthesizer),
        }
    }

    #[test]
    fn test_chat_request_uses_last_user_turn() {
        let req: ChatRequest = serde_json::from_value(json!({
            "messages": [
                { "role": "user", "content": "first" },
                { "role": "assistant", "content": "ok" },
                { "role": "user", "content": " second " }
            ]
        }))
        .unwrap();
        assert_eq!(req.user_text(), Some("second"));

        let req: ChatRequest = serde_json::from_value(json!({ "message": "  " })).unwrap();
        assert_eq!(req.user_text(), None);
    }

    #[tokio::test]
    async fn test_chat_runs_parse_execute_reply() {
        let (status, Json(body)) = chat_handler(
            State(state()),
            Json(ChatRequest {
                message: Some("please add Acme".to_string()),
                messages: Vec::new(),
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"]["success"], true);
        assert_eq!(body["reply"], "Created company 'Acme'.");
        assert_eq!(body["intent"]["action"], "create_company");
    }

    #[tokio::test]
    async fn test_execute_endpoint_returns_result() {
        let Json(result) = execute_intent(
            State(state()),
            Json(json!({ "action": "create_company", "entities": { "companyName": "Acme" } })),
        )
        .await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn test_execute_endpoint_tolerates_malformed_intent() {
        for body in [
            json!({ "action": 42, "entities": [1, 2] }),
            json!({ "entities": { "companyName": "Acme" } }),
            json!("create_company"),
        ] {
            let Json(result) = execute_intent(State(state()), Json(body)).await;
            assert!(!result.success);
            assert!(result.is_well_formed());
            assert_eq!(result.message.as_deref(), Some(crate::result::NOT_UNDERSTOOD));
        }

        let Json(result) = execute_intent(
            State(state()),
            Json(json!({ "action": "get_companies", "entities": "oops" })),
        )
        .await;
        assert!(result.success);
    }
}
