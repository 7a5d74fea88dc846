//! Natural-language replies for executed intents
//!
//! The engine's own `message` is always a usable reply. A model-backed
//! synthesizer may rephrase it and falls back to it on any failure.

use crate::gemini::{GeminiClient, GenerationOptions};
use crate::intent::ActionTag;
use crate::result::{ExecutionResult, GENERIC_APOLOGY};
use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

/// Everything a synthesizer may look at.
#[derive(Debug, Clone, Copy)]
pub struct ReplyContext<'a> {
    pub action: ActionTag,
    pub original_text: &'a str,
    pub result: &'a ExecutionResult,
}

#[async_trait]
pub trait ReplySynthesizer: Send + Sync {
    async fn synthesize(&self, ctx: ReplyContext<'_>) -> String;
}

/// Reply with the result's own message.
pub struct MessageReplySynthesizer;

impl MessageReplySynthesizer {
    pub fn reply_for(result: &ExecutionResult) -> String {
        result
            .message
            .clone()
            .or_else(|| result.error.clone())
            .unwrap_or_else(|| GENERIC_APOLOGY.to_string())
    }
}

#[async_trait]
impl ReplySynthesizer for MessageReplySynthesizer {
    async fn synthesize(&self, ctx: ReplyContext<'_>) -> String {
        Self::reply_for(ctx.result)
    }
}

const SYSTEM_PROMPT: &str = "You are a CRM assistant. Given the user's request and the JSON outcome \
of the action the system ran, reply to the user in one to three friendly sentences. \
Only state facts present in the outcome. If the action failed, say what went wrong and \
what the user could provide instead. Do not output JSON.";

pub struct GeminiReplySynthesizer {
    client: GeminiClient,
}

impl GeminiReplySynthesizer {
    pub fn new(client: GeminiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReplySynthesizer for GeminiReplySynthesizer {
    async fn synthesize(&self, ctx: ReplyContext<'_>) -> String {
        let fallback = MessageReplySynthesizer::reply_for(ctx.result);
        if !self.client.is_configured() {
            return fallback;
        }

        let outcome = json!({
            "request": ctx.original_text,
            "action": ctx.action,
            "success": ctx.result.success,
            "data": ctx.result.data,
            "error": ctx.result.error,
            "message": ctx.result.message,
        });

        match self
            .client
            .generate(SYSTEM_PROMPT, &outcome.to_string(), GenerationOptions::prose())
            .await
        {
            Ok((reply, _)) if !reply.trim().is_empty() => reply.trim().to_string(),
            Ok(_) => fallback,
            Err(e) => {
                warn!(error = %e, "Reply synthesis failed, using engine message");
                fallback
            }
        }
    }
}
