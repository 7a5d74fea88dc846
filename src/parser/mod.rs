//! Text to intent parsing
//!
//! The language model turns a user message into a [`StructuredIntent`].
//! Parsers never fail: anything that goes wrong becomes the degenerate
//! `unknown` intent with zero confidence.

use crate::intent::StructuredIntent;
use async_trait::async_trait;

pub mod gemini;
pub use gemini::GeminiIntentParser;

/// Trait for intent extraction (LLM controlled)
#[async_trait]
pub trait IntentParser: Send + Sync {
    async fn parse(&self, text: &str) -> StructuredIntent;
}

/// Rule-based parser for development & testing.
/// First rule whose phrase occurs in the message wins.
#[derive(Default)]
pub struct StaticIntentParser {
    rules: Vec<(String, StructuredIntent)>,
}

impl StaticIntentParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, phrase: &str, intent: StructuredIntent) -> Self {
        self.rules.push((phrase.to_lowercase(), intent));
        self
    }
}

#[async_trait]
impl IntentParser for StaticIntentParser {
    async fn parse(&self, text: &str) -> StructuredIntent {
        let lowered = text.to_lowercase();

        self.rules
            .iter()
            .find(|(phrase, _)| lowered.contains(phrase.as_str()))
            .map(|(_, intent)| StructuredIntent {
                original_text: text.to_string(),
                ..intent.clone()
            })
            .unwrap_or_else(|| StructuredIntent::unknown(text))
    }
}
