//! Intent classification for user messages.
//!
//! | Config `intent.classifier` | Implementation |
//! |----------------------------|----------------|
//! | `"keyword"` (default) | [`KeywordIntentClassifier`]: offline, deterministic |
//! | `"llm"` | [`LlmIntentClassifier`]: asks the chat model for a JSON verdict |
//!
//! The LLM classifier falls back to `general_travel` when the model's answer
//! cannot be parsed; transport failures propagate as `ExternalCallFailure`.

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use visa_assist_core::countries::COUNTRIES;
use visa_assist_core::models::Message;
use visa_assist_core::router::Intent;

use crate::config::IntentConfig;
use crate::llm::{ChatModel, ChatRequest};
use crate::templates::{intent_user_prompt, INTENT_SYSTEM_PROMPT};

/// Classifies a single user message.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, message: &str) -> Result<Intent>;
}

// ============ Keyword ============

const VISA_TERMS: &[&str] = &[
    "visa",
    "visas",
    "e-visa",
    "evisa",
    "eta",
    "passport",
    "passports",
    "citizen",
    "citizens",
    "nationality",
    "entry requirement",
    "entry requirements",
    "immigration",
    "on arrival",
];

const BAGGAGE_TERMS: &[&str] = &[
    "baggage",
    "luggage",
    "carry-on",
    "carry on",
    "suitcase",
    "checked bag",
    "liquids",
    "weight limit",
    "hand luggage",
    "prohibited items",
];

const TRAVEL_TERMS: &[&str] = &[
    "travel",
    "traveling",
    "travelling",
    "trip",
    "flight",
    "flights",
    "hotel",
    "hotels",
    "package",
    "packages",
    "booking",
    "book",
    "vacation",
    "holiday",
    "airport",
    "tour",
    "itinerary",
    "destination",
];

/// Offline classifier over fixed vocabularies and the country table.
///
/// Precedence: visa terms, baggage terms, a country name (treated as a
/// visa follow-up), general travel terms, otherwise off-topic.
#[derive(Debug, Default)]
pub struct KeywordIntentClassifier;

/// Lowercase, punctuation → spaces, padded so `" term "` matches whole words.
fn padded_words(message: &str) -> String {
    let cleaned: String = message
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { ' ' })
        .collect();
    format!(" {} ", cleaned.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn mentions_any(padded: &str, terms: &[&str]) -> bool {
    terms.iter().any(|t| padded.contains(&format!(" {} ", t)))
}

fn mentions_country(padded: &str) -> bool {
    COUNTRIES
        .iter()
        .any(|(_, name)| padded.contains(&format!(" {} ", name.to_lowercase())))
}

impl KeywordIntentClassifier {
    pub fn classify_text(&self, message: &str) -> Intent {
        let padded = padded_words(message);
        if mentions_any(&padded, VISA_TERMS) {
            Intent::Visa
        } else if mentions_any(&padded, BAGGAGE_TERMS) {
            Intent::Baggage
        } else if mentions_country(&padded) {
            Intent::Visa
        } else if mentions_any(&padded, TRAVEL_TERMS) {
            Intent::GeneralTravel
        } else {
            Intent::OffTopic
        }
    }
}

#[async_trait]
impl IntentClassifier for KeywordIntentClassifier {
    async fn classify(&self, message: &str) -> Result<Intent> {
        Ok(self.classify_text(message))
    }
}

// ============ LLM ============

/// Classifier that asks a chat model for `{"intent": ..., "confidence": ...}`.
pub struct LlmIntentClassifier {
    model: Arc<dyn ChatModel>,
}

impl LlmIntentClassifier {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

/// Extract the intent from a model answer; `general_travel` if unparseable.
pub fn parse_intent_answer(answer: &str) -> Intent {
    let parsed = match (answer.find('{'), answer.rfind('}')) {
        (Some(start), Some(end)) if start < end => {
            serde_json::from_str::<serde_json::Value>(&answer[start..=end]).ok()
        }
        _ => None,
    };

    parsed
        .as_ref()
        .and_then(|v| v.get("intent"))
        .and_then(|i| i.as_str())
        .and_then(|s| s.parse::<Intent>().ok())
        .unwrap_or_else(|| {
            tracing::debug!(answer, "unparseable intent answer; defaulting to general_travel");
            Intent::GeneralTravel
        })
}

#[async_trait]
impl IntentClassifier for LlmIntentClassifier {
    async fn classify(&self, message: &str) -> Result<Intent> {
        let request = ChatRequest {
            system: INTENT_SYSTEM_PROMPT.to_string(),
            history: vec![Message::human(intent_user_prompt(message))],
            ..ChatRequest::default()
        };
        let answer = self.model.complete(&request).await?;
        Ok(parse_intent_answer(&answer.content))
    }
}

/// Create the configured classifier; `model` backs the `llm` variant.
pub fn create_classifier(
    config: &IntentConfig,
    model: Arc<dyn ChatModel>,
) -> Result<Box<dyn IntentClassifier>> {
    match config.classifier.as_str() {
        "keyword" => Ok(Box::new(KeywordIntentClassifier)),
        "llm" => Ok(Box::new(LlmIntentClassifier::new(model))),
        other => bail!("Unknown intent classifier: {}", other),
    }
}
