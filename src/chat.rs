//! Chat orchestration: one user turn, end to end.
//!
//! ```text
//! append(human)
//!   → Classify ──visa──────────▶ Retrieve ─▶ Generate ─▶ append(assistant)
//!             ├─baggage/general─────────────▶ Generate ─┘
//!             └─off_topic───────▶ Redirect (canned) ────┘
//! ```
//!
//! Stage transitions come from `visa_assist_core::router::next_stage`.
//! Retrieval goes through the `visa_requirements_search` tool and its
//! result is logged as a `tool` message; the generator receives the facts
//! as separate context together with the rolling window of prior dialogue.
//!
//! Before retrieving, the passport country and destination are read from
//! the thread's human messages ([`TravelSlots`]). If either is missing the
//! turn ends with a canned clarifying question and no model call. A message
//! that changes those details right after a visa exchange (an answer to the
//! question, or "and to Japan?") is routed as a visa turn whatever the
//! classifier says.
//!
//! The generator is offered the tool registry. Tool calls it makes are run
//! through [`ToolRegistry::call`], logged as `tool` messages, and fed back
//! for up to [`MAX_TOOL_ROUNDS`] rounds.
//!
//! When the classifier, embedder, or LLM fails after retries
//! (`ExternalCallFailure`), the turn ends with the try-again reply, which
//! is still appended to the thread, and the outcome is marked `degraded`.
//! Every other error aborts the turn.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use visa_assist_core::error::is_external_failure;
use serde_json::json;
use visa_assist_core::models::{Message, Role};
use visa_assist_core::retrieval::SearchHit;
use visa_assist_core::router::{next_stage, route, Intent, Route, Stage};
use visa_assist_core::session::{recent_window, ConversationLog};
use visa_assist_core::slots::TravelSlots;
use visa_assist_core::Error;

use crate::intent::IntentClassifier;
use crate::llm::{ChatModel, ChatRequest, ToolCall, ToolExchange};
use crate::templates::{
    clarifying_question, ASSISTANT_SYSTEM_PROMPT, OFF_TOPIC_REPLY, TRY_AGAIN_REPLY,
};
use crate::tools::{ToolContext, ToolRegistry, VISA_SEARCH_TOOL};

/// Model requests that may carry tool calls in one turn; the request after
/// the last round offers no tools.
pub const MAX_TOOL_ROUNDS: usize = 3;

/// Result of one turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub reply: String,
    /// `None` when classification itself failed.
    pub intent: Option<Intent>,
    pub route: Option<Route>,
    /// Facts retrieved for this turn.
    pub facts: Vec<SearchHit>,
    /// Trip details known after this message.
    pub slots: TravelSlots,
    /// True when the reply is a clarifying question.
    pub clarifying: bool,
    /// True when the reply is the try-again apology.
    pub degraded: bool,
}

/// The travel assistant: a conversation log plus its collaborators.
pub struct Assistant {
    log: Arc<dyn ConversationLog>,
    classifier: Box<dyn IntentClassifier>,
    model: Arc<dyn ChatModel>,
    tools: ToolRegistry,
    tool_ctx: ToolContext,
    max_history_messages: usize,
}

/// Progress of a turn, filled in stage by stage.
#[derive(Default)]
struct TurnState {
    intent: Option<Intent>,
    facts: Vec<SearchHit>,
    slots: TravelSlots,
    clarifying: bool,
    context: Option<String>,
    reply: Option<String>,
}

impl Assistant {
    pub fn new(
        log: Arc<dyn ConversationLog>,
        classifier: Box<dyn IntentClassifier>,
        model: Arc<dyn ChatModel>,
        tools: ToolRegistry,
        tool_ctx: ToolContext,
        max_history_messages: usize,
    ) -> Self {
        Self {
            log,
            classifier,
            model,
            tools,
            tool_ctx,
            max_history_messages,
        }
    }

    pub fn log(&self) -> &Arc<dyn ConversationLog> {
        &self.log
    }

    /// Process one user message on `thread_id` and return the reply.
    pub async fn handle_turn(&self, thread_id: &str, text: &str) -> Result<TurnOutcome> {
        if text.trim().is_empty() {
            return Err(Error::InvalidParameter {
                name: "message",
                reason: "must not be empty".to_string(),
            }
            .into());
        }

        self.log
            .append(thread_id, &Message::human(text))
            .await
            .with_context(|| format!("Failed to append to thread {}", thread_id))?;

        let mut state = TurnState::default();
        let outcome = match self.run_stages(thread_id, text, &mut state).await {
            Ok(()) => TurnOutcome {
                reply: state.reply.take().unwrap_or_default(),
                intent: state.intent,
                route: state.intent.map(route),
                facts: state.facts,
                slots: state.slots,
                clarifying: state.clarifying,
                degraded: false,
            },
            Err(err) if is_external_failure(&err) => {
                tracing::warn!(thread_id, error = %format!("{:#}", err), "degraded turn");
                TurnOutcome {
                    reply: TRY_AGAIN_REPLY.to_string(),
                    intent: state.intent,
                    route: state.intent.map(route),
                    facts: state.facts,
                    slots: state.slots,
                    clarifying: false,
                    degraded: true,
                }
            }
            Err(err) => return Err(err),
        };

        self.log
            .append(thread_id, &Message::assistant(&outcome.reply))
            .await?;

        tracing::info!(
            thread_id,
            intent = outcome.intent.map(|i| i.as_str()).unwrap_or("unknown"),
            facts = outcome.facts.len(),
            clarifying = outcome.clarifying,
            degraded = outcome.degraded,
            "turn complete"
        );
        Ok(outcome)
    }

    async fn run_stages(&self, thread_id: &str, text: &str, state: &mut TurnState) -> Result<()> {
        let classified = self.classifier.classify(text).await?;

        let history = self.log.history(thread_id).await?;
        let earlier = history.split_last().map(|(_, e)| e).unwrap_or(&[]);
        state.slots = TravelSlots::from_history(&history);

        // New trip details right after a visa exchange stay on the visa path
        let changed = state.slots != TravelSlots::from_history(earlier);
        let intent = if changed && continues_visa_question(earlier) {
            Intent::Visa
        } else {
            classified
        };
        state.intent = Some(intent);
        tracing::debug!(thread_id, %intent, %classified, "classified");

        let mut stage = next_stage(Stage::Classify, intent);
        while stage != Stage::Done {
            match stage {
                Stage::Retrieve => {
                    if let Some(gap) = state.slots.gap() {
                        tracing::debug!(thread_id, ?gap, "asking for missing trip details");
                        state.reply = Some(clarifying_question(&gap));
                        state.clarifying = true;
                        break;
                    }
                    self.retrieve(thread_id, text, state).await?;
                }
                Stage::Generate => {
                    let reply = self.generate(thread_id, state).await?;
                    state.reply = Some(reply);
                }
                Stage::Redirect => state.reply = Some(OFF_TOPIC_REPLY.to_string()),
                Stage::Classify | Stage::Done => {}
            }
            stage = next_stage(stage, intent);
        }
        Ok(())
    }

    async fn retrieve(&self, thread_id: &str, text: &str, state: &mut TurnState) -> Result<()> {
        let mut params = json!({ "query": state.slots.search_text(text) });
        if let Some((passport, destination)) = state.slots.pair() {
            params["passport"] = json!(passport);
            params["destination"] = json!(destination);
        }
        let result = self
            .tools
            .call(VISA_SEARCH_TOOL, params, &self.tool_ctx)
            .await?;

        let facts: Vec<SearchHit> = serde_json::from_value(result["results"].clone())?;
        let context = result["context"].as_str().unwrap_or_default().to_string();

        self.log
            .append(thread_id, &Message::tool(VISA_SEARCH_TOOL, &context))
            .await?;

        if !context.is_empty() {
            state.context = Some(context);
        }
        state.facts = facts;
        Ok(())
    }

    async fn generate(&self, thread_id: &str, state: &mut TurnState) -> Result<String> {
        let history = self.log.history(thread_id).await?;
        let mut request = ChatRequest {
            system: ASSISTANT_SYSTEM_PROMPT.to_string(),
            history: recent_window(&history, self.max_history_messages),
            context: state.context.clone(),
            tools: self.tools.specs(),
            exchanges: Vec::new(),
        };

        let mut rounds = 0;
        loop {
            let reply = self.model.complete(&request).await?;
            if reply.tool_calls.is_empty() || request.tools.is_empty() {
                return Ok(reply.content);
            }
            for call in reply.tool_calls {
                let output = self.run_tool_call(thread_id, &call, state).await?;
                request.exchanges.push(ToolExchange { call, output });
            }
            rounds += 1;
            if rounds >= MAX_TOOL_ROUNDS {
                request.tools.clear();
            }
        }
    }

    /// Run one model-requested tool call and log its output. Bad arguments
    /// go back to the model as an error string instead of failing the turn.
    async fn run_tool_call(
        &self,
        thread_id: &str,
        call: &ToolCall,
        state: &mut TurnState,
    ) -> Result<String> {
        tracing::debug!(thread_id, tool = %call.name, "model tool call");
        let output = match self
            .tools
            .call(&call.name, call.arguments.clone(), &self.tool_ctx)
            .await
        {
            Ok(result) => {
                if let Ok(hits) = serde_json::from_value::<Vec<SearchHit>>(result["results"].clone())
                {
                    for hit in hits {
                        let key = hit.metadata.key();
                        if !state.facts.iter().any(|f| f.metadata.key() == key) {
                            state.facts.push(hit);
                        }
                    }
                }
                match result["context"].as_str() {
                    Some(context) => context.to_string(),
                    None => result.to_string(),
                }
            }
            Err(err) => match err.downcast_ref::<Error>() {
                Some(Error::InvalidParameter { .. }) => format!("Error: {}", err),
                _ => return Err(err),
            },
        };

        self.log
            .append(thread_id, &Message::tool(&call.name, &output))
            .await?;
        Ok(output)
    }
}

/// True when the previous turn looked up visa rules or asked for missing
/// trip details.
fn continues_visa_question(earlier: &[Message]) -> bool {
    let looked_up = earlier
        .iter()
        .rev()
        .take_while(|m| m.role != Role::Human)
        .any(|m| m.role == Role::Tool && m.name.as_deref() == Some(VISA_SEARCH_TOOL));
    looked_up || answers_clarification(earlier)
}

/// True when the last assistant message in `earlier` asked for trip details
/// that are still missing from it.
fn answers_clarification(earlier: &[Message]) -> bool {
    let Some(gap) = TravelSlots::from_history(earlier).gap() else {
        return false;
    };
    earlier
        .iter()
        .rev()
        .find(|m| m.role == Role::Assistant)
        .is_some_and(|m| m.content == clarifying_question(&gap))
}
