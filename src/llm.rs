//! Response generation through a chat-completion model.
//!
//! The [`ChatModel`] trait takes a [`ChatRequest`]: the persona system
//! prompt, the rolling window of prior dialogue, and optionally the
//! retrieved visa facts. Facts travel in `context` and are never spliced
//! into the user's text; [`OpenAIChatModel`] renders them as a separate
//! system message after the persona prompt.
//!
//! A request may also advertise tools. The model answers with a
//! [`ChatReply`] that carries either text or [`ToolCall`]s; the caller runs
//! the calls and asks again with the results in `exchanges`.
//!
//! | Config `llm.provider` | Implementation |
//! |-----------------------|----------------|
//! | `"disabled"` | [`DisabledChatModel`] (offline, echoes retrieved facts) |
//! | `"openai"` | [`OpenAIChatModel`] (any OpenAI-compatible endpoint) |

use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use visa_assist_core::models::{Message, Role};

use crate::config::LlmConfig;
use crate::http::post_json_with_retry;
use crate::templates::{CONTEXT_HEADER, NO_MODEL_REPLY};
use crate::tools::ToolSpec;

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// A tool call together with what it returned.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolExchange {
    pub call: ToolCall,
    pub output: String,
}

/// Input to one generation call.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub system: String,
    /// Prior dialogue, oldest first, ending with the current human message.
    pub history: Vec<Message>,
    /// Retrieved facts, kept apart from the dialogue.
    pub context: Option<String>,
    /// Tools the model may call. Empty means answer in text.
    pub tools: Vec<ToolSpec>,
    /// Tool calls already made this turn, in order.
    pub exchanges: Vec<ToolExchange>,
}

/// What the model sent back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatReply {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

impl ChatReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }
}

/// A chat-completion model.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Generate the assistant's reply, or request tool calls.
    async fn complete(&self, request: &ChatRequest) -> Result<ChatReply>;
}

// ============ Disabled ============

/// Offline stand-in: replies with the retrieved facts, or a fixed notice.
pub struct DisabledChatModel;

#[async_trait]
impl ChatModel for DisabledChatModel {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatReply> {
        Ok(ChatReply::text(match request.context.as_deref() {
            Some(facts) if !facts.trim().is_empty() => {
                format!("Here is what I found:\n\n{}", facts)
            }
            _ => NO_MODEL_REPLY.to_string(),
        }))
    }
}

// ============ OpenAI-compatible ============

/// Chat model speaking the OpenAI `/chat/completions` protocol.
pub struct OpenAIChatModel {
    model: String,
    url: String,
    api_key: String,
    temperature: f32,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIChatModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.model required for OpenAI provider"))?;
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            anyhow::anyhow!("{} environment variable not set", config.api_key_env)
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            url: config.url.trim_end_matches('/').to_string(),
            api_key,
            temperature: config.temperature,
            max_retries: config.max_retries,
            client,
        })
    }
}

/// Render a request into OpenAI `messages`.
///
/// Order: persona system prompt, facts system message (if any), dialogue,
/// then each tool exchange as an assistant `tool_calls` message followed by
/// its `tool` result. Tool messages in the history are skipped.
pub fn render_messages(request: &ChatRequest) -> Vec<Value> {
    let mut messages = vec![json!({ "role": "system", "content": request.system })];

    if let Some(facts) = request.context.as_deref() {
        messages.push(json!({
            "role": "system",
            "content": format!("{}\n\n{}", CONTEXT_HEADER, facts),
        }));
    }

    for m in &request.history {
        let role = match m.role {
            Role::Human => "user",
            Role::Assistant => "assistant",
            Role::Tool => continue,
        };
        messages.push(json!({ "role": role, "content": m.content }));
    }

    for ex in &request.exchanges {
        messages.push(json!({
            "role": "assistant",
            "content": Value::Null,
            "tool_calls": [{
                "id": ex.call.id,
                "type": "function",
                "function": {
                    "name": ex.call.name,
                    "arguments": ex.call.arguments.to_string(),
                },
            }],
        }));
        messages.push(json!({
            "role": "tool",
            "tool_call_id": ex.call.id,
            "content": ex.output,
        }));
    }

    messages
}

/// Render tool specs into the OpenAI `tools` array.
pub fn render_tools(tools: &[ToolSpec]) -> Vec<Value> {
    tools
        .iter()
        .map(|t| {
            json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                },
            })
        })
        .collect()
}

fn parse_tool_call(call: &Value) -> Option<ToolCall> {
    let function = call.get("function")?;
    // Arguments arrive as a JSON-encoded string
    let arguments = match function.get("arguments") {
        Some(Value::String(raw)) => {
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone()))
        }
        Some(other) => other.clone(),
        None => json!({}),
    };
    Some(ToolCall {
        id: call.get("id")?.as_str()?.to_string(),
        name: function.get("name")?.as_str()?.to_string(),
        arguments,
    })
}

fn parse_completion(json: &Value) -> Result<ChatReply> {
    let message = json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .ok_or_else(|| anyhow::anyhow!("Invalid chat completion response: missing message"))?;

    let tool_calls: Vec<ToolCall> = message
        .get("tool_calls")
        .and_then(|c| c.as_array())
        .map(|calls| calls.iter().filter_map(parse_tool_call).collect())
        .unwrap_or_default();
    let content = message.get("content").and_then(|c| c.as_str());

    match content {
        Some(text) => Ok(ChatReply {
            content: text.trim().to_string(),
            tool_calls,
        }),
        None if !tool_calls.is_empty() => Ok(ChatReply {
            content: String::new(),
            tool_calls,
        }),
        None => bail!("Invalid chat completion response: missing content"),
    }
}

#[async_trait]
impl ChatModel for OpenAIChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatReply> {
        let mut body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": render_messages(request),
        });
        if !request.tools.is_empty() {
            body["tools"] = Value::Array(render_tools(&request.tools));
            body["tool_choice"] = json!("auto");
        }
        let endpoint = format!("{}/chat/completions", self.url);

        let json = post_json_with_retry(
            "LLM",
            self.max_retries,
            || {
                self.client
                    .post(&endpoint)
                    .header("Authorization", format!("Bearer {}", self.api_key))
            },
            &body,
        )
        .await?;

        parse_completion(&json)
    }
}

/// Create the configured [`ChatModel`].
pub fn create_chat_model(config: &LlmConfig) -> Result<Box<dyn ChatModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledChatModel)),
        "openai" => Ok(Box::new(OpenAIChatModel::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(context: Option<&str>) -> ChatRequest {
        ChatRequest {
            system: "persona".into(),
            history: vec![
                Message::human("Do I need a visa for India?"),
                Message::tool("visa_requirements_search", "raw"),
                Message::assistant("Which passport do you hold?"),
                Message::human("US"),
            ],
            context: context.map(str::to_string),
            ..ChatRequest::default()
        }
    }

    #[test]
    fn facts_go_in_their_own_system_message() {
        let messages = render_messages(&request(Some("Citizens of United States ...")));
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[0]["content"], "persona");
        assert_eq!(messages[1]["role"], "system");
        assert!(messages[1]["content"]
            .as_str()
            .unwrap()
            .ends_with("Citizens of United States ..."));
        assert_eq!(messages[4], json!({ "role": "user", "content": "US" }));
    }

    #[test]
    fn no_context_no_extra_message() {
        let messages = render_messages(&request(None));
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1]["role"], "user");
    }

    #[test]
    fn parses_completion_content() {
        let json = json!({ "choices": [{ "message": { "role": "assistant", "content": " Hi! " } }] });
        assert_eq!(parse_completion(&json).unwrap(), ChatReply::text("Hi!"));
        assert!(parse_completion(&json!({ "choices": [] })).is_err());
    }

    #[test]
    fn parses_tool_calls_with_string_arguments() {
        let json = json!({ "choices": [{ "message": {
            "role": "assistant",
            "content": null,
            "tool_calls": [{
                "id": "call_1",
                "type": "function",
                "function": {
                    "name": "visa_requirements_search",
                    "arguments": "{\"query\": \"visa for Japan\", \"passport\": \"USA\"}"
                }
            }]
        } }] });
        let reply = parse_completion(&json).unwrap();
        assert_eq!(reply.content, "");
        assert_eq!(
            reply.tool_calls,
            vec![ToolCall {
                id: "call_1".into(),
                name: "visa_requirements_search".into(),
                arguments: json!({ "query": "visa for Japan", "passport": "USA" }),
            }]
        );

        let no_content = json!({ "choices": [{ "message": { "content": null } }] });
        assert!(parse_completion(&no_content).is_err());
    }

    #[test]
    fn tools_and_exchanges_render_in_openai_shape() {
        let spec = crate::tools::ToolRegistry::with_builtins().specs();
        let rendered = render_tools(&spec);
        assert_eq!(rendered[0]["type"], "function");
        assert_eq!(rendered[0]["function"]["name"], "visa_requirements_search");
        assert_eq!(rendered[0]["function"]["parameters"]["type"], "object");

        let mut req = request(None);
        req.exchanges.push(ToolExchange {
            call: ToolCall {
                id: "call_1".into(),
                name: "visa_requirements_search".into(),
                arguments: json!({ "query": "Japan" }),
            },
            output: "Citizens of United States ...".into(),
        });
        let messages = render_messages(&req);
        let n = messages.len();
        assert_eq!(messages[n - 2]["role"], "assistant");
        assert_eq!(messages[n - 2]["tool_calls"][0]["id"], "call_1");
        assert_eq!(
            messages[n - 2]["tool_calls"][0]["function"]["arguments"],
            "{\"query\":\"Japan\"}"
        );
        assert_eq!(
            messages[n - 1],
            json!({ "role": "tool", "tool_call_id": "call_1", "content": "Citizens of United States ..." })
        );
    }

    #[tokio::test]
    async fn disabled_model_echoes_facts() {
        let reply = DisabledChatModel
            .complete(&request(Some("fact one")))
            .await
            .unwrap();
        assert!(reply.content.contains("fact one"));
        assert!(reply.tool_calls.is_empty());

        let reply = DisabledChatModel.complete(&request(None)).await.unwrap();
        assert_eq!(reply.content, NO_MODEL_REPLY);
    }
}
