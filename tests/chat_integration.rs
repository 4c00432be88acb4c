//! Integration tests for the conversation log and chat turn routing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use tempfile::TempDir;

use visa_assist::chat::Assistant;
use visa_assist::embedding::EmbeddingProvider;
use visa_assist::index::{build_or_load, open_existing, DocumentStore};
use visa_assist::intent::KeywordIntentClassifier;
use visa_assist::llm::{ChatModel, ChatReply, ChatRequest, ToolCall};
use visa_assist::sqlite_session::SqliteConversationLog;
use visa_assist::templates::{clarifying_question, OFF_TOPIC_REPLY, TRY_AGAIN_REPLY};
use visa_assist::tools::{ToolContext, ToolRegistry, VISA_SEARCH_TOOL};
use visa_assist_core::index::{BuildOptions, NoProgress};
use visa_assist_core::models::{Message, RawVisaRow, Role};
use visa_assist_core::normalize::normalize;
use visa_assist_core::retrieval::SearchParams;
use visa_assist_core::router::{Intent, Route};
use visa_assist_core::session::ConversationLog;
use visa_assist_core::slots::SlotGap;
use visa_assist_core::Error;

struct LetterEmbedder(&'static str);

#[async_trait]
impl EmbeddingProvider for LetterEmbedder {
    fn model_name(&self) -> &str {
        self.0
    }

    fn dims(&self) -> usize {
        26
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0f32; 26];
                for b in t.to_ascii_lowercase().bytes() {
                    if b.is_ascii_lowercase() {
                        v[(b - b'a') as usize] += 1.0;
                    }
                }
                v
            })
            .collect())
    }
}

/// Records every request; plays back scripted replies, then a fixed
/// answer, or fails like an exhausted HTTP collaborator.
struct ScriptedModel {
    requests: Mutex<Vec<ChatRequest>>,
    script: Mutex<VecDeque<ChatReply>>,
    fail: bool,
}

const ANSWER: &str = "Scripted answer.";

impl ScriptedModel {
    fn replying() -> Arc<Self> {
        Self::scripted(Vec::new())
    }

    fn scripted(replies: Vec<ChatReply>) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            script: Mutex::new(replies.into()),
            fail: false,
        })
    }

    fn unavailable() -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            script: Mutex::new(VecDeque::new()),
            fail: true,
        })
    }

    fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatReply> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail {
            return Err(Error::ExternalCallFailure {
                service: "LLM".into(),
                attempts: 4,
                message: "HTTP 503".into(),
            }
            .into());
        }
        let next = self.script.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| ChatReply::text(ANSWER)))
    }
}

fn search_call(id: &str, arguments: serde_json::Value) -> ChatReply {
    ChatReply {
        content: String::new(),
        tool_calls: vec![ToolCall {
            id: id.into(),
            name: VISA_SEARCH_TOOL.into(),
            arguments,
        }],
    }
}

async fn visa_store(tmp: &TempDir) -> Arc<DocumentStore> {
    let raw: Vec<RawVisaRow> = [
        ("USA", "IND", "visa required"),
        ("USA", "CAN", "visa free"),
        ("GBR", "FRA", "90"),
        ("IND", "THA", "visa on arrival"),
    ]
    .iter()
    .map(|(p, d, r)| RawVisaRow::new(*p, *d, *r))
    .collect();
    let rules = normalize(&raw).rules;

    let options = BuildOptions {
        source: "passport-index-2025".into(),
        batch_size: 2,
    };
    let store = build_or_load(
        &rules,
        &tmp.path().join("store"),
        false,
        Arc::new(LetterEmbedder("letters")),
        &options,
        &NoProgress,
    )
    .await
    .unwrap();
    Arc::new(store)
}

async fn assistant(
    tmp: &TempDir,
    store: Arc<DocumentStore>,
    model: Arc<ScriptedModel>,
    max_history: usize,
) -> Assistant {
    let log = SqliteConversationLog::open(&tmp.path().join("conversations.sqlite"))
        .await
        .unwrap();
    let params = SearchParams {
        k: 2,
        ..SearchParams::default()
    };
    Assistant::new(
        Arc::new(log),
        Box::new(KeywordIntentClassifier),
        model,
        ToolRegistry::with_builtins(),
        ToolContext::new(store, params),
        max_history,
    )
}

fn roles(messages: &[Message]) -> Vec<Role> {
    messages.iter().map(|m| m.role).collect()
}

#[tokio::test]
async fn history_survives_reopening_the_log() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("conversations.sqlite");

    let log = SqliteConversationLog::open(&path).await.unwrap();
    let m1 = Message::human("Do I need a visa for India?");
    let m2 = Message::tool(VISA_SEARCH_TOOL, "Citizens of United States ...");
    let m3 = Message::assistant("Yes, a visa is required.");
    for m in [&m1, &m2, &m3] {
        log.append("t1", m).await.unwrap();
    }
    log.append("t2", &Message::human("hello")).await.unwrap();
    log.close().await;

    let reopened = SqliteConversationLog::open(&path).await.unwrap();
    assert_eq!(reopened.history("t1").await.unwrap(), vec![m1, m2, m3]);
    assert_eq!(reopened.history("t2").await.unwrap().len(), 1);
    assert!(reopened.history("unknown").await.unwrap().is_empty());
    assert_eq!(reopened.threads().await.unwrap(), vec!["t2", "t1"]);
    reopened.close().await;
}

#[tokio::test]
async fn off_topic_gets_canned_reply_without_model_call() {
    let tmp = TempDir::new().unwrap();
    let store = visa_store(&tmp).await;
    let model = ScriptedModel::replying();
    let bot = assistant(&tmp, store, model.clone(), 10).await;

    let outcome = bot.handle_turn("t1", "Tell me a joke").await.unwrap();
    assert_eq!(outcome.intent, Some(Intent::OffTopic));
    assert_eq!(outcome.route, Some(Route::Redirect));
    assert_eq!(outcome.reply, OFF_TOPIC_REPLY);
    assert!(outcome.facts.is_empty());
    assert!(model.requests().is_empty());

    let history = bot.log().history("t1").await.unwrap();
    assert_eq!(roles(&history), vec![Role::Human, Role::Assistant]);
    assert_eq!(history[1].content, OFF_TOPIC_REPLY);
}

#[tokio::test]
async fn visa_question_retrieves_and_logs_tool_message() {
    let tmp = TempDir::new().unwrap();
    let store = visa_store(&tmp).await;
    let model = ScriptedModel::replying();
    let bot = assistant(&tmp, store, model.clone(), 10).await;

    let outcome = bot
        .handle_turn("t1", "I'm American, do I need a visa for India?")
        .await
        .unwrap();
    assert_eq!(outcome.intent, Some(Intent::Visa));
    assert_eq!(outcome.route, Some(Route::RetrieveAndRespond));
    assert_eq!(outcome.slots.pair(), Some(("USA", "IND")));
    assert!(!outcome.clarifying);
    assert_eq!(outcome.facts.len(), 2);
    // The exact pair leads regardless of embedding similarity
    assert_eq!(outcome.facts[0].metadata.passport_iso, "USA");
    assert_eq!(outcome.facts[0].metadata.destination_iso, "IND");
    assert_eq!(outcome.reply, ANSWER);
    assert!(!outcome.degraded);

    let history = bot.log().history("t1").await.unwrap();
    assert_eq!(
        roles(&history),
        vec![Role::Human, Role::Tool, Role::Assistant]
    );
    assert_eq!(history[1].name.as_deref(), Some(VISA_SEARCH_TOOL));

    // Facts travel as context; the user's text is passed through untouched
    let requests = model.requests();
    assert_eq!(requests.len(), 1);
    let context = requests[0].context.as_deref().unwrap();
    assert!(outcome.facts.iter().all(|f| context.contains(&f.content)));
    assert_eq!(
        requests[0].history,
        vec![Message::human("I'm American, do I need a visa for India?")]
    );
    assert!(requests[0].tools.iter().any(|t| t.name == VISA_SEARCH_TOOL));
}

#[tokio::test]
async fn baggage_question_skips_retrieval() {
    let tmp = TempDir::new().unwrap();
    let store = visa_store(&tmp).await;
    let model = ScriptedModel::replying();
    let bot = assistant(&tmp, store, model.clone(), 10).await;

    let outcome = bot
        .handle_turn("t1", "What's the baggage allowance?")
        .await
        .unwrap();
    assert_eq!(outcome.intent, Some(Intent::Baggage));
    assert_eq!(outcome.route, Some(Route::Respond));
    assert!(outcome.facts.is_empty());

    let requests = model.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].context.is_none());

    let history = bot.log().history("t1").await.unwrap();
    assert_eq!(roles(&history), vec![Role::Human, Role::Assistant]);
}

#[tokio::test]
async fn generator_sees_rolling_window_only() {
    let tmp = TempDir::new().unwrap();
    let store = visa_store(&tmp).await;
    let model = ScriptedModel::replying();
    let bot = assistant(&tmp, store, model.clone(), 3).await;

    bot.handle_turn("t1", "Hotel recommendations please")
        .await
        .unwrap();
    bot.handle_turn("t1", "What's the baggage allowance?")
        .await
        .unwrap();
    bot.handle_turn("t1", "I'm American, do I need a visa for India?")
        .await
        .unwrap();

    let requests = model.requests();
    let last = requests.last().unwrap();
    assert_eq!(last.history.len(), 3);
    assert!(last.history.iter().all(|m| m.role != Role::Tool));
    assert_eq!(
        last.history.last(),
        Some(&Message::human("I'm American, do I need a visa for India?"))
    );
}

#[tokio::test]
async fn unavailable_model_degrades_to_try_again() {
    let tmp = TempDir::new().unwrap();
    let store = visa_store(&tmp).await;
    let model = ScriptedModel::unavailable();
    let bot = assistant(&tmp, store, model.clone(), 10).await;

    let outcome = bot
        .handle_turn("t1", "I'm American, do I need a visa for India?")
        .await
        .unwrap();
    assert!(outcome.degraded);
    assert_eq!(outcome.reply, TRY_AGAIN_REPLY);
    assert_eq!(outcome.intent, Some(Intent::Visa));

    let history = bot.log().history("t1").await.unwrap();
    assert_eq!(history.last().unwrap().content, TRY_AGAIN_REPLY);
}

#[tokio::test]
async fn store_model_mismatch_aborts_the_turn() {
    let tmp = TempDir::new().unwrap();
    let built = visa_store(&tmp).await;
    built.close().await;

    let mismatched = open_existing(
        &tmp.path().join("store"),
        Arc::new(LetterEmbedder("other-model")),
    )
    .await
    .unwrap();
    let model = ScriptedModel::replying();
    let bot = assistant(&tmp, Arc::new(mismatched), model.clone(), 10).await;

    let err = bot
        .handle_turn("t1", "I'm American, do I need a visa for India?")
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::EmbeddingModelMismatch { .. })
    ));
    assert!(model.requests().is_empty());
}

#[tokio::test]
async fn blank_message_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let store = visa_store(&tmp).await;
    let bot = assistant(&tmp, store, ScriptedModel::replying(), 10).await;

    let err = bot.handle_turn("t1", "   ").await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::InvalidParameter { name: "message", .. })
    ));
    assert!(bot.log().history("t1").await.unwrap().is_empty());
}

#[tokio::test]
async fn incomplete_visa_question_asks_without_model_call() {
    let tmp = TempDir::new().unwrap();
    let store = visa_store(&tmp).await;
    let model = ScriptedModel::replying();
    let bot = assistant(&tmp, store, model.clone(), 10).await;

    let outcome = bot
        .handle_turn("t1", "Do I need a visa for India?")
        .await
        .unwrap();
    assert!(outcome.clarifying);
    assert_eq!(outcome.reply, clarifying_question(&SlotGap::Origin));
    assert!(outcome.facts.is_empty());
    assert!(model.requests().is_empty());
    assert_eq!(
        roles(&bot.log().history("t1").await.unwrap()),
        vec![Role::Human, Role::Assistant]
    );

    // The answer alone carries no visa keyword but completes the question
    let outcome = bot.handle_turn("t1", "I'm American").await.unwrap();
    assert_eq!(outcome.intent, Some(Intent::Visa));
    assert!(!outcome.clarifying);
    assert_eq!(outcome.slots.pair(), Some(("USA", "IND")));
    assert_eq!(outcome.facts[0].metadata.destination_iso, "IND");
    assert_eq!(model.requests().len(), 1);
}

#[tokio::test]
async fn follow_up_keeps_the_passport_country() {
    let tmp = TempDir::new().unwrap();
    let store = visa_store(&tmp).await;
    let model = ScriptedModel::replying();
    let bot = assistant(&tmp, store, model.clone(), 10).await;

    bot.handle_turn("t1", "I'm American, do I need a visa for India?")
        .await
        .unwrap();
    let outcome = bot.handle_turn("t1", "and to Canada?").await.unwrap();

    assert_eq!(outcome.intent, Some(Intent::Visa));
    assert_eq!(outcome.slots.pair(), Some(("USA", "CAN")));
    assert_eq!(outcome.facts[0].metadata.passport_iso, "USA");
    assert_eq!(outcome.facts[0].metadata.destination_iso, "CAN");
    assert!(model.requests()[1]
        .context
        .as_deref()
        .unwrap()
        .contains("Canada"));
}

#[tokio::test]
async fn model_tool_call_is_run_logged_and_fed_back() {
    let tmp = TempDir::new().unwrap();
    let store = visa_store(&tmp).await;
    let model = ScriptedModel::scripted(vec![search_call(
        "call_1",
        serde_json::json!({
            "query": "US citizens visiting Canada",
            "passport": "USA",
            "destination": "CAN"
        }),
    )]);
    let bot = assistant(&tmp, store, model.clone(), 10).await;

    let outcome = bot
        .handle_turn("t1", "Hotel recommendations please")
        .await
        .unwrap();
    assert_eq!(outcome.route, Some(Route::Respond));
    assert_eq!(outcome.reply, ANSWER);
    assert_eq!(outcome.facts[0].metadata.destination_iso, "CAN");

    let requests = model.requests();
    assert_eq!(requests.len(), 2);
    assert!(!requests[0].tools.is_empty());
    assert!(requests[0].exchanges.is_empty());
    assert_eq!(requests[1].exchanges.len(), 1);
    assert_eq!(requests[1].exchanges[0].call.id, "call_1");
    assert!(requests[1].exchanges[0].output.contains("Canada"));

    let history = bot.log().history("t1").await.unwrap();
    assert_eq!(
        roles(&history),
        vec![Role::Human, Role::Tool, Role::Assistant]
    );
    assert_eq!(history[1].name.as_deref(), Some(VISA_SEARCH_TOOL));
}

#[tokio::test]
async fn bad_tool_arguments_go_back_to_the_model() {
    let tmp = TempDir::new().unwrap();
    let store = visa_store(&tmp).await;
    let model = ScriptedModel::scripted(vec![search_call(
        "call_1",
        serde_json::json!({ "query": "visa", "passport": "ZZZ" }),
    )]);
    let bot = assistant(&tmp, store, model.clone(), 10).await;

    let outcome = bot
        .handle_turn("t1", "Hotel recommendations please")
        .await
        .unwrap();
    assert_eq!(outcome.reply, ANSWER);
    assert!(outcome.facts.is_empty());

    let requests = model.requests();
    assert_eq!(requests.len(), 2);
    let output = &requests[1].exchanges[0].output;
    assert!(output.starts_with("Error:"), "{output}");
    assert!(output.contains("passport"), "{output}");
}

#[tokio::test]
async fn tool_rounds_are_capped() {
    let tmp = TempDir::new().unwrap();
    let store = visa_store(&tmp).await;
    let looping: Vec<ChatReply> = (0..10)
        .map(|i| {
            let mut reply = search_call(&format!("call_{i}"), serde_json::json!({ "query": "visa" }));
            reply.content = "Still checking.".into();
            reply
        })
        .collect();
    let model = ScriptedModel::scripted(looping);
    let bot = assistant(&tmp, store, model.clone(), 10).await;

    let outcome = bot
        .handle_turn("t1", "Hotel recommendations please")
        .await
        .unwrap();
    assert_eq!(outcome.reply, "Still checking.");

    let requests = model.requests();
    assert_eq!(requests.len(), visa_assist::chat::MAX_TOOL_ROUNDS + 1);
    assert!(requests.last().unwrap().tools.is_empty());
    assert_eq!(
        requests.last().unwrap().exchanges.len(),
        visa_assist::chat::MAX_TOOL_ROUNDS
    );
}
