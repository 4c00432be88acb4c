//! Handlers behind the `visa` subcommands.
//!
//! Each `run_*` function loads what it needs from the [`Config`], does its
//! work, and prints results on stdout. Logs and progress go to stderr.

use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use visa_assist_core::index::{BuildOptions, BuildProgressReporter};
use visa_assist_core::retrieval::SearchParams;
use visa_assist_core::session::ConversationLog;

use crate::chat::Assistant;
use crate::config::Config;
use crate::dataset::load_rules;
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::index::{build_or_load, open_existing, DocumentStore};
use crate::intent::create_classifier;
use crate::llm::{create_chat_model, ChatModel};
use crate::progress::ProgressMode;
use crate::sqlite_session::SqliteConversationLog;
use crate::templates::{is_exit_command, GOODBYE, WELCOME};
use crate::tools::{ToolContext, ToolRegistry, VISA_SEARCH_TOOL};

/// Thread used when `--thread` is not given.
pub const DEFAULT_THREAD: &str = "default";

fn provider(cfg: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    Ok(Arc::from(create_provider(&cfg.embedding)?))
}

/// Normalize the dataset and reuse or build the store.
async fn load_or_build(
    cfg: &Config,
    force: bool,
    batch_size: Option<usize>,
    progress: &dyn BuildProgressReporter,
) -> Result<DocumentStore> {
    let outcome = load_rules(&cfg.dataset)?;
    for rejection in &outcome.rejected {
        eprintln!(
            "rejected row {}: {},{},{}  ({})",
            rejection.row,
            rejection.raw.passport,
            rejection.raw.destination,
            rejection.raw.requirement,
            rejection.error
        );
    }

    let options = BuildOptions {
        source: cfg.dataset.source_tag.clone(),
        batch_size: batch_size.unwrap_or(cfg.embedding.batch_size),
    };
    build_or_load(
        &outcome.rules,
        &cfg.store.path,
        force,
        provider(cfg)?,
        &options,
        progress,
    )
    .await
}

/// Open the built store for querying. Never builds.
async fn open_store(cfg: &Config) -> Result<DocumentStore> {
    open_existing(&cfg.store.path, provider(cfg)?)
        .await
        .with_context(|| {
            format!(
                "No usable store at {}; run `visa build` first",
                cfg.store.path.display()
            )
        })
}

/// `visa build`
pub async fn run_build(
    cfg: &Config,
    force: bool,
    batch_size: Option<usize>,
    progress: ProgressMode,
) -> Result<()> {
    let reporter = progress.reporter();
    let store = load_or_build(cfg, force, batch_size, reporter.as_ref()).await?;
    let count = store.count().await?;
    let manifest = store.manifest();

    if store.reused() {
        println!(
            "Reused existing store at {} ({} documents).",
            cfg.store.path.display(),
            count
        );
    } else {
        println!(
            "Built store at {} ({} documents).",
            cfg.store.path.display(),
            count
        );
    }
    println!("  model:   {}", manifest.embedding_model);
    println!("  dims:    {}", manifest.embedding_dims);
    println!("  source:  {}", manifest.source);
    if let Some(hash) = &manifest.dataset_hash {
        println!("  dataset: {}", hash);
    }

    store.close().await;
    Ok(())
}

/// `visa search`
pub async fn run_search(
    cfg: &Config,
    query: &str,
    params: SearchParams,
    json: bool,
) -> Result<()> {
    let store = Arc::new(open_store(cfg).await?);
    let ctx = ToolContext::new(store.clone(), cfg.retrieval.params());
    let result = ToolRegistry::with_builtins()
        .call(
            VISA_SEARCH_TOOL,
            serde_json::json!({
                "query": query,
                "k": params.k,
                "fetch_k": params.fetch_k,
                "diversity_lambda": params.diversity_lambda,
            }),
            &ctx,
        )
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result["results"])?);
    } else {
        let hits = result["results"].as_array().cloned().unwrap_or_default();
        if hits.is_empty() {
            println!("No results.");
        }
        for (i, hit) in hits.iter().enumerate() {
            println!(
                "{}. [{:.3}] {} -> {}",
                i + 1,
                hit["score"].as_f64().unwrap_or_default(),
                hit["metadata"]["passport_iso"].as_str().unwrap_or("?"),
                hit["metadata"]["destination_iso"].as_str().unwrap_or("?"),
            );
            println!("   {}", hit["content"].as_str().unwrap_or_default());
        }
    }

    store.close().await;
    Ok(())
}

/// Wire an [`Assistant`] from configuration.
async fn assistant(cfg: &Config) -> Result<(Assistant, Arc<DocumentStore>)> {
    let store = Arc::new(open_store(cfg).await?);
    let log: Arc<dyn ConversationLog> =
        Arc::new(SqliteConversationLog::open(&cfg.conversation.path).await?);
    let model: Arc<dyn ChatModel> = Arc::from(create_chat_model(&cfg.llm)?);
    let classifier = create_classifier(&cfg.intent, model.clone())?;

    let assistant = Assistant::new(
        log,
        classifier,
        model,
        ToolRegistry::with_builtins(),
        ToolContext::new(store.clone(), cfg.retrieval.params()),
        cfg.conversation.max_history_messages,
    );
    Ok((assistant, store))
}

/// `visa ask`
pub async fn run_ask(cfg: &Config, thread: &str, message: &str) -> Result<()> {
    let (assistant, store) = assistant(cfg).await?;
    let outcome = assistant.handle_turn(thread, message).await?;
    println!("{}", outcome.reply);
    store.close().await;
    Ok(())
}

/// `visa chat`: read lines from stdin until an exit command or EOF.
pub async fn run_chat(cfg: &Config, thread: &str) -> Result<()> {
    let (assistant, store) = assistant(cfg).await?;
    println!("{}", WELCOME);

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if is_exit_command(line) {
            break;
        }

        match assistant.handle_turn(thread, line).await {
            Ok(outcome) => println!("{}", outcome.reply),
            Err(e) => {
                store.close().await;
                return Err(e);
            }
        }
    }

    println!("{}", GOODBYE);
    store.close().await;
    Ok(())
}

/// `visa history`
pub async fn run_history(cfg: &Config, thread: &str) -> Result<()> {
    let log = SqliteConversationLog::open(&cfg.conversation.path).await?;
    let messages = log.history(thread).await?;
    if messages.is_empty() {
        println!("No messages in thread '{}'.", thread);
    }
    for m in &messages {
        match &m.name {
            Some(name) => println!("[{}:{}] {}", m.role.as_str(), name, m.content),
            None => println!("[{}] {}", m.role.as_str(), m.content),
        }
    }
    log.close().await;
    Ok(())
}

/// `visa threads`
pub async fn run_threads(cfg: &Config) -> Result<()> {
    let log = SqliteConversationLog::open(&cfg.conversation.path).await?;
    for id in log.threads().await? {
        println!("{}", id);
    }
    log.close().await;
    Ok(())
}

/// `visa tools list`
pub fn run_tools_list() -> Result<()> {
    let registry = ToolRegistry::with_builtins();
    for tool in registry.tools() {
        println!("{}", tool.name());
        println!("  {}", tool.description());
        println!(
            "  parameters: {}",
            serde_json::to_string(&tool.parameters_schema())?
        );
    }
    Ok(())
}

/// Interpret a `--param` value: JSON literal if it parses, string otherwise.
pub fn param_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// `visa tools call`
pub async fn run_tools_call(cfg: &Config, name: &str, params: Vec<(String, String)>) -> Result<()> {
    let registry = ToolRegistry::with_builtins();
    if registry.find(name).is_none() {
        anyhow::bail!("Unknown tool: {}", name);
    }

    let args: serde_json::Map<String, Value> = params
        .into_iter()
        .map(|(k, v)| (k, param_value(&v)))
        .collect();

    let store = Arc::new(open_store(cfg).await?);
    let ctx = ToolContext::new(store.clone(), cfg.retrieval.params());
    let result = registry
        .call(name, Value::Object(args), &ctx)
        .await
        .with_context(|| format!("Tool '{}' failed", name))?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    store.close().await;
    Ok(())
}
