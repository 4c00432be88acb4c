//! Named tools callable by the chat pipeline and the CLI.
//!
//! A [`Tool`] has a name, a natural-language description, a JSON-schema
//! parameter block, and an async `execute`. Tools are collected in a
//! [`ToolRegistry`] and invoked by name (`visa tools call <name>`).
//!
//! ```text
//! ┌────────────────────────────────────┐
//! │            ToolRegistry            │
//! │  ┌──────────────────────────────┐  │
//! │  │  visa_requirements_search    │  │
//! │  └──────────────────────────────┘  │
//! └───────────────┬────────────────────┘
//!                 ▼
//!        ToolContext → DocumentStore::search
//! ```
//!
//! The search tool performs no LLM calls; it is a thin adapter over the
//! retrieval pipeline. Given a `passport` and `destination` it also does an
//! exact lookup of that pair and puts the hit first.
//!
//! [`ToolRegistry::specs`] describes every tool to the chat model, which may
//! then request calls on its own.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use visa_assist_core::countries::country_code;
use visa_assist_core::models::Document;
use visa_assist_core::retrieval::{SearchHit, SearchParams};
use visa_assist_core::Error;

use crate::index::DocumentStore;

/// Name of the visa search tool.
pub const VISA_SEARCH_TOOL: &str = "visa_requirements_search";

// ═══════════════════════════════════════════════════════════════════════
// Tool Trait
// ═══════════════════════════════════════════════════════════════════════

/// A callable tool.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Lowercase identifier with underscores (e.g. `"visa_requirements_search"`).
    fn name(&self) -> &str;

    /// Description used to decide when to call the tool.
    fn description(&self) -> &str;

    /// JSON Schema for the parameters: `type: "object"` with `properties`.
    fn parameters_schema(&self) -> Value;

    /// Execute with a JSON object of parameters.
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value>;
}

// ═══════════════════════════════════════════════════════════════════════
// ToolContext
// ═══════════════════════════════════════════════════════════════════════

/// What tools can reach during execution.
pub struct ToolContext {
    store: Arc<DocumentStore>,
    defaults: SearchParams,
}

impl ToolContext {
    pub fn new(store: Arc<DocumentStore>, defaults: SearchParams) -> Self {
        Self { store, defaults }
    }

    pub fn defaults(&self) -> &SearchParams {
        &self.defaults
    }

    pub async fn search(&self, query: &str, params: &SearchParams) -> Result<Vec<SearchHit>> {
        self.store.search(query, params).await
    }

    pub async fn lookup(&self, passport: &str, destination: &str) -> Result<Option<Document>> {
        self.store.lookup(passport, destination).await
    }
}

/// A tool as advertised to the chat model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

// ═══════════════════════════════════════════════════════════════════════
// Visa search
// ═══════════════════════════════════════════════════════════════════════

/// Retrieval over the visa document store.
pub struct VisaSearchTool;

impl VisaSearchTool {
    /// Read `k`, `fetch_k`, `diversity_lambda` from `params`, falling back to `defaults`.
    fn params(params: &Value, defaults: &SearchParams) -> Result<SearchParams> {
        let read_usize = |name: &'static str, default: usize| -> Result<usize> {
            match params.get(name) {
                None | Some(Value::Null) => Ok(default),
                Some(v) => v
                    .as_u64()
                    .map(|n| n as usize)
                    .ok_or_else(|| {
                        Error::InvalidParameter {
                            name,
                            reason: format!("expected a non-negative integer, got {}", v),
                        }
                        .into()
                    }),
            }
        };

        let lambda = match params.get("diversity_lambda") {
            None | Some(Value::Null) => defaults.diversity_lambda,
            Some(v) => v.as_f64().ok_or_else(|| Error::InvalidParameter {
                name: "diversity_lambda",
                reason: format!("expected a number, got {}", v),
            })?,
        };

        Ok(SearchParams {
            k: read_usize("k", defaults.k)?,
            fetch_k: read_usize("fetch_k", defaults.fetch_k)?,
            diversity_lambda: lambda,
        })
    }

    /// Optional ISO-3 code under `name`.
    fn country(params: &Value, name: &'static str) -> Result<Option<&'static str>> {
        match params.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => v
                .as_str()
                .and_then(country_code)
                .map(Some)
                .ok_or_else(|| {
                    Error::InvalidParameter {
                        name,
                        reason: format!("expected an ISO-3 country code, got {}", v),
                    }
                    .into()
                }),
        }
    }
}

/// Put the exact match first, drop its duplicate, keep `k`.
fn with_exact(exact: Option<Document>, mut hits: Vec<SearchHit>, k: usize) -> Vec<SearchHit> {
    if let Some(doc) = exact {
        let key = doc.metadata.key();
        hits.retain(|h| h.metadata.key() != key);
        hits.insert(
            0,
            SearchHit {
                content: doc.content,
                metadata: doc.metadata,
                score: 1.0,
            },
        );
    }
    hits.truncate(k);
    hits
}

#[async_trait]
impl Tool for VisaSearchTool {
    fn name(&self) -> &str {
        VISA_SEARCH_TOOL
    }

    fn description(&self) -> &str {
        "Search for visa requirements and travel information. \
         Use this tool to find specific visa rules for travel between countries. \
         The tool searches a comprehensive database of visa requirements for 199 countries. \
         Input should be a question about visa requirements, such as: \
         'What visa do I need from USA to India?' or \
         'Can UK citizens travel visa-free to France?'. \
         When the passport country and destination are known, pass their \
         ISO-3 codes as passport and destination to get the exact rule first."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Question about visa requirements" },
                "passport": { "type": "string", "description": "ISO-3 code of the passport country, e.g. USA" },
                "destination": { "type": "string", "description": "ISO-3 code of the destination, e.g. IND" },
                "k": { "type": "integer", "description": "Results to return", "default": 5, "minimum": 1 },
                "fetch_k": { "type": "integer", "description": "Candidates considered before re-ranking", "default": 20 },
                "diversity_lambda": {
                    "type": "number",
                    "description": "1.0 = pure relevance, 0.0 = pure diversity",
                    "default": 0.7, "minimum": 0.0, "maximum": 1.0
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let query = params["query"].as_str().unwrap_or("");
        if query.trim().is_empty() {
            return Err(Error::InvalidParameter {
                name: "query",
                reason: "must not be empty".to_string(),
            }
            .into());
        }

        let search_params = Self::params(&params, ctx.defaults())?;
        let passport = Self::country(&params, "passport")?;
        let destination = Self::country(&params, "destination")?;

        let hits = ctx.search(query, &search_params).await?;
        let exact = match (passport, destination) {
            (Some(p), Some(d)) => ctx.lookup(p, d).await?,
            _ => None,
        };
        let hits = with_exact(exact, hits, search_params.k);
        let context = render_context(&hits);

        Ok(serde_json::json!({ "results": hits, "context": context }))
    }
}

/// Join hit contents into the text block handed to the generator.
pub fn render_context(hits: &[SearchHit]) -> String {
    hits.iter()
        .map(|h| h.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

/// Registry of callable tools.
///
/// ```rust
/// use visa_assist::tools::{ToolRegistry, VISA_SEARCH_TOOL};
///
/// let tools = ToolRegistry::with_builtins();
/// assert!(tools.find(VISA_SEARCH_TOOL).is_some());
/// ```
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty tool registry.
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Create a registry holding the visa search tool.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(VisaSearchTool));
        registry
    }

    /// Register a tool.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    /// Get all registered tools.
    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    /// Find a tool by name.
    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    /// Describe every tool for the chat model.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools
            .iter()
            .map(|t| ToolSpec {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }

    /// Find and execute `name`.
    pub async fn call(&self, name: &str, params: Value, ctx: &ToolContext) -> Result<Value> {
        let tool = self.find(name).ok_or_else(|| Error::InvalidParameter {
            name: "tool",
            reason: format!("unknown tool {:?}", name),
        })?;
        tool.execute(params, ctx).await
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_fall_back_to_defaults() {
        let defaults = SearchParams::default();
        let p = VisaSearchTool::params(&serde_json::json!({ "query": "x" }), &defaults).unwrap();
        assert_eq!(p, defaults);

        let p = VisaSearchTool::params(
            &serde_json::json!({ "query": "x", "k": 2, "diversity_lambda": 1.0 }),
            &defaults,
        )
        .unwrap();
        assert_eq!(p.k, 2);
        assert_eq!(p.fetch_k, 20);
        assert_eq!(p.diversity_lambda, 1.0);
    }

    #[test]
    fn params_reject_wrong_types() {
        let defaults = SearchParams::default();
        let err = VisaSearchTool::params(&serde_json::json!({ "k": "five" }), &defaults).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::InvalidParameter { name: "k", .. })
        ));
        assert!(VisaSearchTool::params(&serde_json::json!({ "k": -1 }), &defaults).is_err());
    }

    #[test]
    fn schema_requires_query() {
        let schema = VisaSearchTool.parameters_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], serde_json::json!(["query"]));
    }

    #[test]
    fn country_params_are_validated() {
        let p = serde_json::json!({ "passport": "usa", "destination": "ZZZ" });
        assert_eq!(VisaSearchTool::country(&p, "passport").unwrap(), Some("USA"));
        assert_eq!(VisaSearchTool::country(&p, "missing").unwrap(), None);
        let err = VisaSearchTool::country(&p, "destination").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::InvalidParameter { name: "destination", .. })
        ));
    }

    fn hit(p: &str, d: &str, score: f64) -> SearchHit {
        let doc = visa_assist_core::models::VisaRule {
            passport_code: p.into(),
            passport_name: p.into(),
            destination_code: d.into(),
            destination_name: d.into(),
            requirement_raw: "eta".into(),
            requirement_text: "eta".into(),
        }
        .to_document("test");
        SearchHit {
            content: doc.content,
            metadata: doc.metadata,
            score,
        }
    }

    #[test]
    fn exact_match_leads_without_duplicates() {
        let exact = hit("USA", "JPN", 0.1);
        let exact_doc = Document {
            content: exact.content.clone(),
            metadata: exact.metadata.clone(),
        };
        let hits = vec![hit("USA", "CAN", 0.9), exact, hit("GBR", "JPN", 0.5)];

        let merged = with_exact(Some(exact_doc), hits.clone(), 2);
        let dests: Vec<_> = merged
            .iter()
            .map(|h| (h.metadata.passport_iso.as_str(), h.metadata.destination_iso.as_str()))
            .collect();
        assert_eq!(dests, vec![("USA", "JPN"), ("USA", "CAN")]);
        assert_eq!(merged[0].score, 1.0);

        assert_eq!(with_exact(None, hits, 2).len(), 2);
    }

    #[test]
    fn specs_describe_every_tool() {
        let specs = ToolRegistry::with_builtins().specs();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, VISA_SEARCH_TOOL);
        assert!(specs[0].parameters["properties"]["passport"].is_object());
    }

    #[test]
    fn registry_lookup() {
        let tools = ToolRegistry::with_builtins();
        assert_eq!(tools.len(), 1);
        assert!(tools.find("visa_requirements_search").is_some());
        assert!(tools.find("search").is_none());
    }
}
