//! Core data models used throughout Visa Assist.
//!
//! These types represent the dataset rows, normalized visa rules, indexed
//! documents, and conversation messages that flow through the pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Dataset version tag recorded in every document's metadata by default.
pub const DEFAULT_SOURCE_TAG: &str = "passport-index-2025";

/// One raw row of the passport-index dataset, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawVisaRow {
    #[serde(rename = "Passport")]
    pub passport: String,
    #[serde(rename = "Destination")]
    pub destination: String,
    #[serde(rename = "Requirement")]
    pub requirement: String,
}

impl RawVisaRow {
    pub fn new(
        passport: impl Into<String>,
        destination: impl Into<String>,
        requirement: impl Into<String>,
    ) -> Self {
        Self {
            passport: passport.into(),
            destination: destination.into(),
            requirement: requirement.into(),
        }
    }
}

/// Parsed form of a requirement token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Requirement {
    VisaFreeDays(u32),
    VisaFree,
    VisaOnArrival,
    Eta,
    EVisa,
    VisaRequired,
    NoAdmission,
}

impl Requirement {
    /// Human-readable rendering used inside document content.
    pub fn render(&self) -> String {
        match self {
            Requirement::VisaFreeDays(days) => format!("visa-free travel for up to {} days", days),
            Requirement::VisaFree => "visa-free travel (no time limit specified)".to_string(),
            Requirement::VisaOnArrival => "visa on arrival".to_string(),
            Requirement::Eta => "Electronic Travel Authorization (ETA) required".to_string(),
            Requirement::EVisa => "e-visa required".to_string(),
            Requirement::VisaRequired => {
                "visa required (must be obtained before travel)".to_string()
            }
            Requirement::NoAdmission => "no admission allowed".to_string(),
        }
    }
}

/// A validated, immutable row-level visa fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VisaRule {
    pub passport_code: String,
    pub passport_name: String,
    pub destination_code: String,
    pub destination_name: String,
    pub requirement_raw: String,
    pub requirement_text: String,
}

impl VisaRule {
    /// Identity of the document built from this rule.
    pub fn key(&self) -> DocumentKey {
        DocumentKey {
            passport_iso: self.passport_code.clone(),
            destination_iso: self.destination_code.clone(),
        }
    }

    /// Render the fixed natural-language sentence for this rule.
    pub fn content(&self) -> String {
        format!(
            "Citizens of {} (passport code: {}) can travel to {} (destination code: {}) with {}.",
            self.passport_name,
            self.passport_code,
            self.destination_name,
            self.destination_code,
            self.requirement_text
        )
    }

    /// Build the retrieval document (without embedding) for this rule.
    pub fn to_document(&self, source: &str) -> Document {
        Document {
            content: self.content(),
            metadata: DocumentMetadata {
                passport_iso: self.passport_code.clone(),
                passport_name: self.passport_name.clone(),
                destination_iso: self.destination_code.clone(),
                destination_name: self.destination_name.clone(),
                requirement: self.requirement_raw.clone(),
                source: source.to_string(),
            },
        }
    }
}

/// `(passport_iso, destination_iso)`: unique identity of a document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentKey {
    pub passport_iso: String,
    pub destination_iso: String,
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.passport_iso, self.destination_iso)
    }
}

/// Metadata stored next to every document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub passport_iso: String,
    pub passport_name: String,
    pub destination_iso: String,
    pub destination_name: String,
    pub requirement: String,
    pub source: String,
}

impl DocumentMetadata {
    pub fn key(&self) -> DocumentKey {
        DocumentKey {
            passport_iso: self.passport_iso.clone(),
            destination_iso: self.destination_iso.clone(),
        }
    }
}

/// The retrieval unit: rendered sentence plus metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    pub metadata: DocumentMetadata,
}

/// A document together with its embedding vector, as persisted.
#[derive(Debug, Clone)]
pub struct EmbeddedDocument {
    pub document: Document,
    pub embedding: Vec<f32>,
}

/// Role tag of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Human,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Human => "human",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "human" => Some(Role::Human),
            "assistant" => Some(Role::Assistant),
            "tool" => Some(Role::Tool),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry in a conversation thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Tool name for `tool` messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: Role::Human,
            content: content.into(),
            name: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            name: None,
        }
    }

    pub fn tool(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            name: Some(name.into()),
        }
    }
}
