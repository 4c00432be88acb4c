//! # Visa Assist
//!
//! A travel-agency chat assistant grounded in a passport-index dataset.
//!
//! Visa Assist normalizes a CSV of `(passport, destination, requirement)`
//! rows into natural-language documents, embeds them into an on-disk
//! vector store, and answers visa questions by retrieving a diverse set
//! of matching rules and handing them to a chat model. Conversations are
//! persisted per thread in SQLite.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Passport CSV│──▶│  Normalize    │──▶│ vectors.sqlite│
//! │  (dataset)  │   │ Render+Embed │   │  (manifest)  │
//! └─────────────┘   └──────────────┘   └──────┬───────┘
//!                                             │ search (MMR)
//!  user ──▶ classify ──▶ route ──▶ retrieve ──┘
//!                          │          │
//!                          ▼          ▼
//!                     canned reply  generate ──▶ conversations.sqlite
//! ```
//!
//! The pure logic (normalization, retrieval, routing, store and log
//! traits) lives in the `visa-assist-core` crate; this crate supplies the
//! SQLite, HTTP and CLI layers.
//!
//! ## Quick Start
//!
//! ```bash
//! visa build                            # normalize + embed the dataset
//! visa search "USA to India visa"       # retrieval only
//! visa ask "Do I need a visa for India?" --thread t1
//! visa chat                             # interactive session
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`dataset`] | Passport-index CSV loading |
//! | [`embedding`] | Embedding provider implementations |
//! | [`index`] | Build-or-load of the document store |
//! | [`sqlite_store`] | SQLite vector store |
//! | [`sqlite_session`] | SQLite conversation log |
//! | [`tools`] | Tool trait, registry, visa search tool |
//! | [`llm`] | Chat model abstraction |
//! | [`intent`] | Intent classifiers |
//! | [`chat`] | Turn orchestration |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chat;
pub mod commands;
pub mod config;
pub mod dataset;
pub mod db;
pub mod embedding;
pub mod http;
pub mod index;
pub mod intent;
pub mod llm;
pub mod migrate;
pub mod progress;
pub mod sqlite_session;
pub mod sqlite_store;
pub mod templates;
pub mod tools;
