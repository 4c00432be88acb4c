//! # Visa Assist Core
//!
//! Shared, I/O-free logic for Visa Assist: visa-rule models and
//! normalization, the vector-store and conversation-log traits with
//! in-memory implementations, the index build algorithm, MMR retrieval,
//! the intent router, and country extraction with per-thread trip slots.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem code. The
//! `visa-assist` application crate supplies the SQLite stores and the
//! networked embedding and chat collaborators.

pub mod countries;
pub mod embedding;
pub mod entities;
pub mod error;
pub mod index;
pub mod mmr;
pub mod models;
pub mod normalize;
pub mod retrieval;
pub mod router;
pub mod session;
pub mod slots;
pub mod store;

pub use error::Error;
