//! Quarry ingests a website into a deduplicated, checkpointed text corpus
//! and answers natural-language queries by retrieving the most relevant
//! passages and forwarding a context-augmented prompt to a generation
//! backend.
//!
//! The crate splits into two halves that share a SQLite database:
//! - [`crawler`]: frontier-driven incremental crawl with crash-safe
//!   checkpointing (the `quarry-crawl` binary).
//! - [`corpus`] + [`chat`]: corpus index, dense retriever, and the query
//!   orchestrator behind the HTTP API (the `quarry-server` binary).

pub mod chat;
pub mod core;
pub mod corpus;
pub mod crawler;
pub mod llm;
pub mod server;
