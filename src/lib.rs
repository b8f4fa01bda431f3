//! Statement Graph Assistant
//!
//! Turns bank-statement exports into a personal-finance knowledge graph and
//! answers questions about it:
//! - Parses tab-delimited statement lines into draft transactions
//! - Classifies each transaction into a fixed category vocabulary via Gemini
//! - Stores transactions and categories in Neo4j
//! - Translates questions into Cypher and streams grounded answers
//! - Keeps per-conversation history in Postgres
//!
//! INGEST:  PARSE → CLASSIFY → PERSIST
//! CHAT:    LOAD HISTORY → TRANSLATE → QUERY → GENERATE → STREAM → PERSIST

pub mod api;
pub mod app;
pub mod classifier;
pub mod config;
pub mod conversational;
pub mod error;
pub mod graph;
pub mod ingest;
pub mod llm;
pub mod memory;
pub mod models;
pub mod statement;
pub mod translator;

#[cfg(test)]
pub(crate) mod testing;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use classifier::TransactionClassifier;
pub use conversational::{ConversationOrchestrator, TurnOutcome};
pub use ingest::{IngestReport, IngestionPipeline};
