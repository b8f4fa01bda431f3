//! Error types for the statement graph assistant

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for assistant operations
pub type Result<T> = std::result::Result<T, AssistantError>;

#[derive(Error, Debug)]
pub enum AssistantError {

    // =============================
    // Ingestion Errors
    // =============================

    #[error("Classification error: {0}")]
    ClassificationError(String),

    #[error("Persistence error: {0}")]
    PersistenceError(String),

    // =============================
    // Conversation Turn Errors
    // =============================

    #[error("Translation error: {0}")]
    TranslationError(String),

    #[error("Query execution error: {0}")]
    QueryExecutionError(String),

    #[error("Stream error: {0}")]
    StreamError(String),

    #[error("Conversation not found: {0}")]
    ConversationNotFound(Uuid),

    #[error("Client disconnected before the answer was fully delivered")]
    ClientDisconnected,

    // =============================
    // Collaborator Errors
    // =============================

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Graph error: {0}")]
    GraphError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),
}
