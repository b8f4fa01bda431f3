//! Environment configuration

use crate::classifier::DEFAULT_CLASSIFY_INTERVAL;
use crate::error::AssistantError;
use crate::llm::gemini::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::statement::DEFAULT_CURRENCY_SYMBOL;
use crate::Result;
use std::env;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Neo4jConfig {
    pub uri: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_base_url: String,
    /// `None` selects the in-memory graph
    pub neo4j: Option<Neo4jConfig>,
    /// `None` selects the in-memory conversation store
    pub database_url: Option<String>,
    pub port: u16,
    pub classify_interval: Duration,
    pub currency_symbol: String,
    pub translator_include_date: bool,
    pub classifier_context: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let neo4j = match get("NEO4J_URI") {
            Some(uri) => Some(Neo4jConfig {
                uri,
                username: get("NEO4J_USERNAME").unwrap_or_else(|| "neo4j".to_string()),
                password: get("NEO4J_PASSWORD").unwrap_or_default(),
            }),
            None => None,
        };

        let port = match get("PORT").or_else(|| get("API_PORT")) {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|e| {
                    AssistantError::ConfigError(format!("invalid port '{}': {}", raw, e))
                })?,
            None => DEFAULT_PORT,
        };

        let classify_interval = match get("CLASSIFY_INTERVAL_MS") {
            Some(raw) => raw.trim().parse::<u64>().map(Duration::from_millis).map_err(|e| {
                let message = format!("invalid CLASSIFY_INTERVAL_MS '{}': {}", raw, e);
                AssistantError::ConfigError(message)
            })?,
            None => DEFAULT_CLASSIFY_INTERVAL,
        };

        let translator_include_date = match get("TRANSLATOR_INCLUDE_DATE") {
            Some(raw) => parse_bool(&raw).ok_or_else(|| {
                AssistantError::ConfigError(format!("invalid TRANSLATOR_INCLUDE_DATE '{}'", raw))
            })?,
            None => true,
        };

        Ok(Self {
            gemini_api_key: get("GEMINI_API_KEY").unwrap_or_default(),
            gemini_model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            gemini_base_url: get("GEMINI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            neo4j,
            database_url: get("POSTGRES_URL").or_else(|| get("DATABASE_URL")),
            port,
            classify_interval,
            currency_symbol: get("CURRENCY_SYMBOL")
                .unwrap_or_else(|| DEFAULT_CURRENCY_SYMBOL.to_string()),
            translator_include_date,
            classifier_context: get("CLASSIFIER_CONTEXT"),
        })
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
