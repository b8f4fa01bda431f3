//! Component wiring shared by the binaries

use crate::api::ApiState;
use crate::classifier::TransactionClassifier;
use crate::config::AppConfig;
use crate::conversational::ConversationOrchestrator;
use crate::graph::{GraphPersistence, GraphStore, MemoryGraph, Neo4jGraph};
use crate::ingest::IngestionPipeline;
use crate::llm::{GeminiClient, GenerativeModel};
use crate::memory::{connect_store, ConversationStore};
use crate::statement::StatementParser;
use crate::translator::QueryTranslator;
use crate::Result;
use std::sync::Arc;
use tracing::{info, warn};

pub struct Services {
    pub config: AppConfig,
    pub model: Arc<dyn GenerativeModel>,
    pub graph: Arc<dyn GraphStore>,
    pub store: Arc<dyn ConversationStore>,
}

impl Services {
    /// Connects to Neo4j when configured. A configured graph that cannot be
    /// reached is an error, not a silent fallback.
    pub async fn from_config(config: AppConfig) -> Result<Self> {
        if config.gemini_api_key.is_empty() {
            warn!("GEMINI_API_KEY not set, model calls will fail");
        }

        let model: Arc<dyn GenerativeModel> = Arc::new(GeminiClient::new(
            config.gemini_api_key.clone(),
            config.gemini_base_url.clone(),
            config.gemini_model.clone(),
        )?);

        let graph: Arc<dyn GraphStore> = match &config.neo4j {
            Some(neo4j) => {
                Arc::new(Neo4jGraph::connect(&neo4j.uri, &neo4j.username, &neo4j.password).await?)
            }
            None => {
                info!("NEO4J_URI not set, using in-memory graph");
                Arc::new(MemoryGraph::new())
            }
        };

        let store = connect_store(config.database_url.as_deref());

        Ok(Self {
            config,
            model,
            graph,
            store,
        })
    }

    pub fn ingestion(&self) -> IngestionPipeline {
        let classifier = TransactionClassifier::with_context(
            self.model.clone(),
            self.config.classify_interval,
            self.config.classifier_context.as_deref(),
        );

        IngestionPipeline::new(
            StatementParser::new(self.config.currency_symbol.clone()),
            Arc::new(classifier),
            GraphPersistence::new(self.graph.clone()),
        )
    }

    pub fn orchestrator(&self) -> ConversationOrchestrator {
        let translator =
            QueryTranslator::new(self.model.clone(), self.config.translator_include_date);

        ConversationOrchestrator::new(
            self.model.clone(),
            Arc::new(translator),
            self.graph.clone(),
            self.store.clone(),
        )
    }

    pub fn api_state(&self) -> ApiState {
        ApiState {
            orchestrator: Arc::new(self.orchestrator()),
            ingestion: Arc::new(self.ingestion()),
        }
    }
}
