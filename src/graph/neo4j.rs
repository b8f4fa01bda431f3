//! Neo4j-backed graph store

use super::GraphStore;
use crate::error::AssistantError;
use crate::models::{CategoryNode, GraphNode, TransactionNode};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use neo4rs::{query, Graph, Node};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

const RECORD_TRANSACTION: &str = "
    MERGE (c:Category {name: $category})
    CREATE (t:Transaction {
        dateTime: datetime($dateTime),
        amount: $amount,
        type: $type,
        party: $party,
        description: $description,
        balance: $balance
    })
    CREATE (t)-[:BELONGS_TO]->(c)
    RETURN t";

pub struct Neo4jGraph {
    graph: Arc<Graph>,
}

impl Neo4jGraph {
    pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Self> {
        let graph = Graph::new(uri, user, password)
            .await
            .map_err(|e| AssistantError::GraphError(format!("Failed to connect to Neo4j: {}", e)))?;

        info!(%uri, "Connected to Neo4j");

        Ok(Self {
            graph: Arc::new(graph),
        })
    }
}

#[async_trait]
impl GraphStore for Neo4jGraph {
    async fn record_transaction(
        &self,
        category: &str,
        transaction: &TransactionNode,
    ) -> Result<()> {
        let q = query(RECORD_TRANSACTION)
            .param("category", category)
            .param("dateTime", transaction.date_time.to_rfc3339())
            .param("amount", transaction.amount)
            .param("type", transaction.direction.as_str())
            .param("party", transaction.party.as_str())
            .param("description", transaction.description.as_str())
            .param("balance", transaction.balance);

        let mut txn = self
            .graph
            .start_txn()
            .await
            .map_err(|e| AssistantError::GraphError(format!("Failed to open transaction: {}", e)))?;

        match txn.run(q).await {
            Ok(()) => txn
                .commit()
                .await
                .map_err(|e| AssistantError::GraphError(format!("Failed to commit: {}", e))),
            Err(e) => {
                if let Err(rollback) = txn.rollback().await {
                    warn!("Rollback after failed write also failed: {}", rollback);
                }
                Err(AssistantError::GraphError(format!(
                    "Failed to record transaction: {}",
                    e
                )))
            }
        }
    }

    async fn execute_query(&self, cypher: &str) -> Result<Vec<GraphNode>> {
        let mut rows = self.graph.execute(query(cypher)).await.map_err(|e| {
            AssistantError::QueryExecutionError(format!("CYPHER: {}. Error: {}", cypher, e))
        })?;

        let mut nodes = Vec::new();
        loop {
            let row = rows.next().await.map_err(|e| {
                AssistantError::QueryExecutionError(format!("Failed to read result row: {}", e))
            })?;
            let Some(row) = row else { break };

            let columns: HashMap<String, Node> = match row.to() {
                Ok(columns) => columns,
                Err(e) => {
                    warn!("Skipping result row without node columns: {}", e);
                    continue;
                }
            };

            for node in columns.values() {
                match node_to_graph_node(node) {
                    Some(mapped) => nodes.push(mapped),
                    None => warn!(labels = ?node.labels(), "Skipping unrecognised graph node"),
                }
            }
        }

        Ok(nodes)
    }
}

fn node_to_graph_node(node: &Node) -> Option<GraphNode> {
    let labels = node.labels();

    if labels.iter().any(|l| *l == "Transaction") {
        return node_to_transaction(node).map(GraphNode::Transaction);
    }

    if labels.iter().any(|l| *l == "Category") {
        let name: String = node.get("name").ok()?;
        return Some(GraphNode::Category(CategoryNode { name }));
    }

    None
}

fn node_to_transaction(node: &Node) -> Option<TransactionNode> {
    let date_time = node
        .get::<DateTime<FixedOffset>>("dateTime")
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            node.get::<NaiveDateTime>("dateTime")
                .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
        })
        .ok()?;

    Some(TransactionNode {
        amount: node.get("amount").ok()?,
        balance: node.get("balance").ok()?,
        date_time,
        description: node.get("description").unwrap_or_default(),
        party: node.get("party").unwrap_or_default(),
        direction: node.get("type").unwrap_or_default(),
    })
}
