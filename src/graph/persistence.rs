//! Writes classified transactions into the graph
//!
//! One atomic write per row. A failed row is logged and skipped; rows that
//! were already written stay written.

use super::GraphStore;
use crate::error::AssistantError;
use crate::models::{ClassifiedTransaction, TransactionNode};
use crate::Result;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct PersistReport {
    pub persisted: usize,
    pub failed: usize,
}

pub struct GraphPersistence {
    store: Arc<dyn GraphStore>,
}

impl GraphPersistence {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    pub async fn persist(&self, row: &ClassifiedTransaction) -> Result<()> {
        let node = TransactionNode::from(&row.transaction);

        self.store
            .record_transaction(row.category.as_str(), &node)
            .await
            .map_err(|e| AssistantError::PersistenceError(e.to_string()))?;

        debug!(category = %row.category, amount = node.amount, "Transaction persisted");
        Ok(())
    }

    pub async fn persist_batch(&self, rows: &[ClassifiedTransaction]) -> PersistReport {
        let mut report = PersistReport::default();

        for row in rows {
            match self.persist(row).await {
                Ok(()) => report.persisted += 1,
                Err(e) => {
                    warn!(
                        transaction = %row.transaction.canonical_description(),
                        "Skipping row: {}", e
                    );
                    report.failed += 1;
                }
            }
        }

        report
    }
}
