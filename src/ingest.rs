//! Statement ingestion
//!
//! parse → classify → persist, one row at a time. Nothing is deduplicated:
//! uploading the same statement twice stores its transactions twice. The
//! digest in the report makes such repeats visible in the logs.

use crate::classifier::TransactionClassifier;
use crate::graph::GraphPersistence;
use crate::models::ClassifiedTransaction;
use crate::statement::{LineFailure, StatementParser, StatementTotals};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub statement_digest: String,
    pub lines_parsed: usize,
    pub parse_failures: usize,
    pub classified: usize,
    pub classification_failures: usize,
    pub persisted: usize,
    pub persist_failures: usize,
    pub totals: StatementTotals,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_lines: Vec<LineFailure>,
}

pub fn statement_digest(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

pub struct IngestionPipeline {
    parser: StatementParser,
    classifier: Arc<TransactionClassifier>,
    persistence: GraphPersistence,
}

impl IngestionPipeline {
    pub fn new(
        parser: StatementParser,
        classifier: Arc<TransactionClassifier>,
        persistence: GraphPersistence,
    ) -> Self {
        Self {
            parser,
            classifier,
            persistence,
        }
    }

    fn start_report(&self, text: &str) -> (IngestReport, Vec<crate::models::DraftTransaction>) {
        let parsed = self.parser.parse_file(text);
        let report = IngestReport {
            statement_digest: statement_digest(text),
            lines_parsed: parsed.drafts.len(),
            parse_failures: parsed.failures.len(),
            totals: parsed.totals(),
            failed_lines: parsed.failures,
            ..IngestReport::default()
        };

        info!(
            digest = %report.statement_digest,
            lines = report.lines_parsed,
            parse_failures = report.parse_failures,
            total_in = report.totals.total_in,
            total_out = report.totals.total_out,
            "Statement received"
        );

        (report, parsed.drafts)
    }

    /// Run the whole pipeline. Always completes; per-row failures are
    /// counted in the report.
    pub async fn ingest(&self, text: &str) -> IngestReport {
        let (mut report, drafts) = self.start_report(text);

        for draft in &drafts {
            let row = match self.classifier.classify_transaction(draft).await {
                Ok(row) => row,
                Err(e) => {
                    warn!(transaction = %draft.canonical_description(), "Dropping row: {}", e);
                    report.classification_failures += 1;
                    continue;
                }
            };
            report.classified += 1;

            match self.persistence.persist(&row).await {
                Ok(()) => report.persisted += 1,
                Err(e) => {
                    warn!(transaction = %draft.canonical_description(), "Skipping row: {}", e);
                    report.persist_failures += 1;
                }
            }
        }

        info!(
            digest = %report.statement_digest,
            classified = report.classified,
            persisted = report.persisted,
            "Ingestion finished"
        );

        report
    }

    /// Parse and classify without writing to the graph
    pub async fn preview(&self, text: &str) -> (IngestReport, Vec<ClassifiedTransaction>) {
        let (mut report, drafts) = self.start_report(text);

        let (rows, failures) = self.classifier.classify_batch(&drafts).await;
        report.classified = rows.len();
        report.classification_failures = failures;

        (report, rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AssistantError;
    use crate::graph::MemoryGraph;
    use crate::models::Category;
    use crate::testing::{FlakyGraph, ScriptedModel};
    use std::time::Duration;

    fn line(
        stamp: &str,
        credit: Option<&str>,
        debit: Option<&str>,
        party: &str,
        balance: &str,
    ) -> String {
        let amount = |slot: Option<&str>| match slot {
            Some(value) => format!("{}\t", value),
            None => "\t".to_string(),
        };

        [
            format!("{}\t", stamp),
            amount(credit),
            amount(debit),
            "\t".to_string(),
            format!("{}\t", party),
            "transfer\t".to_string(),
            balance.to_string(),
        ]
        .join("\t")
    }

    fn statement() -> String {
        [
            line("02/01/25 18:57:05", Some("₦5,000.00"), None, "Damilola", "₦15,000.00"),
            "not a transaction".to_string(),
            line("03/01/25 13:07:19", None, Some("₦2,100.00"), "Hope Ventures", "₦12,900.00"),
            String::new(),
            line("23/01/25 17:24:25", None, Some("₦2,010.00"), "Fatimoh", "₦10,890.00"),
        ]
        .join("\n")
    }

    fn pipeline(
        model: Arc<ScriptedModel>,
        graph: Arc<dyn crate::graph::GraphStore>,
    ) -> IngestionPipeline {
        IngestionPipeline::new(
            StatementParser::default(),
            Arc::new(TransactionClassifier::new(model, Duration::ZERO)),
            GraphPersistence::new(graph),
        )
    }

    #[test]
    fn test_digest_is_stable_sha256() {
        assert_eq!(
            statement_digest(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(statement_digest("abc"), statement_digest("abc"));
    }

    #[tokio::test]
    async fn test_ingest_counts_every_stage() {
        let model = Arc::new(ScriptedModel::new());
        model.push_completion(Ok("LoanRepayment-In".into()));
        model.push_completion(Err(AssistantError::LlmError("429".into())));
        model.push_completion(Ok("Food".into()));
        let graph = Arc::new(MemoryGraph::new());

        let report = pipeline(model, graph.clone()).ingest(&statement()).await;

        assert_eq!(report.lines_parsed, 3);
        assert_eq!(report.parse_failures, 1);
        assert_eq!(report.failed_lines[0].line_number, 2);
        assert_eq!(report.classified, 2);
        assert_eq!(report.classification_failures, 1);
        assert_eq!(report.persisted, 2);
        assert_eq!(report.persist_failures, 0);
        assert_eq!(report.totals.total_in, 5000.0);
        assert_eq!(report.totals.total_out, 4110.0);
        assert_eq!(graph.links().await, vec!["LoanRepayment-In", "Food"]);
    }

    #[tokio::test]
    async fn test_ingest_continues_after_persist_failure() {
        let model = Arc::new(ScriptedModel::with_completions(&["Family", "Miscellaneous", "Food"]));
        let graph = Arc::new(FlakyGraph::failing_on(&[0]));

        let report = pipeline(model, graph.clone()).ingest(&statement()).await;

        assert_eq!(report.persisted, 2);
        assert_eq!(report.persist_failures, 1);
        assert_eq!(graph.inner().links().await, vec!["Miscellaneous", "Food"]);
    }

    #[tokio::test]
    async fn test_duplicate_upload_is_not_deduplicated() {
        let model = Arc::new(ScriptedModel::with_completions(&[
            "Family", "Family", "Family", "Family", "Family", "Family",
        ]));
        let graph = Arc::new(MemoryGraph::new());
        let pipeline = pipeline(model, graph.clone());

        let first = pipeline.ingest(&statement()).await;
        let second = pipeline.ingest(&statement()).await;

        assert_eq!(first.statement_digest, second.statement_digest);
        assert_eq!(graph.transaction_count().await, 6);
        assert_eq!(graph.category_count().await, 1);
    }

    #[tokio::test]
    async fn test_preview_does_not_write() {
        let model = Arc::new(ScriptedModel::with_completions(&["Salary", "Debt", "Drinks"]));
        let graph = Arc::new(MemoryGraph::new());

        let (report, rows) = pipeline(model, graph.clone()).preview(&statement()).await;

        assert_eq!(report.classified, 3);
        assert_eq!(report.persisted, 0);
        assert_eq!(rows[2].category, Category::Drinks);
        assert_eq!(graph.transaction_count().await, 0);
    }
}
