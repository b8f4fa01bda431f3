//! Transaction Classifier
//!
//! Assigns one label from the closed category vocabulary to each draft
//! transaction by asking the generative model. Calls go out one at a time,
//! spaced by a [`Pacer`] to stay under the provider's rate limit.

use crate::error::AssistantError;
use crate::llm::{GenerationRequest, GenerativeModel};
use crate::models::{Category, ClassifiedTransaction, DraftTransaction};
use crate::Result;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

pub const DEFAULT_CLASSIFY_INTERVAL: Duration = Duration::from_millis(1000);

/// Enforces a minimum gap between the starts of consecutive calls.
/// The lock is held for the whole call, so calls never overlap.
pub struct Pacer {
    interval: Duration,
    last_start: Mutex<Option<Instant>>,
}

impl Pacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_start: Mutex::new(None),
        }
    }

    pub async fn run<F, T>(&self, call: F) -> T
    where
        F: Future<Output = T>,
    {
        let mut last_start = self.last_start.lock().await;

        if let Some(previous) = *last_start {
            sleep_until(previous + self.interval).await;
        }

        *last_start = Some(Instant::now());
        call.await
    }
}

const EXAMPLES: &str = r#"<Example>
DEBIT: Date: 2024-05-10 09:12:44 UTC; Amount: 5000.00; Party: Michael Arowolo/8095609306/Opay Digital Services Limited; Description: clothes
Expected: Clothing
</Example>
<Example>
DEBIT: Date: 2024-05-10 11:02:10 UTC; Amount: 600.00; Party: ; Description: 2.5gb for 2 days purchase
Expected: Internet/Airtime
</Example>
<Example>
DEBIT: Date: 2025-01-01 17:35:11 UTC; Amount: 3000.00; Party: Jeremiah Lena/2123379333/United Bank For Africa; Description: stuff
Expected: UNKNOWN
</Example>
<Example>
CREDIT: Date: 2025-01-02 18:57:05 UTC; Amount: 5000.00; Party: Damilola Odeogberin/7048478064/Paycom(Opay); Description: thanks for coming through (loan return)
Expected: LoanRepayment-In
</Example>
<Example>
DEBIT: Date: 2025-01-03 13:07:19 UTC; Amount: 2100.00; Party: Hope Business Ventures/8203189697/Moniepoint Mfb; Description: charger
Expected: Miscellaneous
</Example>
<Example>
DEBIT: Date: 2025-01-23 17:24:25 UTC; Amount: 2010.00; Party: Pos Transfer-Fatimoh Mudasiru/5877941385/Moniepoint Mfb; Description: beans and eggs
Expected: Food
</Example>"#;

fn system_instruction(household_context: Option<&str>) -> String {
    let mut instruction = String::from(
        "You are a personal-finance assistant. Read one bank transaction and decide which \
         category it belongs to.\n\n",
    );

    if let Some(context) = household_context.filter(|c| !c.trim().is_empty()) {
        instruction.push_str("<RelevantContext>\n");
        instruction.push_str(context.trim());
        instruction.push_str("\n</RelevantContext>\n\n");
    }

    instruction.push_str("Allowed categories:\n");
    instruction.push_str(&Category::vocabulary_list());
    instruction.push_str(
        "\n\nCREDIT means money coming into the account, DEBIT means money leaving it. \
         LoanPayment-Out and LoanRepayment-Out are always debits; LoanPayment-In and \
         LoanRepayment-In are always credits.\n\
         Look at who the money was sent to or came from first, then at the description.\n\
         If the category cannot be determined, answer UNKNOWN.\n\n<RelevantExamples>\n",
    );
    instruction.push_str(EXAMPLES);
    instruction.push_str(
        "\n</RelevantExamples>\n\n\
         Answer with exactly one category from the list above and nothing else.",
    );

    instruction
}

/// Map a raw model answer onto the vocabulary. Never fails.
pub fn interpret_response(raw: &str) -> Category {
    let cleaned = raw
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c.is_whitespace())
        .trim_end_matches('.')
        .trim();

    Category::from_label(cleaned)
}

pub struct TransactionClassifier {
    model: Arc<dyn GenerativeModel>,
    instruction: String,
    pacer: Pacer,
}

impl TransactionClassifier {
    pub fn new(model: Arc<dyn GenerativeModel>, interval: Duration) -> Self {
        Self::with_context(model, interval, None)
    }

    /// `household_context` names people and vendors so the model can
    /// recognise counterparties.
    pub fn with_context(
        model: Arc<dyn GenerativeModel>,
        interval: Duration,
        household_context: Option<&str>,
    ) -> Self {
        Self {
            model,
            instruction: system_instruction(household_context),
            pacer: Pacer::new(interval),
        }
    }

    pub async fn classify(&self, description: &str) -> Result<Category> {
        let request = GenerationRequest::with_instruction(&self.instruction, description);

        let raw = self
            .pacer
            .run(self.model.complete(&request))
            .await
            .map_err(|e| {
                error!("Classification call failed: {}", e);
                AssistantError::ClassificationError(e.to_string())
            })?;

        let category = interpret_response(&raw);
        if category == Category::Unknown {
            debug!(response = %raw.trim(), "Model answer resolved to UNKNOWN");
        }

        Ok(category)
    }

    pub async fn classify_transaction(
        &self,
        draft: &DraftTransaction,
    ) -> Result<ClassifiedTransaction> {
        let category = self.classify(&draft.canonical_description()).await?;

        Ok(ClassifiedTransaction {
            transaction: draft.clone(),
            category,
        })
    }

    /// Classify in order. Failed rows are logged and dropped; the second
    /// value is how many were dropped.
    pub async fn classify_batch(
        &self,
        drafts: &[DraftTransaction],
    ) -> (Vec<ClassifiedTransaction>, usize) {
        let mut classified = Vec::with_capacity(drafts.len());
        let mut failures = 0;

        for draft in drafts {
            match self.classify_transaction(draft).await {
                Ok(row) => classified.push(row),
                Err(e) => {
                    warn!(transaction = %draft.canonical_description(), "Dropping row: {}", e);
                    failures += 1;
                }
            }
        }

        info!(classified = classified.len(), failures, "Classification pass finished");
        (classified, failures)
    }
}
