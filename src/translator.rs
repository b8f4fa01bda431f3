//! Natural-language question → Cypher query

use crate::error::AssistantError;
use crate::llm::{GenerationRequest, GenerativeModel};
use crate::models::Category;
use crate::Result;
use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tracing::{debug, error};

/// Returned for questions that have nothing to do with the account
pub const EMPTY_RESULT_QUERY: &str = r#"MATCH (c:Category {name: "empty"}) RETURN c"#;

const SCHEMA: &str = r#"You generate Cypher queries for a Neo4j database of personal bank transactions.

<DatabaseSchema>
Node: Transaction
  - amount: Double
  - balance: Double
  - dateTime: DateTime
  - description: String
  - party: String
  - type: String ("Credit" or "Debit")

Node: Category
  - name: String

Relationship: (Transaction)-[:BELONGS_TO]->(Category)
</DatabaseSchema>
"#;

const RULES: &str = r#"
<Rules>
- Respond with a single valid Cypher query and nothing else. No prose, no quotes, no code fences.
- The query must return graph nodes, never aggregated values.
- dateTime is a DateTime, compare it with datetime("YYYY-MM-DD").
- Resolve relative periods ("this month", "last month") against today's date. Use valid calendar dates.
- Match party and description case-insensitively by substring:
  MATCH (t:Transaction) WHERE toLower(t.party) CONTAINS toLower("john doe") RETURN t
- Money received is type "Credit"; money spent or sent is type "Debit".
- If the question is unrelated to transactions or the account, return exactly:
  MATCH (c:Category {name: "empty"}) RETURN c
</Rules>

<Examples>
Today is 2025-02-10.

Question: How much have I spent on food this month?
MATCH (t:Transaction)-[:BELONGS_TO]->(c:Category {name: "Food"}) WHERE t.dateTime >= datetime("2025-02-01") AND t.dateTime < datetime("2025-03-01") AND t.type = "Debit" RETURN t

Question: Did I pay for electricity last month?
MATCH (t:Transaction)-[:BELONGS_TO]->(c:Category {name: "Electricity Bill"}) WHERE t.dateTime >= datetime("2025-01-01") AND t.dateTime < datetime("2025-02-01") RETURN t

Question: How much has my girlfriend sent me this month?
MATCH (t:Transaction)-[:BELONGS_TO]->(c:Category {name: "Girlfriend"}) WHERE t.dateTime >= datetime("2025-02-01") AND t.dateTime < datetime("2025-03-01") AND t.type = "Credit" RETURN t

Question: What did I pay for rent?
MATCH (t:Transaction) WHERE toLower(t.description) CONTAINS "rent" RETURN t

Question: What is the capital of France?
MATCH (c:Category {name: "empty"}) RETURN c
</Examples>"#;

fn schema_prompt() -> String {
    format!(
        "{}\nCategories:\n{}\n{}",
        SCHEMA,
        Category::vocabulary_list(),
        RULES
    )
}

/// Remove surrounding code-fence markers and a language tag
pub fn strip_fences(raw: &str) -> String {
    let mut text = raw.trim();

    if let Some(rest) = text.strip_prefix("```") {
        text = strip_language_tag(rest);
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }

    text.trim().to_string()
}

fn strip_language_tag(after_fence: &str) -> &str {
    let tag_end = after_fence
        .find(|c: char| c.is_whitespace())
        .unwrap_or(after_fence.len());
    let (tag, rest) = after_fence.split_at(tag_end);

    let known = tag.eq_ignore_ascii_case("cypher") || tag.eq_ignore_ascii_case("sql");
    let own_line = rest.starts_with('\n') || rest.starts_with("\r\n");

    if !tag.is_empty() && (known || own_line) {
        rest
    } else {
        after_fence
    }
}

pub struct QueryTranslator {
    model: Arc<dyn GenerativeModel>,
    instruction: String,
    include_date: bool,
}

impl QueryTranslator {
    pub fn new(model: Arc<dyn GenerativeModel>, include_date: bool) -> Self {
        Self {
            model,
            instruction: schema_prompt(),
            include_date,
        }
    }

    pub fn build_request(&self, question: &str, today: Option<NaiveDate>) -> GenerationRequest {
        let prompt = match today {
            Some(date) => format!(
                "Today is {}.\n\nQuestion: {}",
                date.format("%Y-%m-%d"),
                question
            ),
            None => format!("Question: {}", question),
        };

        GenerationRequest::with_instruction(&self.instruction, prompt)
    }

    pub async fn translate(&self, question: &str) -> Result<String> {
        let today = self.include_date.then(|| Utc::now().date_naive());
        let request = self.build_request(question, today);

        let raw = self.model.complete(&request).await.map_err(|e| {
            error!("Query translation failed: {}", e);
            AssistantError::TranslationError(e.to_string())
        })?;

        let cypher = strip_fences(&raw);
        debug!(%cypher, "Translated question");
        Ok(cypher)
    }
}
