//! Core data models for statements, categories and conversations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

//
// ================= Direction =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Direction {
    Credit,
    Debit,
}

impl Direction {
    /// +1 for money coming in, -1 for money going out
    pub fn sign(self) -> i8 {
        match self {
            Direction::Credit => 1,
            Direction::Debit => -1,
        }
    }

    /// Value stored in the `type` property of a Transaction node
    pub fn graph_label(self) -> &'static str {
        match self {
            Direction::Credit => "Credit",
            Direction::Debit => "Debit",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Direction::Credit => "CREDIT",
            Direction::Debit => "DEBIT",
        };
        write!(f, "{}", s)
    }
}

//
// ================= Category =================
//

/// Closed personal-finance vocabulary shared by the classifier and the translator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Family,
    Girlfriend,
    Food,
    InternetAirtime,
    Clothing,
    Debt,
    CowrywiseIn,
    CowrywiseOut,
    ElectricityBill,
    Miscellaneous,
    Church,
    Transportation,
    PersonalCare,
    Subscriptions,
    Drinks,
    LoanPaymentOut,
    LoanPaymentIn,
    LoanRepaymentOut,
    LoanRepaymentIn,
    Salary,
    Unknown,
}

impl Category {
    /// The twenty canonical labels, in prompt order (excludes `Unknown`)
    pub const CANONICAL: [Category; 20] = [
        Category::Family,
        Category::Girlfriend,
        Category::Food,
        Category::InternetAirtime,
        Category::Clothing,
        Category::Debt,
        Category::CowrywiseIn,
        Category::CowrywiseOut,
        Category::ElectricityBill,
        Category::Miscellaneous,
        Category::Church,
        Category::Transportation,
        Category::PersonalCare,
        Category::Subscriptions,
        Category::Drinks,
        Category::LoanPaymentOut,
        Category::LoanPaymentIn,
        Category::LoanRepaymentOut,
        Category::LoanRepaymentIn,
        Category::Salary,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Family => "Family",
            Category::Girlfriend => "Girlfriend",
            Category::Food => "Food",
            Category::InternetAirtime => "Internet/Airtime",
            Category::Clothing => "Clothing",
            Category::Debt => "Debt",
            Category::CowrywiseIn => "Cowrywise In",
            Category::CowrywiseOut => "Cowrywise Out",
            Category::ElectricityBill => "Electricity Bill",
            Category::Miscellaneous => "Miscellaneous",
            Category::Church => "Church",
            Category::Transportation => "Transportation",
            Category::PersonalCare => "Personal Care",
            Category::Subscriptions => "Subscriptions",
            Category::Drinks => "Drinks",
            Category::LoanPaymentOut => "LoanPayment-Out",
            Category::LoanPaymentIn => "LoanPayment-In",
            Category::LoanRepaymentOut => "LoanRepayment-Out",
            Category::LoanRepaymentIn => "LoanRepayment-In",
            Category::Salary => "Salary",
            Category::Unknown => "UNKNOWN",
        }
    }

    /// Exact label match first, then case-insensitive. Anything else is `Unknown`.
    pub fn from_label(label: &str) -> Category {
        if let Some(exact) = Self::CANONICAL.iter().find(|c| c.as_str() == label) {
            return *exact;
        }

        Self::CANONICAL
            .iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(label))
            .copied()
            .unwrap_or(Category::Unknown)
    }

    /// Bulleted list used inside prompts
    pub fn vocabulary_list() -> String {
        Self::CANONICAL
            .iter()
            .map(|c| format!("- {}", c.as_str()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Category {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

//
// ================= Transactions =================
//

/// A parsed statement line that has not been classified yet
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DraftTransaction {
    pub date_time: DateTime<Utc>,
    pub amount: f64,
    pub direction: Direction,
    pub balance: f64,
    pub party: String,
    pub description: String,
    /// The export's own category column, usually blank
    pub statement_category: String,
}

impl DraftTransaction {
    /// Single-line rendering sent to the classifier
    pub fn canonical_description(&self) -> String {
        format!(
            "{}: Date: {}; Amount: {:.2}; Party: {}; Description: {}",
            self.direction, self.date_time, self.amount, self.party, self.description
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassifiedTransaction {
    pub transaction: DraftTransaction,
    pub category: Category,
}

//
// ================= Graph Records =================
//

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionNode {
    pub amount: f64,
    pub balance: f64,
    pub date_time: DateTime<Utc>,
    pub description: String,
    pub party: String,
    #[serde(rename = "type")]
    pub direction: String,
}

impl From<&DraftTransaction> for TransactionNode {
    fn from(t: &DraftTransaction) -> Self {
        Self {
            amount: t.amount,
            balance: t.balance,
            date_time: t.date_time,
            description: t.description.clone(),
            party: t.party.clone(),
            direction: t.direction.graph_label().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CategoryNode {
    pub name: String,
}

/// A node returned by the graph store, tagged by its label
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "label")]
pub enum GraphNode {
    Transaction(TransactionNode),
    Category(CategoryNode),
}

//
// ================= Conversations =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }

    pub fn from_db(role: &str) -> Option<Self> {
        match role {
            "user" => Some(MessageRole::User),
            "assistant" => Some(MessageRole::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    pub fn new(conversation_id: Uuid, role: MessageRole, content: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            role,
            content,
            created_at: now,
            updated_at: now,
        }
    }
}
