use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// The `(operation, equipment)` pair extracted from a message. Either side may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcedureIntent {
    pub operation: String,
    pub equipment: String,
}

impl ProcedureIntent {
    pub fn new(operation: impl Into<String>, equipment: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            equipment: equipment.into(),
        }
    }

    /// Nothing usable was extracted.
    pub fn is_empty(&self) -> bool {
        self.operation.is_empty() && self.equipment.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        !self.operation.is_empty() && !self.equipment.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcedureRecord {
    pub id: i64,
    pub equipment: String,
    pub operation: String,
    pub description: Option<String>,
    pub photo_urls: Vec<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Write candidate for a procedure; the store assigns id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProcedure {
    pub operation: String,
    pub equipment: String,
    pub description: Option<String>,
    pub photo_urls: Vec<String>,
    pub created_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    #[serde(default)]
    pub content_type: String,
}

impl Attachment {
    pub fn image(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            content_type: "image/jpeg".to_string(),
        }
    }

    pub fn is_image(&self) -> bool {
        self.content_type
            .trim()
            .to_ascii_lowercase()
            .starts_with("image/")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InboundMessage {
    pub sender: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl InboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn from_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn has_images(&self) -> bool {
        self.attachments.iter().any(Attachment::is_image)
    }

    /// Image URLs in the order they were attached; other media is ignored.
    pub fn image_urls(&self) -> Vec<String> {
        self.attachments
            .iter()
            .filter(|attachment| attachment.is_image())
            .map(|attachment| attachment.url.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Expense,
    Income,
}

impl TransactionKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "expense" => Some(Self::Expense),
            "income" => Some(Self::Income),
            _ => None,
        }
    }

    pub fn as_code(self) -> &'static str {
        match self {
            Self::Expense => "expense",
            Self::Income => "income",
        }
    }
}

/// A parsed ledger line such as "gastei 35,90 no mercado".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinanceEntry {
    pub kind: TransactionKind,
    pub value_cents: i64,
    pub category: String,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: i64,
    pub user_id: i64,
    pub kind: TransactionKind,
    pub value_cents: i64,
    pub category: Option<String>,
    pub note: Option<String>,
    pub occurred_on: NaiveDate,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTotal {
    pub category: String,
    pub value_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthSummary {
    pub month_start: NaiveDate,
    pub as_of: NaiveDate,
    pub expense_cents: i64,
    pub income_cents: i64,
    pub balance_cents: i64,
    pub transactions: usize,
    pub by_category: Vec<CategoryTotal>,
}

/// What an inbound message asks the bot to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageKind {
    Registration,
    Query,
    /// Ledger entry; carries incomes too when the verb says so.
    FinanceExpense(FinanceEntry),
    FinanceSummary,
    PaymentLink,
    Unknown,
}

impl MessageKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Registration => "registration",
            Self::Query => "query",
            Self::FinanceExpense(_) => "finance_expense",
            Self::FinanceSummary => "finance_summary",
            Self::PaymentLink => "payment_link",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplySegment {
    Text { body: String },
    Media { url: String },
}

/// Transport-agnostic reply: one primary text segment, then optional media.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotReply {
    pub segments: Vec<ReplySegment>,
}

impl BotReply {
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            segments: vec![ReplySegment::Text { body: body.into() }],
        }
    }

    pub fn with_media<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.segments.extend(
            urls.into_iter()
                .map(|url| ReplySegment::Media { url: url.into() }),
        );
        self
    }

    pub fn primary_text(&self) -> &str {
        self.segments
            .iter()
            .find_map(|segment| match segment {
                ReplySegment::Text { body } => Some(body.as_str()),
                ReplySegment::Media { .. } => None,
            })
            .unwrap_or_default()
    }

    pub fn media_urls(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                ReplySegment::Media { url } => Some(url.as_str()),
                ReplySegment::Text { .. } => None,
            })
            .collect()
    }
}
