//! Analytical sink for aggregated sentiment results.
//!
//! The sink is an external collaborator with a narrow contract: create
//! the destination with a fixed schema if absent, then append rows.
//! Appends never delete or overwrite prior rows; retry policy belongs to
//! the underlying store client, not to this crate.

pub mod jsonl;
pub mod memory;

pub use jsonl::JsonlSink;
pub use memory::MemorySink;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SinkError;
use crate::inference::{ClassificationResult, Sentiment};

/// Column types supported by the sink schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnType {
    String,
    Float,
}

/// A column in the destination table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

/// Destination table schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    pub columns: Vec<Column>,
}

impl TableSchema {
    /// The fixed sentiment result schema:
    /// `text:STRING, sentiment:STRING, confidence:FLOAT`.
    pub fn sentiment() -> Self {
        let column = |name: &str, column_type| Column {
            name: name.to_string(),
            column_type,
        };
        Self {
            columns: vec![
                column("text", ColumnType::String),
                column("sentiment", ColumnType::String),
                column("confidence", ColumnType::Float),
            ],
        }
    }
}

/// One appended result row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentRow {
    pub text: String,
    pub sentiment: Sentiment,
    pub confidence: f64,
}

impl From<ClassificationResult> for SentimentRow {
    fn from(result: ClassificationResult) -> Self {
        Self {
            text: result.text,
            sentiment: result.sentiment,
            confidence: result.confidence,
        }
    }
}

/// Append-only analytical store contract.
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    /// Create the destination with the given schema if it does not exist.
    /// Never truncates an existing destination.
    async fn ensure_table(&self, schema: &TableSchema) -> Result<(), SinkError>;

    /// Append rows. Write failures are surfaced to the caller.
    async fn append_rows(&self, rows: &[SentimentRow]) -> Result<(), SinkError>;
}
